use serde::{Deserialize, Serialize};

use crate::domain::{Order, OrderFlag, OrderId, OrderValidationError};

/// Row-level change emitted by the store after a successful write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ChangeEvent {
    Inserted { order: Order },
    Updated { order: Order },
    Deleted { order_id: OrderId },
}

impl ChangeEvent {
    pub fn order_id(&self) -> OrderId {
        match self {
            ChangeEvent::Inserted { order } | ChangeEvent::Updated { order } => order.id,
            ChangeEvent::Deleted { order_id } => *order_id,
        }
    }

    pub fn validate(&self) -> Result<(), OrderValidationError> {
        match self {
            ChangeEvent::Inserted { order } | ChangeEvent::Updated { order } => order.validate(),
            ChangeEvent::Deleted { .. } => Ok(()),
        }
    }
}

/// Frames sent over the change-feed websocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    Subscribed,
    Change(ChangeEvent),
}

/// Body of `PATCH /orders/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagUpdate {
    #[serde(rename = "completado", default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(rename = "pagado", default, skip_serializing_if = "Option::is_none")]
    pub paid: Option<bool>,
}

impl FlagUpdate {
    pub fn single(flag: OrderFlag, value: bool) -> Self {
        match flag {
            OrderFlag::Completed => Self {
                completed: Some(value),
                paid: None,
            },
            OrderFlag::Paid => Self {
                completed: None,
                paid: Some(value),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_none() && self.paid.is_none()
    }
}
