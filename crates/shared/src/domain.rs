use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

id_newtype!(OrderId);

/// The two independently toggled booleans of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderFlag {
    Completed,
    Paid,
}

impl OrderFlag {
    pub fn column(self) -> &'static str {
        match self {
            OrderFlag::Completed => "completado",
            OrderFlag::Paid => "pagado",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderValidationError {
    #[error("quantity must be at least 1")]
    QuantityTooSmall,
    #[error("unit price must be a finite, non-negative number")]
    InvalidUnitPrice,
    #[error("total price must be a finite, non-negative number")]
    InvalidTotalPrice,
}

/// One embroidery job as stored in the `bordados` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(rename = "nombreCliente")]
    pub client_name: String,
    #[serde(rename = "numeroContacto", default)]
    pub contact_number: String,
    #[serde(rename = "descripcion", default)]
    pub description: String,
    #[serde(rename = "cantidad")]
    pub quantity: u32,
    #[serde(rename = "precio")]
    pub unit_price: f64,
    #[serde(rename = "precioTotal")]
    pub total_price: f64,
    #[serde(rename = "fechaEntrega")]
    pub delivery_date: NaiveDate,
    #[serde(rename = "fechaCreacion")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "completado")]
    pub completed: bool,
    #[serde(rename = "pagado")]
    pub paid: bool,
}

impl Order {
    pub fn flag(&self, flag: OrderFlag) -> bool {
        match flag {
            OrderFlag::Completed => self.completed,
            OrderFlag::Paid => self.paid,
        }
    }

    pub fn set_flag(&mut self, flag: OrderFlag, value: bool) {
        match flag {
            OrderFlag::Completed => self.completed = value,
            OrderFlag::Paid => self.paid = value,
        }
    }

    pub fn validate(&self) -> Result<(), OrderValidationError> {
        validate_amounts(self.quantity, self.unit_price, self.total_price)
    }
}

/// Row sent to the store on creation. The store assigns `id` and the
/// creation timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderInsert {
    #[serde(rename = "nombreCliente")]
    pub client_name: String,
    #[serde(rename = "numeroContacto", default)]
    pub contact_number: String,
    #[serde(rename = "descripcion", default)]
    pub description: String,
    #[serde(rename = "cantidad")]
    pub quantity: u32,
    #[serde(rename = "precio")]
    pub unit_price: f64,
    #[serde(rename = "precioTotal")]
    pub total_price: f64,
    #[serde(rename = "fechaEntrega")]
    pub delivery_date: NaiveDate,
    #[serde(rename = "completado", default)]
    pub completed: bool,
    #[serde(rename = "pagado", default)]
    pub paid: bool,
}

impl OrderInsert {
    pub fn validate(&self) -> Result<(), OrderValidationError> {
        validate_amounts(self.quantity, self.unit_price, self.total_price)
    }

    pub fn into_order(self, id: OrderId, created_at: DateTime<Utc>) -> Order {
        Order {
            id,
            client_name: self.client_name,
            contact_number: self.contact_number,
            description: self.description,
            quantity: self.quantity,
            unit_price: self.unit_price,
            total_price: self.total_price,
            delivery_date: self.delivery_date,
            created_at,
            completed: self.completed,
            paid: self.paid,
        }
    }
}

fn validate_amounts(
    quantity: u32,
    unit_price: f64,
    total_price: f64,
) -> Result<(), OrderValidationError> {
    if quantity == 0 {
        return Err(OrderValidationError::QuantityTooSmall);
    }
    if !unit_price.is_finite() || unit_price < 0.0 {
        return Err(OrderValidationError::InvalidUnitPrice);
    }
    if !total_price.is_finite() || total_price < 0.0 {
        return Err(OrderValidationError::InvalidTotalPrice);
    }
    Ok(())
}
