use chrono::{Days, NaiveDate};
use shared::domain::OrderInsert;
use thiserror::Error;

pub const DEFAULT_DELIVERY_DAYS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("client name is required")]
    BlankClientName,
    #[error("quantity must be at least 1")]
    QuantityTooSmall,
    #[error("unit price must be a non-negative number")]
    InvalidUnitPrice,
}

/// Contents of the creation form before it is sent to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDraft {
    pub client_name: String,
    pub contact_number: String,
    pub description: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub delivery_date: Option<NaiveDate>,
}

impl Default for OrderDraft {
    fn default() -> Self {
        Self {
            client_name: String::new(),
            contact_number: String::new(),
            description: String::new(),
            quantity: 1,
            unit_price: 0.0,
            delivery_date: None,
        }
    }
}

impl OrderDraft {
    pub fn validate(&self) -> Result<(), DraftError> {
        if self.client_name.trim().is_empty() {
            return Err(DraftError::BlankClientName);
        }
        if self.quantity == 0 {
            return Err(DraftError::QuantityTooSmall);
        }
        if !self.unit_price.is_finite() || self.unit_price < 0.0 {
            return Err(DraftError::InvalidUnitPrice);
        }
        Ok(())
    }

    pub fn total_price(&self) -> f64 {
        f64::from(self.quantity) * self.unit_price
    }

    /// Row to insert. New orders are never born completed or paid.
    pub fn into_insert(self, today: NaiveDate, default_delivery_days: u32) -> OrderInsert {
        let total_price = self.total_price();
        OrderInsert {
            client_name: self.client_name.trim().to_string(),
            contact_number: self.contact_number.trim().to_string(),
            description: self.description.trim().to_string(),
            quantity: self.quantity,
            unit_price: self.unit_price,
            total_price,
            delivery_date: self
                .delivery_date
                .unwrap_or_else(|| default_delivery_date(today, default_delivery_days)),
            completed: false,
            paid: false,
        }
    }
}

pub fn default_delivery_date(today: NaiveDate, days: u32) -> NaiveDate {
    today
        .checked_add_days(Days::new(u64::from(days)))
        .unwrap_or(today)
}
