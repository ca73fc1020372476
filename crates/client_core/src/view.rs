use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use shared::domain::Order;

/// Case-insensitive substring match over client name, contact number and
/// description. An empty query matches everything.
pub fn matches_search(order: &Order, query: &str) -> bool {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    [&order.client_name, &order.contact_number, &order.description]
        .into_iter()
        .any(|field| field.to_lowercase().contains(&needle))
}

pub fn search<'a>(orders: &'a [Order], query: &str) -> Vec<&'a Order> {
    orders
        .iter()
        .filter(|order| matches_search(order, query))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tab {
    #[default]
    Pending,
    Completed,
    All,
}

impl Tab {
    pub fn includes(self, order: &Order) -> bool {
        match self {
            Tab::Pending => !order.completed,
            Tab::Completed => order.completed,
            Tab::All => true,
        }
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tab::Pending => "pending",
            Tab::Completed => "completed",
            Tab::All => "all",
        })
    }
}

impl FromStr for Tab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Tab::Pending),
            "completed" => Ok(Tab::Completed),
            "all" => Ok(Tab::All),
            other => Err(format!(
                "unknown tab '{other}', expected pending, completed or all"
            )),
        }
    }
}

/// Splits orders into (pending, completed), keeping snapshot order.
pub fn partition(orders: &[Order]) -> (Vec<&Order>, Vec<&Order>) {
    orders.iter().partition(|order| !order.completed)
}

/// Rows shown for a tab after applying the search box.
pub fn visible_orders<'a>(orders: &'a [Order], tab: Tab, query: &str) -> Vec<&'a Order> {
    orders
        .iter()
        .filter(|order| tab.includes(order) && matches_search(order, query))
        .collect()
}

/// Dashboard figures derived from the snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statistics {
    pub total: usize,
    pub pending: usize,
    pub completed: usize,
    pub paid: usize,
    pub paid_amount: f64,
    pub unpaid: usize,
    pub unpaid_amount: f64,
    pub completed_revenue: f64,
    pub overdue: usize,
}

impl Statistics {
    pub fn from_orders(orders: &[Order], today: NaiveDate) -> Self {
        let mut stats = Statistics {
            total: orders.len(),
            ..Statistics::default()
        };
        for order in orders {
            if order.completed {
                stats.completed += 1;
                stats.completed_revenue += order.total_price;
            } else {
                stats.pending += 1;
                if order.delivery_date < today {
                    stats.overdue += 1;
                }
            }
            if order.paid {
                stats.paid += 1;
                stats.paid_amount += order.total_price;
            } else {
                stats.unpaid += 1;
                stats.unpaid_amount += order.total_price;
            }
        }
        stats
    }
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
