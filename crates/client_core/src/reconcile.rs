use std::collections::HashMap;

use shared::{
    domain::{Order, OrderFlag, OrderId},
    protocol::ChangeEvent,
};

use crate::error::ClientError;

/// Optimistic toggles in flight for one (order, flag) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingFlag {
    confirmed: bool,
    in_flight: u32,
}

/// Local ordered snapshot of the `bordados` table plus the bookkeeping for
/// optimistic flag toggles. Pure state, no I/O.
#[derive(Debug, Default)]
pub struct Reconciler {
    orders: Vec<Order>,
    initialized: bool,
    pending: HashMap<(OrderId, OrderFlag), PendingFlag>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a full load has been merged. Change events are only trusted
    /// after that.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn snapshot(&self) -> Vec<Order> {
        self.orders.clone()
    }

    pub fn get(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.iter().find(|order| order.id == order_id)
    }

    pub fn is_pending(&self, order_id: OrderId, flag: OrderFlag) -> bool {
        self.pending.contains_key(&(order_id, flag))
    }

    /// Replaces the snapshot with the store's full contents.
    pub fn replace_all(&mut self, orders: Vec<Order>) {
        self.orders = orders;
        self.pending.clear();
        self.initialized = true;
        self.sort();
    }

    /// Merges one change event. Returns `false` when the event did not touch
    /// the snapshot.
    pub fn apply(&mut self, event: ChangeEvent) -> bool {
        let changed = match event {
            ChangeEvent::Inserted { order } => {
                self.orders.retain(|existing| existing.id != order.id);
                self.orders.insert(0, order);
                true
            }
            ChangeEvent::Updated { order } => {
                let Some(position) = self.position(order.id) else {
                    return false;
                };
                for flag in [OrderFlag::Completed, OrderFlag::Paid] {
                    if let Some(pending) = self.pending.get_mut(&(order.id, flag)) {
                        pending.confirmed = order.flag(flag);
                    }
                }
                self.orders[position] = order;
                true
            }
            ChangeEvent::Deleted { order_id } => {
                let before = self.orders.len();
                self.orders.retain(|order| order.id != order_id);
                self.pending.retain(|(id, _), _| *id != order_id);
                self.orders.len() != before
            }
        };
        self.sort();
        changed
    }

    /// Flips `flag` locally and records the toggle as in flight. Returns the
    /// value to send to the store.
    pub fn begin_toggle(&mut self, order_id: OrderId, flag: OrderFlag) -> Result<bool, ClientError> {
        let position = self
            .position(order_id)
            .ok_or(ClientError::NotFound(order_id))?;
        let order = &mut self.orders[position];
        let current = order.flag(flag);
        let pending = self.pending.entry((order_id, flag)).or_insert(PendingFlag {
            confirmed: current,
            in_flight: 0,
        });
        pending.in_flight += 1;

        let next = !current;
        order.set_flag(flag, next);
        Ok(next)
    }

    /// Records the store's answer to a toggle. Once no toggle for the pair is
    /// left in flight the local flag settles on the confirmed value.
    pub fn confirm(&mut self, order_id: OrderId, flag: OrderFlag, confirmed: bool) {
        let Some(pending) = self.pending.get_mut(&(order_id, flag)) else {
            return;
        };
        pending.confirmed = confirmed;
        pending.in_flight = pending.in_flight.saturating_sub(1);
        if pending.in_flight == 0 {
            self.pending.remove(&(order_id, flag));
            self.set_local_flag(order_id, flag, confirmed);
        }
    }

    /// Reverts a failed toggle to the last confirmed value. Returns the value
    /// now shown, or `None` when the order is no longer tracked.
    pub fn fail(&mut self, order_id: OrderId, flag: OrderFlag) -> Option<bool> {
        let pending = self.pending.get_mut(&(order_id, flag))?;
        let confirmed = pending.confirmed;
        pending.in_flight = pending.in_flight.saturating_sub(1);
        if pending.in_flight == 0 {
            self.pending.remove(&(order_id, flag));
        }
        self.set_local_flag(order_id, flag, confirmed)
            .then_some(confirmed)
    }

    fn set_local_flag(&mut self, order_id: OrderId, flag: OrderFlag, value: bool) -> bool {
        match self.position(order_id) {
            Some(position) => {
                self.orders[position].set_flag(flag, value);
                true
            }
            None => false,
        }
    }

    fn position(&self, order_id: OrderId) -> Option<usize> {
        self.orders.iter().position(|order| order.id == order_id)
    }

    // Stable, so rows sharing a timestamp keep their arrival order.
    fn sort(&mut self) {
        self.orders
            .sort_by(|left, right| right.created_at.cmp(&left.created_at));
    }
}

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod tests;
