use std::sync::Arc;

use chrono::Local;
use shared::domain::{Order, OrderFlag, OrderId};
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    draft::{OrderDraft, DEFAULT_DELIVERY_DAYS},
    error::ClientError,
    notice::{Notice, NoticeBoard},
    reconcile::Reconciler,
    store::{ChangeFeed, FeedItem, OrderStore},
};

const SESSION_EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub enum SessionEvent {
    SnapshotChanged(Vec<Order>),
    Notice(Notice),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Days added to today when a new order has no delivery date.
    pub default_delivery_days: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_delivery_days: DEFAULT_DELIVERY_DAYS,
        }
    }
}

/// Progress of the change feed towards a trusted snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedState {
    Connecting,
    Live,
    LoadFailed(ClientError),
    Closed,
}

struct SessionShared {
    store: Arc<dyn OrderStore>,
    settings: SessionSettings,
    state: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    feed_state: watch::Sender<FeedState>,
}

#[derive(Default)]
struct SessionState {
    reconciler: Reconciler,
    notices: NoticeBoard,
}

/// One view's connection to the order store: owns the change feed, the
/// reconciled snapshot and the intents that mutate it.
pub struct OrderSession {
    shared: Arc<SessionShared>,
    pump: JoinHandle<()>,
}

impl OrderSession {
    /// Opens the store's change feed and starts reconciling against it.
    pub async fn connect(
        store: Arc<dyn OrderStore>,
        settings: SessionSettings,
    ) -> Result<Self, ClientError> {
        let feed = store.subscribe().await?;
        Ok(Self::start(store, feed, settings))
    }

    /// Takes ownership of an already open feed. Must be called inside a
    /// tokio runtime.
    pub fn start(store: Arc<dyn OrderStore>, feed: ChangeFeed, settings: SessionSettings) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_BUFFER);
        let (feed_state, _) = watch::channel(FeedState::Connecting);
        let shared = Arc::new(SessionShared {
            store,
            settings,
            state: Mutex::new(SessionState::default()),
            events,
            feed_state,
        });
        let pump = tokio::spawn(run_feed(Arc::clone(&shared), feed));
        Self { shared, pump }
    }

    pub fn settings(&self) -> SessionSettings {
        self.shared.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn feed_state(&self) -> FeedState {
        self.shared.feed_state.borrow().clone()
    }

    pub fn watch_feed_state(&self) -> watch::Receiver<FeedState> {
        self.shared.feed_state.subscribe()
    }

    /// Resolves once the initial load has been merged, or with the reason it
    /// never will be.
    pub async fn wait_until_loaded(&self) -> Result<(), ClientError> {
        let mut state_rx = self.watch_feed_state();
        let state = state_rx
            .wait_for(|state| *state != FeedState::Connecting)
            .await
            .map(|state| state.clone())
            .unwrap_or(FeedState::Closed);
        match state {
            FeedState::Live => Ok(()),
            FeedState::LoadFailed(err) => Err(err),
            FeedState::Connecting | FeedState::Closed => Err(ClientError::ConnectionUnavailable(
                "change feed closed before the initial load".into(),
            )),
        }
    }

    pub async fn snapshot(&self) -> Vec<Order> {
        self.shared.state.lock().await.reconciler.snapshot()
    }

    pub async fn is_pending(&self, order_id: OrderId, flag: OrderFlag) -> bool {
        self.shared
            .state
            .lock()
            .await
            .reconciler
            .is_pending(order_id, flag)
    }

    pub async fn active_notices(&self) -> Vec<Notice> {
        self.shared
            .state
            .lock()
            .await
            .notices
            .active(Instant::now())
    }

    /// Sends a new order to the store. The stored row reaches the snapshot
    /// through the change feed.
    pub async fn create(&self, draft: OrderDraft) -> Result<Order, ClientError> {
        let today = Local::now().date_naive();
        let insert = draft.into_insert(today, self.shared.settings.default_delivery_days);
        match self.shared.store.insert(insert).await {
            Ok(order) => {
                info!(order_id = %order.id, client = %order.client_name, "order created");
                self.shared.notify(Notice::success("Order created")).await;
                Ok(order)
            }
            Err(err) => Err(self.shared.surface(err).await),
        }
    }

    pub async fn toggle_completed(&self, order_id: OrderId) -> Result<(), ClientError> {
        self.toggle(order_id, OrderFlag::Completed).await
    }

    pub async fn toggle_paid(&self, order_id: OrderId) -> Result<(), ClientError> {
        self.toggle(order_id, OrderFlag::Paid).await
    }

    async fn toggle(&self, order_id: OrderId, flag: OrderFlag) -> Result<(), ClientError> {
        let (value, snapshot) = {
            let mut state = self.shared.state.lock().await;
            match state.reconciler.begin_toggle(order_id, flag) {
                Ok(value) => (value, state.reconciler.snapshot()),
                Err(err) => {
                    drop(state);
                    return Err(self.shared.surface(err).await);
                }
            }
        };
        self.shared.publish_snapshot(snapshot);

        match self.shared.store.set_flag(order_id, flag, value).await {
            Ok(order) => {
                let snapshot = {
                    let mut state = self.shared.state.lock().await;
                    state.reconciler.confirm(order_id, flag, order.flag(flag));
                    state.reconciler.snapshot()
                };
                self.shared.publish_snapshot(snapshot);
                debug!(%order_id, column = flag.column(), value, "flag update confirmed");
                let message = match flag {
                    OrderFlag::Completed => "Completion status updated",
                    OrderFlag::Paid => "Payment status updated",
                };
                self.shared.notify(Notice::success(message)).await;
                Ok(())
            }
            Err(err) => {
                let snapshot = {
                    let mut state = self.shared.state.lock().await;
                    let reverted = state.reconciler.fail(order_id, flag);
                    warn!(%order_id, column = flag.column(), ?reverted, %err, "flag update failed; reverted");
                    state.reconciler.snapshot()
                };
                self.shared.publish_snapshot(snapshot);
                Err(self.shared.surface(err).await)
            }
        }
    }

    /// Asks the store to delete the order. The row leaves the snapshot only
    /// when the matching change event arrives.
    pub async fn delete(&self, order_id: OrderId) -> Result<(), ClientError> {
        match self.shared.store.delete(order_id).await {
            Ok(()) => {
                info!(%order_id, "order deleted");
                self.shared.notify(Notice::success("Order deleted")).await;
                Ok(())
            }
            Err(err) => Err(self.shared.surface(err).await),
        }
    }

    /// Replaces the snapshot with the store's full contents.
    pub async fn reload(&self) -> Result<(), ClientError> {
        match self.shared.load_all().await {
            Ok(()) => Ok(()),
            Err(err) => Err(self.shared.surface(err).await),
        }
    }

    /// Stops the feed pump and releases the subscription.
    pub fn close(self) {
        self.pump.abort();
    }
}

impl Drop for OrderSession {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

impl SessionShared {
    fn publish_snapshot(&self, snapshot: Vec<Order>) {
        let _ = self.events.send(SessionEvent::SnapshotChanged(snapshot));
    }

    async fn notify(&self, notice: Notice) {
        self.state.lock().await.notices.post(notice.clone());
        let _ = self.events.send(SessionEvent::Notice(notice));
    }

    /// Turns a failure into an error notice and hands it back to the caller.
    async fn surface(&self, err: ClientError) -> ClientError {
        self.notify(Notice::error(err.to_string())).await;
        err
    }

    async fn load_all(&self) -> Result<(), ClientError> {
        let orders = self.store.fetch_all().await?;
        let snapshot = {
            let mut state = self.state.lock().await;
            state.reconciler.replace_all(orders);
            state.reconciler.snapshot()
        };
        info!(orders = snapshot.len(), "snapshot loaded");
        self.publish_snapshot(snapshot);
        Ok(())
    }

    async fn initial_load(&self) {
        match self.load_all().await {
            Ok(()) => {
                self.feed_state.send_replace(FeedState::Live);
            }
            Err(err) => {
                warn!(%err, "initial load failed; starting from an empty snapshot");
                {
                    let mut state = self.state.lock().await;
                    state.reconciler.replace_all(Vec::new());
                }
                self.publish_snapshot(Vec::new());
                let err = self.surface(err).await;
                self.feed_state.send_replace(FeedState::LoadFailed(err));
            }
        }
    }

    async fn handle_feed_item(&self, item: FeedItem) {
        let initialized = self.state.lock().await.reconciler.is_initialized();
        match item {
            FeedItem::Subscribed if !initialized => self.initial_load().await,
            FeedItem::Subscribed => debug!("repeated subscribed signal ignored"),
            FeedItem::Change(event) if initialized => {
                let order_id = event.order_id();
                let snapshot = {
                    let mut state = self.state.lock().await;
                    state
                        .reconciler
                        .apply(event)
                        .then(|| state.reconciler.snapshot())
                };
                match snapshot {
                    Some(snapshot) => self.publish_snapshot(snapshot),
                    None => debug!(%order_id, "change event did not touch the snapshot"),
                }
            }
            FeedItem::Change(event) => {
                debug!(order_id = %event.order_id(), "change before initial load dropped");
            }
            FeedItem::Malformed(reason) if initialized => {
                warn!(%reason, "malformed change event; reloading");
                if let Err(err) = self.load_all().await {
                    warn!(%err, "reload after malformed change event failed");
                }
            }
            FeedItem::Malformed(reason) => {
                debug!(%reason, "malformed change event before initial load ignored");
            }
        }
    }
}

async fn run_feed(shared: Arc<SessionShared>, mut feed: ChangeFeed) {
    while let Some(item) = feed.next().await {
        shared.handle_feed_item(item).await;
    }
    // Before the initial load `wait_until_loaded` reports the loss.
    let before_load = *shared.feed_state.borrow() == FeedState::Connecting;
    if before_load {
        info!("change feed ended before the initial load");
    } else {
        warn!("change feed ended; the snapshot no longer follows the store");
        shared
            .surface(ClientError::ConnectionUnavailable(
                "change feed closed".into(),
            ))
            .await;
    }
    shared.feed_state.send_replace(FeedState::Closed);
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
