//! Client side of the order tracker: the store client, the reconciled
//! snapshot with optimistic toggles, and the view helpers built on it.

pub mod draft;
pub mod error;
pub mod notice;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod view;

pub use draft::{DraftError, OrderDraft, DEFAULT_DELIVERY_DAYS};
pub use error::ClientError;
pub use notice::{Notice, NoticeBoard, NoticeLevel};
pub use reconcile::Reconciler;
pub use session::{FeedState, OrderSession, SessionEvent, SessionSettings};
pub use store::{parse_feed_frame, ChangeFeed, FeedItem, HttpOrderStore, OrderStore};
pub use view::{matches_search, partition, search, visible_orders, Statistics, Tab};
