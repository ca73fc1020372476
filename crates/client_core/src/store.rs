use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use shared::{
    domain::{Order, OrderFlag, OrderId, OrderInsert},
    error::ApiError,
    protocol::{FlagUpdate, ServerEvent},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ClientError;

const FEED_BUFFER: usize = 256;

/// One decoded frame of the change feed, already validated.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedItem {
    Subscribed,
    Change(shared::protocol::ChangeEvent),
    Malformed(String),
}

/// Owned handle on a change-feed subscription. Dropping it releases the
/// underlying connection.
pub struct ChangeFeed {
    items: ReceiverStream<FeedItem>,
    reader: Option<JoinHandle<()>>,
}

impl ChangeFeed {
    pub fn new(items: mpsc::Receiver<FeedItem>, reader: Option<JoinHandle<()>>) -> Self {
        Self {
            items: ReceiverStream::new(items),
            reader,
        }
    }

    /// A feed driven by hand, for in-process stores and tests.
    pub fn channel(capacity: usize) -> (mpsc::Sender<FeedItem>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx, None))
    }

    /// Next item, or `None` once the remote side has gone away.
    pub async fn next(&mut self) -> Option<FeedItem> {
        self.items.next().await
    }
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// CRUD surface and change feed of the remote `bordados` table.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Succeeds when the store answers and its backing table is usable.
    async fn check_connection(&self) -> Result<(), ClientError>;
    async fn fetch_all(&self) -> Result<Vec<Order>, ClientError>;
    async fn insert(&self, row: OrderInsert) -> Result<Order, ClientError>;
    async fn set_flag(
        &self,
        order_id: OrderId,
        flag: OrderFlag,
        value: bool,
    ) -> Result<Order, ClientError>;
    async fn delete(&self, order_id: OrderId) -> Result<(), ClientError>;
    async fn subscribe(&self) -> Result<ChangeFeed, ClientError>;
}

/// Decodes a feed frame and validates its records at the boundary.
pub fn parse_feed_frame(text: &str) -> FeedItem {
    match serde_json::from_str::<ServerEvent>(text) {
        Ok(ServerEvent::Subscribed) => FeedItem::Subscribed,
        Ok(ServerEvent::Change(event)) => match event.validate() {
            Ok(()) => FeedItem::Change(event),
            Err(err) => FeedItem::Malformed(format!(
                "invalid record {} in change event: {err}",
                event.order_id()
            )),
        },
        Err(err) => FeedItem::Malformed(format!("undecodable frame: {err}")),
    }
}

pub struct HttpOrderStore {
    http: Client,
    server_url: String,
    feed_url: Url,
}

impl HttpOrderStore {
    pub fn new(server_url: &str) -> Result<Self, ClientError> {
        let server_url = server_url.trim_end_matches('/').to_string();
        let mut feed_url = Url::parse(&server_url).map_err(|err| {
            ClientError::ConnectionUnavailable(format!("invalid server url '{server_url}': {err}"))
        })?;
        let scheme = match feed_url.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => {
                return Err(ClientError::ConnectionUnavailable(format!(
                    "server url must start with http:// or https://, got {other}://"
                )))
            }
        };
        feed_url
            .set_scheme(scheme)
            .map_err(|()| ClientError::ConnectionUnavailable("cannot derive feed url".into()))?;
        let feed_path = format!("{}/ws", feed_url.path().trim_end_matches('/'));
        feed_url.set_path(&feed_path);

        Ok(Self {
            http: Client::new(),
            server_url,
            feed_url,
        })
    }

    pub fn feed_url(&self) -> &Url {
        &self.feed_url
    }

    fn health_url(&self) -> String {
        format!("{}/healthz", self.server_url)
    }

    fn orders_url(&self) -> String {
        format!("{}/orders", self.server_url)
    }

    fn order_url(&self, order_id: OrderId) -> String {
        format!("{}/orders/{order_id}", self.server_url)
    }
}

#[async_trait]
impl OrderStore for HttpOrderStore {
    async fn check_connection(&self) -> Result<(), ClientError> {
        let response = self.http.get(self.health_url()).send().await?;
        match ensure_success(response).await {
            Ok(_) => Ok(()),
            Err(ClientError::QueryFailed(reason)) => {
                Err(ClientError::ConnectionUnavailable(reason))
            }
            Err(err) => Err(err),
        }
    }

    async fn fetch_all(&self) -> Result<Vec<Order>, ClientError> {
        let response = self.http.get(self.orders_url()).send().await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    async fn insert(&self, row: OrderInsert) -> Result<Order, ClientError> {
        let response = self.http.post(self.orders_url()).json(&row).send().await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    async fn set_flag(
        &self,
        order_id: OrderId,
        flag: OrderFlag,
        value: bool,
    ) -> Result<Order, ClientError> {
        let response = self
            .http
            .patch(self.order_url(order_id))
            .json(&FlagUpdate::single(flag, value))
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    async fn delete(&self, order_id: OrderId) -> Result<(), ClientError> {
        let response = self.http.delete(self.order_url(order_id)).send().await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<ChangeFeed, ClientError> {
        let (ws_stream, _) = connect_async(self.feed_url.as_str()).await?;
        let (_, mut ws_reader) = ws_stream.split();
        info!(feed_url = %self.feed_url, "change feed connected");

        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                let item = match msg {
                    Ok(Message::Text(text)) => parse_feed_frame(&text),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(err) => {
                        warn!(%err, "change feed receive failed");
                        break;
                    }
                };
                if tx.send(item).await.is_err() {
                    debug!("change feed handle dropped; stopping reader");
                    break;
                }
            }
            info!("change feed closed");
        });

        Ok(ChangeFeed::new(rx, Some(reader)))
    }
}

async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = match response.json::<ApiError>().await {
        Ok(error) => error.message,
        Err(_) => format!("store answered {status}"),
    };
    Err(ClientError::QueryFailed(message))
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
