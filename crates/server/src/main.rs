use std::{net::SocketAddr, str::FromStr, sync::Arc};

use axum::{
    extract::{
        rejection::JsonRejection,
        ws::{Message, WebSocket},
        DefaultBodyLimit, Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use server_api::{create_order, delete_order, list_orders, update_flags, ApiContext};
use shared::{
    domain::{Order, OrderId, OrderInsert},
    error::{ApiError, ErrorCode},
    protocol::{ChangeEvent, FlagUpdate, ServerEvent},
};
use storage::Storage;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, prepare_database_url};

const MAX_BODY_BYTES: usize = 64 * 1024;

type HttpResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let (events, _) = broadcast::channel(settings.feed_capacity);

    let state = AppState {
        api: ApiContext { storage },
        events,
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "order store listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("order store stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/orders", get(http_list_orders).post(http_create_order))
        .route(
            "/orders/:order_id",
            patch(http_update_flags).delete(http_delete_order),
        )
        .route("/ws", get(ws_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.api.storage.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(error) => {
            error!(%error, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    }
}

async fn http_list_orders(State(state): State<Arc<AppState>>) -> HttpResult<Json<Vec<Order>>> {
    let orders = list_orders(&state.api).await.map_err(reject)?;
    Ok(Json(orders))
}

async fn http_create_order(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<OrderInsert>, JsonRejection>,
) -> HttpResult<(StatusCode, Json<Order>)> {
    let insert = json_payload(payload)?;
    let order = create_order(&state.api, insert).await.map_err(reject)?;
    publish(
        &state,
        ChangeEvent::Inserted {
            order: order.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(order)))
}

async fn http_update_flags(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
    payload: Result<Json<FlagUpdate>, JsonRejection>,
) -> HttpResult<Json<Order>> {
    let order_id = parse_order_id(&order_id)?;
    let update = json_payload(payload)?;
    let order = update_flags(&state.api, order_id, update)
        .await
        .map_err(reject)?;
    publish(
        &state,
        ChangeEvent::Updated {
            order: order.clone(),
        },
    );
    Ok(Json(order))
}

async fn http_delete_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> HttpResult<StatusCode> {
    let order_id = parse_order_id(&order_id)?;
    delete_order(&state.api, order_id).await.map_err(reject)?;
    publish(&state, ChangeEvent::Deleted { order_id });
    Ok(StatusCode::NO_CONTENT)
}

fn publish(state: &AppState, event: ChangeEvent) {
    // No receivers simply means no feed is connected right now.
    if state.events.send(event).is_err() {
        debug!("change event dropped: no feed subscribers");
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket) {
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    // Subscribe before acknowledging so nothing written after the client's
    // initial load can slip between the two.
    let mut events_rx = state.events.subscribe();
    info!("change feed subscriber connected");

    let send_task = tokio::spawn(async move {
        if send_frame(&mut sender, &ServerEvent::Subscribed).await.is_err() {
            return;
        }
        loop {
            let event = match events_rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "change feed subscriber lagged; closing feed");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                Err(RecvError::Closed) => break,
            };
            if send_frame(&mut sender, &ServerEvent::Change(event))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
    info!("change feed subscriber disconnected");
}

async fn send_frame<S>(sender: &mut S, frame: &ServerEvent) -> Result<(), ()>
where
    S: futures::Sink<Message> + Unpin,
{
    use futures::SinkExt;

    let text = match serde_json::to_string(frame) {
        Ok(v) => v,
        Err(error) => {
            error!(%error, "failed to encode change feed frame");
            return Ok(());
        }
    };
    sender.send(Message::Text(text)).await.map_err(|_| ())
}

fn parse_order_id(raw: &str) -> HttpResult<OrderId> {
    OrderId::from_str(raw).map_err(|_| {
        reject(ApiError::new(
            ErrorCode::Validation,
            format!("'{raw}' is not a valid order id"),
        ))
    })
}

/// Body rejections keep axum's status but carry the usual JSON error body.
fn json_payload<T>(payload: Result<Json<T>, JsonRejection>) -> HttpResult<T> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        debug!(status = %rejection.status(), "request body rejected");
        (
            rejection.status(),
            Json(ApiError::new(ErrorCode::Validation, rejection.body_text())),
        )
    })
}

fn reject(error: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match error.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(message = %error.message, "request failed");
    }
    (status, Json(error))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
