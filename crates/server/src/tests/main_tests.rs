use super::*;
use axum::{
    body::{self, Body},
    http::Request,
};
use chrono::NaiveDate;
use futures::StreamExt;
use tokio::{net::TcpListener, sync::broadcast::Receiver};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tower::ServiceExt;

type FeedSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn test_state(feed_capacity: usize) -> Arc<AppState> {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let (events, _) = broadcast::channel(feed_capacity);
    Arc::new(AppState {
        api: ApiContext { storage },
        events,
    })
}

async fn test_app() -> (Router, Receiver<ChangeEvent>) {
    let state = test_state(32).await;
    let events_rx = state.events.subscribe();
    (build_router(state), events_rx)
}

async fn serve(state: Arc<AppState>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("ws://{addr}/ws")
}

async fn next_frame(socket: &mut FeedSocket) -> serde_json::Value {
    loop {
        match socket.next().await.expect("frame").expect("ws message") {
            WsMessage::Text(text) => return serde_json::from_str(&text).expect("json frame"),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => panic!("unexpected feed message {other:?}"),
        }
    }
}

fn ana_insert() -> serde_json::Value {
    serde_json::json!({
        "nombreCliente": "Ana",
        "numeroContacto": "3001234567",
        "descripcion": "logo en gorra",
        "cantidad": 2,
        "precio": 50.0,
        "precioTotal": 100.0,
        "fechaEntrega": "2024-05-03",
        "completado": false,
        "pagado": false
    })
}

async fn json_body<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

async fn create(app: &Router) -> Order {
    let request = Request::post("/orders")
        .header("content-type", "application/json")
        .body(Body::from(ana_insert().to_string()))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let (app, _events) = test_app().await;
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn create_returns_stored_order_and_broadcasts_insert() {
    let (app, mut events) = test_app().await;

    let order = create(&app).await;
    assert_eq!(order.client_name, "Ana");
    assert_eq!(order.total_price, 100.0);
    assert_eq!(
        order.delivery_date,
        NaiveDate::from_ymd_opt(2024, 5, 3).expect("date")
    );
    assert!(!order.completed && !order.paid);

    assert_eq!(
        events.recv().await.expect("event"),
        ChangeEvent::Inserted {
            order: order.clone()
        }
    );

    let request = Request::get("/orders").body(Body::empty()).expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let listed: Vec<Order> = json_body(response).await;
    assert_eq!(listed, vec![order]);
}

#[tokio::test]
async fn create_rejects_invalid_rows() {
    let (app, mut events) = test_app().await;
    let mut insert = ana_insert();
    insert["cantidad"] = serde_json::json!(0);
    insert["precioTotal"] = serde_json::json!(0.0);

    let request = Request::post("/orders")
        .header("content-type", "application/json")
        .body(Body::from(insert.to_string()))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ApiError = json_body(response).await;
    assert_eq!(error.code, ErrorCode::Validation);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn patch_sets_flag_and_broadcasts_full_row() {
    let (app, mut events) = test_app().await;
    let order = create(&app).await;
    let _inserted = events.recv().await.expect("insert event");

    let request = Request::patch(format!("/orders/{}", order.id))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::json!({ "pagado": true }).to_string()))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Order = json_body(response).await;
    assert!(updated.paid);
    assert!(!updated.completed);

    assert_eq!(
        events.recv().await.expect("event"),
        ChangeEvent::Updated { order: updated }
    );
}

#[tokio::test]
async fn patch_and_delete_unknown_order_return_not_found() {
    let (app, _events) = test_app().await;
    let missing = OrderId::new_v4();

    let request = Request::patch(format!("/orders/{missing}"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::json!({ "completado": true }).to_string()))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let request = Request::delete(format!("/orders/{missing}"))
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let request = Request::delete("/orders/not-a-uuid")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_removes_order_and_broadcasts_id() {
    let (app, mut events) = test_app().await;
    let order = create(&app).await;
    let _inserted = events.recv().await.expect("insert event");

    let request = Request::delete(format!("/orders/{}", order.id))
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        events.recv().await.expect("event"),
        ChangeEvent::Deleted { order_id: order.id }
    );

    let request = Request::get("/orders").body(Body::empty()).expect("request");
    let response = app.oneshot(request).await.expect("response");
    let listed: Vec<Order> = json_body(response).await;
    assert!(listed.is_empty());
}

#[tokio::test]
async fn malformed_bodies_get_json_validation_errors() {
    let (app, mut events) = test_app().await;

    let request = Request::post("/orders")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({ "nombreCliente": "Ana", "cantidad": -1 }).to_string(),
        ))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let error: ApiError = json_body(response).await;
    assert_eq!(error.code, ErrorCode::Validation);
    assert!(error.message.contains("cantidad"), "{}", error.message);

    let order = create(&app).await;
    let _inserted = events.recv().await.expect("insert event");
    let request = Request::patch(format!("/orders/{}", order.id))
        .header("content-type", "application/json")
        .body(Body::from("{\"pagado\": \"si\""))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert!(response.status().is_client_error());
    let error: ApiError = json_body(response).await;
    assert_eq!(error.code, ErrorCode::Validation);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn bodies_over_the_cap_are_rejected() {
    let (app, mut events) = test_app().await;
    let mut insert = ana_insert();
    insert["descripcion"] = serde_json::json!("x".repeat(MAX_BODY_BYTES + 1));

    let request = Request::post("/orders")
        .header("content-type", "application/json")
        .body(Body::from(insert.to_string()))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let error: ApiError = json_body(response).await;
    assert_eq!(error.code, ErrorCode::Validation);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn feed_acknowledges_then_streams_writes() {
    let state = test_state(32).await;
    let feed_url = serve(state.clone()).await;
    let (mut socket, _) = connect_async(feed_url.as_str()).await.expect("connect");

    assert_eq!(
        next_frame(&mut socket).await,
        serde_json::json!({ "type": "subscribed" })
    );

    let order = create(&build_router(state)).await;
    let frame = next_frame(&mut socket).await;
    assert_eq!(frame["type"], "change");
    assert_eq!(frame["payload"]["type"], "inserted");
    let decoded: ServerEvent = serde_json::from_value(frame).expect("server event");
    assert_eq!(
        decoded,
        ServerEvent::Change(ChangeEvent::Inserted { order })
    );

    socket.close(None).await.expect("close");
}

#[tokio::test]
async fn lagging_feed_subscriber_is_closed() {
    let state = test_state(1).await;
    let feed_url = serve(state.clone()).await;
    let (mut socket, _) = connect_async(feed_url.as_str()).await.expect("connect");
    assert_eq!(
        next_frame(&mut socket).await,
        serde_json::json!({ "type": "subscribed" })
    );

    // Nothing yields between sends, so the connection's receiver falls behind.
    for _ in 0..3 {
        publish(
            &state,
            ChangeEvent::Deleted {
                order_id: OrderId::new_v4(),
            },
        );
    }

    match socket.next().await {
        None | Some(Ok(WsMessage::Close(_))) | Some(Err(_)) => {}
        Some(Ok(other)) => panic!("expected the feed to close, got {other:?}"),
    }
}
