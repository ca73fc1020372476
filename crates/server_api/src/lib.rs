use shared::{
    domain::{Order, OrderFlag, OrderId, OrderInsert},
    error::{ApiError, ErrorCode},
    protocol::FlagUpdate,
};
use storage::Storage;
use tracing::info;

const TOTAL_PRICE_TOLERANCE: f64 = 1e-6;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

pub async fn list_orders(ctx: &ApiContext) -> Result<Vec<Order>, ApiError> {
    ctx.storage.list_orders().await.map_err(internal)
}

pub async fn create_order(ctx: &ApiContext, insert: OrderInsert) -> Result<Order, ApiError> {
    validate_insert(&insert)?;
    let order = ctx.storage.insert_order(&insert).await.map_err(internal)?;
    info!(order_id = %order.id, client = %order.client_name, "order created");
    Ok(order)
}

/// Applies every flag named in `update` and returns the resulting row.
pub async fn update_flags(
    ctx: &ApiContext,
    order_id: OrderId,
    update: FlagUpdate,
) -> Result<Order, ApiError> {
    if update.is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "update must set completado or pagado",
        ));
    }

    let mut updated = None;
    for (flag, value) in [
        (OrderFlag::Completed, update.completed),
        (OrderFlag::Paid, update.paid),
    ] {
        let Some(value) = value else {
            continue;
        };
        let order = ctx
            .storage
            .set_flag(order_id, flag, value)
            .await
            .map_err(internal)?
            .ok_or_else(|| not_found(order_id))?;
        info!(%order_id, flag = flag.column(), value, "order flag updated");
        updated = Some(order);
    }

    updated.ok_or_else(|| not_found(order_id))
}

pub async fn delete_order(ctx: &ApiContext, order_id: OrderId) -> Result<(), ApiError> {
    let removed = ctx
        .storage
        .delete_order(order_id)
        .await
        .map_err(internal)?;
    if !removed {
        return Err(not_found(order_id));
    }
    info!(%order_id, "order deleted");
    Ok(())
}

fn validate_insert(insert: &OrderInsert) -> Result<(), ApiError> {
    if insert.client_name.trim().is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "client name is required",
        ));
    }
    insert.validate()?;

    let expected_total = f64::from(insert.quantity) * insert.unit_price;
    if (insert.total_price - expected_total).abs() > TOTAL_PRICE_TOLERANCE * expected_total.max(1.0)
    {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!(
                "total price {} does not equal quantity x unit price ({expected_total})",
                insert.total_price
            ),
        ));
    }
    if insert.completed || insert.paid {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "new orders start neither completed nor paid",
        ));
    }
    Ok(())
}

fn not_found(order_id: OrderId) -> ApiError {
    ApiError::new(ErrorCode::NotFound, format!("order {order_id} not found"))
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}
