use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{Order, OrderFlag, OrderId, OrderInsert};

const ORDER_COLUMNS: &str = "id, nombre_cliente, numero_contacto, descripcion, cantidad, precio, precio_total, fecha_entrega, fecha_creacion, completado, pagado";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // An in-memory database exists per connection, so it must not be spread over a pool.
        let max_connections = if database_url.starts_with("sqlite::memory:") {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// All orders, newest creation timestamp first.
    pub async fn list_orders(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM bordados ORDER BY fecha_creacion DESC, rowid DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .context("failed to list orders")?;

        rows.iter().map(order_from_row).collect()
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM bordados WHERE id = ?"))
            .bind(order_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to load order {order_id}"))?;

        row.as_ref().map(order_from_row).transpose()
    }

    pub async fn insert_order(&self, insert: &OrderInsert) -> Result<Order> {
        self.insert_order_at(insert, Utc::now()).await
    }

    pub async fn insert_order_at(
        &self,
        insert: &OrderInsert,
        created_at: DateTime<Utc>,
    ) -> Result<Order> {
        let row = sqlx::query(&format!(
            "INSERT INTO bordados (id, nombre_cliente, numero_contacto, descripcion, cantidad, precio, precio_total, fecha_entrega, fecha_creacion, completado, pagado)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(OrderId::new_v4().to_string())
        .bind(insert.client_name.as_str())
        .bind(insert.contact_number.as_str())
        .bind(insert.description.as_str())
        .bind(i64::from(insert.quantity))
        .bind(insert.unit_price)
        .bind(insert.total_price)
        .bind(insert.delivery_date)
        .bind(format_timestamp(created_at))
        .bind(insert.completed)
        .bind(insert.paid)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert order")?;

        order_from_row(&row)
    }

    /// Writes one boolean column and returns the updated row, or `None` when
    /// no order has that id.
    pub async fn set_flag(
        &self,
        order_id: OrderId,
        flag: OrderFlag,
        value: bool,
    ) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "UPDATE bordados SET {} = ? WHERE id = ? RETURNING {ORDER_COLUMNS}",
            flag.column()
        ))
        .bind(value)
        .bind(order_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to update {} for order {order_id}", flag.column()))?;

        row.as_ref().map(order_from_row).transpose()
    }

    pub async fn delete_order(&self, order_id: OrderId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bordados WHERE id = ?")
            .bind(order_id.to_string())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete order {order_id}"))?;
        Ok(result.rows_affected() > 0)
    }
}

fn order_from_row(row: &SqliteRow) -> Result<Order> {
    let raw_id: String = row.try_get("id")?;
    let id = OrderId::from_str(&raw_id)
        .with_context(|| format!("stored order id '{raw_id}' is not a uuid"))?;
    let quantity: i64 = row.try_get("cantidad")?;
    let raw_created_at: String = row.try_get("fecha_creacion")?;

    Ok(Order {
        id,
        client_name: row.try_get("nombre_cliente")?,
        contact_number: row.try_get("numero_contacto")?,
        description: row.try_get("descripcion")?,
        quantity: u32::try_from(quantity)
            .with_context(|| format!("order {id} has out-of-range quantity {quantity}"))?,
        unit_price: row.try_get("precio")?,
        total_price: row.try_get("precio_total")?,
        delivery_date: row.try_get::<NaiveDate, _>("fecha_entrega")?,
        created_at: parse_timestamp(&raw_created_at)
            .with_context(|| format!("order {id} has invalid creation timestamp"))?,
        completed: row.try_get("completado")?,
        paid: row.try_get("pagado")?,
    })
}

/// Fixed-width so that lexical order in SQL matches chronological order.
fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
