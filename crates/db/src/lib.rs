use std::str::FromStr;

use anyhow::Result;
use ecopark_models::{
    PURCHASED_AT_FORMAT, PaymentMethod, Purchase, PurchaseDetail, PurchaseError, PurchaseRecord,
    TicketRecord, TicketTier, User, VISIT_DATE_FORMAT,
};
use serde::Serialize;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use tracing::{info, warn};

pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;
    info!("Connected to database: {database_url}");
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    info!("Migrations applied");
    Ok(())
}

const PURCHASE_COLUMNS: &str = "id, id_usuario, fecha_visita, fecha_compra, cantidad, medio_pago";

// --- Users ---

pub async fn find_or_create_user(pool: &SqlitePool, email: &str, nombre: &str) -> Result<User> {
    sqlx::query("INSERT INTO usuarios (email, nombre) VALUES (?, ?) ON CONFLICT(email) DO NOTHING")
        .bind(email)
        .bind(nombre)
        .execute(pool)
        .await?;
    let user = sqlx::query_as::<_, User>("SELECT id, email, nombre FROM usuarios WHERE email = ?")
        .bind(email)
        .fetch_one(pool)
        .await?;
    Ok(user)
}

pub async fn get_user(pool: &SqlitePool, user_id: i64) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT id, email, nombre FROM usuarios WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn list_users(pool: &SqlitePool) -> Result<Vec<User>> {
    let users = sqlx::query_as::<_, User>("SELECT id, email, nombre FROM usuarios ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(users)
}

// --- Purchases ---

/// Stores a purchase and its tickets for `user_id` in one transaction.
///
/// Fails with [`PurchaseError::UserNotRegistered`] when the user does not
/// exist. Business rules are not re-checked here.
pub async fn record_purchase(pool: &SqlitePool, user_id: i64, purchase: &Purchase) -> Result<i64> {
    let mut tx = pool.begin().await?;

    let user: Option<i64> = sqlx::query_scalar("SELECT id FROM usuarios WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
    if user.is_none() {
        warn!("Purchase rejected: user {user_id} is not registered");
        return Err(PurchaseError::UserNotRegistered(user_id).into());
    }

    let purchase_id = sqlx::query(
        "INSERT INTO compras (id_usuario, fecha_visita, fecha_compra, cantidad, medio_pago) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(purchase.visit_date().format(VISIT_DATE_FORMAT).to_string())
    .bind(purchase.created_at().format(PURCHASED_AT_FORMAT).to_string())
    .bind(purchase.tickets().len() as i64)
    .bind(purchase.payment_method().as_str())
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for ticket in purchase.tickets() {
        sqlx::query("INSERT INTO entradas (id_compra, edad, tipo_entrada) VALUES (?, ?, ?)")
            .bind(purchase_id)
            .bind(i64::from(ticket.age()))
            .bind(ticket.tier().as_str())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    info!(
        "Purchase {purchase_id} stored for user {user_id}: {} ticket(s) for {}",
        purchase.tickets().len(),
        purchase.visit_date()
    );
    Ok(purchase_id)
}

pub async fn list_purchases_for_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<PurchaseRecord>> {
    let sql = format!("SELECT {PURCHASE_COLUMNS} FROM compras WHERE id_usuario = ? ORDER BY id ASC");
    let purchases = sqlx::query_as::<_, PurchaseRecord>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(purchases)
}

pub async fn list_tickets_for_purchase(pool: &SqlitePool, purchase_id: i64) -> Result<Vec<TicketRecord>> {
    let tickets = sqlx::query_as::<_, TicketRecord>(
        "SELECT id, id_compra, edad, tipo_entrada FROM entradas WHERE id_compra = ? ORDER BY id",
    )
    .bind(purchase_id)
    .fetch_all(pool)
    .await?;
    Ok(tickets)
}

async fn load_detail(pool: &SqlitePool, purchase: PurchaseRecord) -> Result<PurchaseDetail> {
    let user = sqlx::query_as::<_, User>("SELECT id, email, nombre FROM usuarios WHERE id = ?")
        .bind(purchase.id_usuario)
        .fetch_one(pool)
        .await?;
    let tickets = list_tickets_for_purchase(pool, purchase.id).await?;
    Ok(PurchaseDetail { purchase, user, tickets })
}

pub async fn get_purchase(pool: &SqlitePool, purchase_id: i64) -> Result<Option<PurchaseDetail>> {
    let sql = format!("SELECT {PURCHASE_COLUMNS} FROM compras WHERE id = ?");
    let record = sqlx::query_as::<_, PurchaseRecord>(&sql)
        .bind(purchase_id)
        .fetch_optional(pool)
        .await?;
    match record {
        Some(record) => Ok(Some(load_detail(pool, record).await?)),
        None => Ok(None),
    }
}

/// Every purchase with buyer and tickets, newest first.
pub async fn list_purchases(pool: &SqlitePool) -> Result<Vec<PurchaseDetail>> {
    let sql = format!("SELECT {PURCHASE_COLUMNS} FROM compras ORDER BY id DESC");
    let records = sqlx::query_as::<_, PurchaseRecord>(&sql).fetch_all(pool).await?;
    let mut details = Vec::with_capacity(records.len());
    for record in records {
        details.push(load_detail(pool, record).await?);
    }
    Ok(details)
}

// --- Statistics ---

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub users: i64,
    pub purchases: i64,
    pub tickets: i64,
    pub cash_purchases: i64,
    pub card_purchases: i64,
    pub regular_tickets: i64,
    pub vip_tickets: i64,
    pub revenue: i64,
    pub latest: Option<LatestPurchase>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct LatestPurchase {
    pub fecha_visita: String,
    pub nombre: String,
}

impl Stats {
    pub fn average_tickets(&self) -> f64 {
        ratio(self.tickets, self.purchases)
    }

    pub fn average_revenue(&self) -> f64 {
        ratio(self.revenue, self.purchases)
    }

    pub fn share_of_purchases(&self, count: i64) -> f64 {
        ratio(count, self.purchases) * 100.0
    }
}

fn ratio(n: i64, d: i64) -> f64 {
    if d > 0 { n as f64 / d as f64 } else { 0.0 }
}

async fn count(pool: &SqlitePool, sql: &str, filter: Option<&str>) -> Result<i64> {
    let mut query = sqlx::query_scalar::<sqlx::Sqlite, i64>(sql);
    if let Some(value) = filter {
        query = query.bind(value);
    }
    Ok(query.fetch_one(pool).await?)
}

pub async fn stats(pool: &SqlitePool) -> Result<Stats> {
    let by_method = "SELECT COUNT(*) FROM compras WHERE medio_pago = ?";
    let by_tier = "SELECT COUNT(*) FROM entradas WHERE tipo_entrada = ?";
    let revenue_sql = format!(
        "SELECT COALESCE(SUM(CASE tipo_entrada WHEN '{}' THEN {} WHEN '{}' THEN {} ELSE 0 END), 0) FROM entradas",
        TicketTier::Regular.as_str(),
        TicketTier::Regular.price(),
        TicketTier::Vip.as_str(),
        TicketTier::Vip.price(),
    );

    let latest = sqlx::query_as::<_, LatestPurchase>(
        "SELECT c.fecha_visita, u.nombre FROM compras c \
         JOIN usuarios u ON c.id_usuario = u.id \
         ORDER BY c.id DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(Stats {
        users: count(pool, "SELECT COUNT(*) FROM usuarios", None).await?,
        purchases: count(pool, "SELECT COUNT(*) FROM compras", None).await?,
        tickets: count(pool, "SELECT COUNT(*) FROM entradas", None).await?,
        cash_purchases: count(pool, by_method, Some(PaymentMethod::Cash.as_str())).await?,
        card_purchases: count(pool, by_method, Some(PaymentMethod::Card.as_str())).await?,
        regular_tickets: count(pool, by_tier, Some(TicketTier::Regular.as_str())).await?,
        vip_tickets: count(pool, by_tier, Some(TicketTier::Vip.as_str())).await?,
        revenue: count(pool, &revenue_sql, None).await?,
        latest,
    })
}

// --- Cleanup ---

/// Rows removed by a cleanup operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Removed {
    pub users: u64,
    pub purchases: u64,
    pub tickets: u64,
}

/// Deletes every purchase and ticket, keeping users, and restarts their ids at 1.
pub async fn clear_purchases(pool: &SqlitePool) -> Result<Removed> {
    let mut tx = pool.begin().await?;
    let tickets = sqlx::query("DELETE FROM entradas").execute(&mut *tx).await?.rows_affected();
    let purchases = sqlx::query("DELETE FROM compras").execute(&mut *tx).await?.rows_affected();
    sqlx::query("DELETE FROM sqlite_sequence WHERE name IN ('compras', 'entradas')")
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    info!("Cleared {purchases} purchases and {tickets} tickets");
    Ok(Removed { users: 0, purchases, tickets })
}

/// Deletes everything, users included, and restarts all ids at 1.
pub async fn clear_all(pool: &SqlitePool) -> Result<Removed> {
    let mut tx = pool.begin().await?;
    let tickets = sqlx::query("DELETE FROM entradas").execute(&mut *tx).await?.rows_affected();
    let purchases = sqlx::query("DELETE FROM compras").execute(&mut *tx).await?.rows_affected();
    let users = sqlx::query("DELETE FROM usuarios").execute(&mut *tx).await?.rows_affected();
    sqlx::query("DELETE FROM sqlite_sequence").execute(&mut *tx).await?;
    tx.commit().await?;
    info!("Cleared {users} users, {purchases} purchases and {tickets} tickets");
    Ok(Removed { users, purchases, tickets })
}

/// Returns `None` when no such purchase exists.
pub async fn delete_purchase(pool: &SqlitePool, purchase_id: i64) -> Result<Option<Removed>> {
    let mut tx = pool.begin().await?;
    let tickets = sqlx::query("DELETE FROM entradas WHERE id_compra = ?")
        .bind(purchase_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    let purchases = sqlx::query("DELETE FROM compras WHERE id = ?")
        .bind(purchase_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if purchases == 0 {
        tx.rollback().await?;
        return Ok(None);
    }
    tx.commit().await?;
    info!("Purchase {purchase_id} deleted with {tickets} ticket(s)");
    Ok(Some(Removed { users: 0, purchases, tickets }))
}

/// Deletes a user with all of their purchases. `None` when no such user exists.
pub async fn delete_user(pool: &SqlitePool, user_id: i64) -> Result<Option<Removed>> {
    let mut tx = pool.begin().await?;
    let tickets = sqlx::query(
        "DELETE FROM entradas WHERE id_compra IN (SELECT id FROM compras WHERE id_usuario = ?)",
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    let purchases = sqlx::query("DELETE FROM compras WHERE id_usuario = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    let users = sqlx::query("DELETE FROM usuarios WHERE id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if users == 0 {
        tx.rollback().await?;
        return Ok(None);
    }
    tx.commit().await?;
    info!("User {user_id} deleted with {purchases} purchase(s) and {tickets} ticket(s)");
    Ok(Some(Removed { users, purchases, tickets }))
}
