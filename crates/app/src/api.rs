use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use ecopark_models::{
    Notifier, PaymentMethod, Purchase, PurchaseError, PurchaseRecord, Ticket, UnknownTier, User,
    VISIT_DATE_FORMAT,
};
use ecopark_payments::{CARD_FIELDS, CardData, PaymentOutcome, PaymentSimulator, PaymentStatus};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::notify::{AwaitingPayment, LogNotifier};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub payments: Arc<Mutex<PaymentSimulator>>,
    pub customer_email: String,
    pub customer_name: String,
    pub payment_delay: Duration,
}

// --- Errors ---

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Purchase(#[from] PurchaseError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Falta el campo: {0}")]
    MissingPaymentField(&'static str),

    #[error(transparent)]
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<PurchaseError>() {
            Ok(purchase) => ApiError::Purchase(purchase),
            Err(other) => ApiError::Internal(other),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<UnknownTier> for ApiError {
    fn from(err: UnknownTier) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Purchase(_) | ApiError::BadRequest(_) | ApiError::MissingPaymentField(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let ApiError::MissingPaymentField(_) = self {
            // same shape as a rejected payment outcome
            info!(%status, error = %self, "Payment request rejected");
            return (status, Json(json!({ "status": "rejected", "message": self.to_string() }))).into_response();
        }
        let message = match &self {
            ApiError::Internal(err) => {
                error!(error = ?err, "Unexpected error");
                "Ocurrió un error inesperado.".to_string()
            }
            other => {
                info!(%status, error = %other, "Request rejected");
                other.to_string()
            }
        };
        (status, Json(json!({ "status": "error", "mensaje": message }))).into_response()
    }
}

// --- Handlers ---

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "EcoHarmony Park",
        "version": crate::version_string()
    }))
}

async fn api_current_user(State(state): State<AppState>) -> Result<Json<User>, ApiError> {
    let user = ecopark_db::find_or_create_user(&state.pool, &state.customer_email, &state.customer_name).await?;
    Ok(Json(user))
}

#[derive(Deserialize)]
struct TicketRequest {
    edad: u32,
    #[serde(rename = "tipoEntrada")]
    tipo_entrada: String,
}

#[derive(Deserialize)]
struct PurchaseRequest {
    fecha: String,
    entradas: Vec<TicketRequest>,
    #[serde(rename = "medioPago", default)]
    medio_pago: String,
}

impl PurchaseRequest {
    fn into_purchase(self) -> Result<Purchase, ApiError> {
        let tickets = self
            .entradas
            .iter()
            .map(|t| -> Result<Ticket, UnknownTier> { Ok(Ticket::new(t.edad, t.tipo_entrada.parse()?)) })
            .collect::<Result<Vec<_>, UnknownTier>>()?;
        let payment_method: PaymentMethod = self.medio_pago.parse()?;
        let visit_date = NaiveDate::parse_from_str(&self.fecha, VISIT_DATE_FORMAT)
            .map_err(|_| ApiError::BadRequest(format!("Fecha inválida: {}", self.fecha)))?;
        Ok(Purchase::new(visit_date, tickets, payment_method))
    }
}

async fn api_create_purchase(
    State(state): State<AppState>,
    payload: Result<Json<PurchaseRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(body) = payload?;
    let purchase = body.into_purchase()?;
    purchase.validate()?;
    let total = purchase.total();

    let user = ecopark_db::find_or_create_user(&state.pool, &state.customer_email, &state.customer_name).await?;
    let purchase_id = ecopark_db::record_purchase(&state.pool, user.id, &purchase).await?;

    let (summary, checkout) = {
        let mut payments = state
            .payments
            .lock()
            .map_err(|_| anyhow::anyhow!("payment simulator lock poisoned"))?;
        match purchase.payment_method() {
            PaymentMethod::Cash => {
                let summary = purchase.finalize(&mut *payments, &mut LogNotifier::new(&user.email))?;
                (summary, None)
            }
            PaymentMethod::Card => {
                let summary = purchase.finalize(&mut *payments, &mut AwaitingPayment)?;
                (summary, payments.pending_checkout().cloned())
            }
        }
    };

    let response = match checkout {
        Some(preference) => {
            info!("Purchase {purchase_id} redirected to checkout {}", preference.preference_id);
            json!({
                "status": "redireccion",
                "mensaje": "Redirigiendo a Mercado Pago...",
                "checkout_url": preference.checkout_url(purchase_id),
                "preference_id": preference.preference_id,
                "id_compra": purchase_id,
                "total": total,
                "cantidad": summary.ticket_count,
            })
        }
        None => json!({
            "status": "exito",
            "mensaje": format!(
                "¡Compra exitosa! Se compraron {} entradas para el {}.",
                summary.ticket_count,
                summary.visit_date.format("%d/%m/%Y")
            ),
            "total": total,
            "id_compra": purchase_id,
        }),
    };
    Ok(Json(response))
}

#[derive(Deserialize)]
struct PaymentRequest {
    #[serde(flatten)]
    card: CardData,
    #[serde(default, deserialize_with = "purchase_id")]
    compra_id: Option<i64>,
}

/// The checkout page echoes the purchase id from its query string, so it
/// may arrive as text. Text that is not a number references no purchase.
fn purchase_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    Ok(match Option::<RawId>::deserialize(deserializer)? {
        Some(RawId::Number(id)) => Some(id),
        Some(RawId::Text(text)) => text.trim().parse().ok(),
        None => None,
    })
}

#[derive(Serialize)]
struct PaymentResponse {
    #[serde(flatten)]
    outcome: PaymentOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    email_enviado: Option<bool>,
}

async fn api_process_payment(
    State(state): State<AppState>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let Json(raw) = payload?;
    if let Some(field) = CARD_FIELDS.iter().copied().find(|field| raw.get(field).is_none()) {
        return Err(ApiError::MissingPaymentField(field));
    }
    let body: PaymentRequest =
        serde_json::from_value(raw).map_err(|e| ApiError::BadRequest(format!("Datos de pago inválidos: {e}")))?;

    if !state.payment_delay.is_zero() {
        tokio::time::sleep(state.payment_delay).await;
    }

    let outcome = state
        .payments
        .lock()
        .map_err(|_| anyhow::anyhow!("payment simulator lock poisoned"))?
        .process_payment(&body.card);

    let email_enviado = match (outcome.status, body.compra_id) {
        (PaymentStatus::Approved, Some(purchase_id)) => Some(confirm_paid_purchase(&state, purchase_id).await),
        _ => None,
    };

    Ok(Json(PaymentResponse { outcome, email_enviado }))
}

/// Sends the confirmation for a purchase whose card payment was approved.
/// Failures are logged; the payment itself already went through.
async fn confirm_paid_purchase(state: &AppState, purchase_id: i64) -> bool {
    let detail = match ecopark_db::get_purchase(&state.pool, purchase_id).await {
        Ok(Some(detail)) => detail,
        Ok(None) => {
            warn!("Approved payment references unknown purchase {purchase_id}");
            return false;
        }
        Err(e) => {
            warn!("Could not load purchase {purchase_id} for confirmation: {e:#}");
            return false;
        }
    };

    let mut notifier = LogNotifier::new(&detail.user.email);
    let sent = detail
        .to_purchase()
        .and_then(|purchase| notifier.send_confirmation(&purchase));
    match sent {
        Ok(()) => true,
        Err(e) => {
            warn!("Confirmation for purchase {purchase_id} failed: {e:#}");
            false
        }
    }
}

async fn api_list_user_purchases(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<PurchaseRecord>>, ApiError> {
    if ecopark_db::get_user(&state.pool, user_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Usuario {user_id} no encontrado")));
    }
    let purchases = ecopark_db::list_purchases_for_user(&state.pool, user_id).await?;
    Ok(Json(purchases))
}

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/current-user", get(api_current_user))
        .route("/purchases", post(api_create_purchase))
        .route("/payments", post(api_process_payment))
        .route("/users/{id}/purchases", get(api_list_user_purchases));

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{Datelike, Days, Local, Weekday};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;
    use tracing_subscriber::Layer;
    use tracing_subscriber::layer::{Context, SubscriberExt};

    /// Counts confirmation events emitted by `LogNotifier`.
    struct ConfirmationCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for ConfirmationCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if event.metadata().target() == "ecopark::notify" {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    async fn test_state() -> AppState {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        ecopark_db::migrate(&pool).await.unwrap();
        AppState {
            pool,
            payments: Arc::new(Mutex::new(PaymentSimulator::new())),
            customer_email: "visitante@test.com".to_string(),
            customer_name: "Visitante".to_string(),
            payment_delay: Duration::ZERO,
        }
    }

    /// First open day at least a week from now.
    fn open_day() -> NaiveDate {
        let mut day = Local::now().date_naive() + Days::new(7);
        while !ecopark_models::is_open(day) {
            day = day + Days::new(1);
        }
        day
    }

    fn purchase_body(fecha: NaiveDate, tickets: &[(u32, &str)], medio_pago: &str) -> serde_json::Value {
        let entradas: Vec<_> = tickets
            .iter()
            .map(|(edad, tipo)| json!({ "edad": edad, "tipoEntrada": tipo }))
            .collect();
        json!({
            "fecha": fecha.format("%Y-%m-%d").to_string(),
            "entradas": entradas,
            "medioPago": medio_pago,
        })
    }

    async fn send(state: &AppState, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let state = test_state().await;
        let (status, body) = send(&state, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn cash_purchase_is_stored_and_confirmed() {
        let state = test_state().await;
        let body = purchase_body(open_day(), &[(30, "REGULAR"), (8, "REGULAR")], "EFECTIVO");

        let (status, json) = send(&state, "POST", "/api/purchases", Some(body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "exito");
        assert_eq!(json["total"], 10000);
        let id = json["id_compra"].as_i64().unwrap();
        let stored = ecopark_db::get_purchase(&state.pool, id).await.unwrap().unwrap();
        assert_eq!(stored.tickets.len(), 2);
        assert_eq!(stored.user.email, "visitante@test.com");
        assert_eq!(stored.purchase.medio_pago, "EFECTIVO");
    }

    #[tokio::test]
    async fn card_purchase_redirects_to_checkout() {
        let state = test_state().await;
        let body = purchase_body(open_day(), &[(40, "VIP")], "TARJETA");

        let (status, json) = send(&state, "POST", "/api/purchases", Some(body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "redireccion");
        assert_eq!(json["total"], 10000);
        assert_eq!(json["cantidad"], 1);
        let id = json["id_compra"].as_i64().unwrap();
        let url = json["checkout_url"].as_str().unwrap();
        assert!(url.starts_with("/pago-mercadopago?preference_id=PREF-"));
        assert!(url.ends_with(&format!("&compra_id={id}")));
    }

    #[tokio::test]
    async fn domain_errors_are_bad_requests() {
        let state = test_state().await;
        let past = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let eleven = vec![(20, "REGULAR"); 11];

        let cases = [
            (purchase_body(past, &[(30, "REGULAR")], "EFECTIVO"), PurchaseError::PastDate),
            (purchase_body(open_day(), &eleven, "EFECTIVO"), PurchaseError::TooManyTickets),
            (purchase_body(open_day(), &[], "EFECTIVO"), PurchaseError::NoTickets),
            (purchase_body(open_day(), &[(30, "REGULAR")], "CHEQUE"), PurchaseError::InvalidPaymentMethod),
        ];
        for (body, expected) in cases {
            let (status, json) = send(&state, "POST", "/api/purchases", Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(json["status"], "error");
            assert_eq!(json["mensaje"], expected.to_string());
        }
        assert!(ecopark_db::list_purchases(&state.pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_day_is_rejected() {
        let state = test_state().await;
        let mut monday = open_day();
        while monday.weekday() != Weekday::Mon {
            monday = monday + Days::new(1);
        }
        let body = purchase_body(monday, &[(30, "REGULAR")], "EFECTIVO");
        let (status, json) = send(&state, "POST", "/api/purchases", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["mensaje"], PurchaseError::ParkClosed.to_string());
    }

    #[tokio::test]
    async fn malformed_requests_are_bad_requests() {
        let state = test_state().await;

        let unknown_tier = purchase_body(open_day(), &[(30, "GOLD")], "EFECTIVO");
        let (status, _) = send(&state, "POST", "/api/purchases", Some(unknown_tier)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let bad_date = json!({ "fecha": "22/10/2026", "entradas": [], "medioPago": "EFECTIVO" });
        let (status, _) = send(&state, "POST", "/api/purchases", Some(bad_date)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let missing_field = json!({ "entradas": [] });
        let (status, json) = send(&state, "POST", "/api/purchases", Some(missing_field)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "error");
    }

    fn card_body(number: &str, compra_id: serde_json::Value) -> serde_json::Value {
        json!({
            "numero_tarjeta": number,
            "cvv": "123",
            "vencimiento_mes": "12",
            "vencimiento_anio": "99",
            "titular": "APRO",
            "monto": 10000,
            "compra_id": compra_id,
        })
    }

    #[tokio::test]
    async fn rejected_card_reports_reason() {
        let state = test_state().await;
        let (status, json) = send(&state, "POST", "/api/payments", Some(card_body("4111111111111111", json!(null)))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["status_detail"], "fondos_insuficientes");
        assert!(json.get("email_enviado").is_none());
    }

    #[tokio::test]
    async fn approved_card_confirms_the_stored_purchase() {
        let state = test_state().await;
        let body = purchase_body(open_day(), &[(40, "VIP")], "TARJETA");
        let (_, json) = send(&state, "POST", "/api/purchases", Some(body)).await;
        let id = json["id_compra"].as_i64().unwrap();

        let (status, json) = send(&state, "POST", "/api/payments", Some(card_body("4509953566233704", json!(id)))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "approved");
        assert_eq!(json["email_enviado"], true);
        assert!(json["transaction_id"].as_str().unwrap().starts_with("TXN-"));

        let (_, json) = send(&state, "POST", "/api/payments", Some(card_body("4242424242424242", json!(999)))).await;
        assert_eq!(json["email_enviado"], false);
    }

    #[tokio::test]
    async fn payment_with_missing_fields_is_rejected() {
        let state = test_state().await;
        let (status, json) = send(&state, "POST", "/api/payments", Some(json!({ "numero_tarjeta": "4242424242424242" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["message"], "Falta el campo: cvv");

        let mut body = card_body("4242424242424242", json!(null));
        body.as_object_mut().unwrap().remove("monto");
        let (status, json) = send(&state, "POST", "/api/payments", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "Falta el campo: monto");
    }

    #[tokio::test]
    async fn user_purchases_are_listed() {
        let state = test_state().await;
        let (_, user) = send(&state, "GET", "/api/current-user", None).await;
        let user_id = user["id"].as_i64().unwrap();
        assert_eq!(user["email"], "visitante@test.com");

        let body = purchase_body(open_day(), &[(30, "REGULAR")], "EFECTIVO");
        send(&state, "POST", "/api/purchases", Some(body)).await;

        let (status, json) = send(&state, "GET", &format!("/api/users/{user_id}/purchases"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 1);

        let (status, _) = send(&state, "GET", "/api/users/999/purchases", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn purchase_id_from_the_checkout_url_may_be_text() {
        let state = test_state().await;
        let body = purchase_body(open_day(), &[(40, "VIP")], "TARJETA");
        let (_, json) = send(&state, "POST", "/api/purchases", Some(body)).await;
        let id = json["id_compra"].as_i64().unwrap();

        let (status, json) =
            send(&state, "POST", "/api/payments", Some(card_body("4509953566233704", json!(id.to_string())))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "approved");
        assert_eq!(json["email_enviado"], true);

        let (status, json) =
            send(&state, "POST", "/api/payments", Some(card_body("4509953566233704", json!("unknown")))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "approved");
        assert!(json.get("email_enviado").is_none());
    }

    #[tokio::test]
    async fn card_purchase_is_confirmed_only_after_approval() {
        let sent = Arc::new(AtomicUsize::new(0));
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::registry().with(ConfirmationCounter(sent.clone())),
        );
        let state = test_state().await;

        let body = purchase_body(open_day(), &[(40, "VIP"), (12, "REGULAR")], "TARJETA");
        let (_, json) = send(&state, "POST", "/api/purchases", Some(body)).await;
        assert_eq!(json["status"], "redireccion");
        let id = json["id_compra"].as_i64().unwrap();
        assert_eq!(sent.load(Ordering::SeqCst), 0);

        let (_, json) = send(&state, "POST", "/api/payments", Some(card_body("4111111111111111", json!(id)))).await;
        assert_eq!(json["status"], "rejected");
        assert_eq!(sent.load(Ordering::SeqCst), 0);

        let (_, json) = send(&state, "POST", "/api/payments", Some(card_body("4000000000000002", json!(id)))).await;
        assert_eq!(json["status"], "pending");
        assert_eq!(sent.load(Ordering::SeqCst), 0);

        let (_, json) = send(&state, "POST", "/api/payments", Some(card_body("4509953566233704", json!(id)))).await;
        assert_eq!(json["status"], "approved");
        assert_eq!(sent.load(Ordering::SeqCst), 1);

        let body = purchase_body(open_day(), &[(30, "REGULAR")], "EFECTIVO");
        let (_, json) = send(&state, "POST", "/api/purchases", Some(body)).await;
        assert_eq!(json["status"], "exito");
        assert_eq!(sent.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_payment_method_is_reported() {
        let state = test_state().await;
        let body = json!({
            "fecha": open_day().format("%Y-%m-%d").to_string(),
            "entradas": [{ "edad": 30, "tipoEntrada": "REGULAR" }],
        });
        let (status, json) = send(&state, "POST", "/api/purchases", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "error");
        assert_eq!(json["mensaje"], "El medio de pago especificado no es válido o falta.");
    }
}
