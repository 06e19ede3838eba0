use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, Method},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use voucher_shared::constants::API_V1_PREFIX;
use voucher_shared::types::{LedgerEntryType, Role};
use voucher_store::{
    BalanceView, CouponType, Database, DateRange, DepartmentStanding, GlobalLedgerEntry,
    LeaderboardRow, LedgerEntry, Page, Redemption, SellerFeedItem, StoreOptions,
    TransferHistoryItem, WallTransfer,
};

use crate::engine::Engine;
use crate::error::ServerError;
use crate::gamification::{CarbonLedgerEntry, EcoPointsAward, GamificationStats, StreakStatus};
use crate::nonce_authority::{NoncePayload, SellerInfo};
use crate::paging::PageQuery;
use crate::redemption::{RedeemRequest, RedemptionOutcome};
use crate::transfer::{TransferOutcome, TransferRequest};
use crate::wallet::{BulkIssueSummary, CreateCouponTypeRequest, IssueOutcome, IssueRequest};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub db_path: Arc<PathBuf>,
    pub store_options: StoreOptions,
}

impl AppState {
    pub fn new(engine: Engine, db_path: PathBuf, store_options: StoreOptions) -> Self {
        Self {
            engine: Arc::new(engine),
            db_path: Arc::new(db_path),
            store_options,
        }
    }

    /// Run `f` against a fresh connection on the blocking pool.
    async fn with_db<T, F>(&self, f: F) -> Result<T, ServerError>
    where
        T: Send + 'static,
        F: FnOnce(&Engine, &mut Database) -> Result<T, ServerError> + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        let path = Arc::clone(&self.db_path);
        let options = self.store_options;
        tokio::task::spawn_blocking(move || {
            let mut db = Database::connect(&path, &options)?;
            f(&engine, &mut db)
        })
        .await
        .map_err(|e| ServerError::Internal(format!("Blocking task failed: {e}")))?
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let api = Router::new()
        .route("/health", get(health_check))
        .route("/seller/qr", post(seller_qr))
        .route("/seller/qr/refresh", post(seller_qr_refresh))
        .route("/seller/feed", get(seller_feed))
        .route("/seller/info", get(seller_info))
        .route("/redemptions", post(redeem))
        .route("/redemptions/history", get(redemption_history))
        .route("/transfers", post(transfer))
        .route("/transfers/history", get(transfer_history))
        .route("/transfers/wall", get(appreciation_wall))
        .route("/wallet/balance", get(wallet_balance))
        .route("/wallet/ledger", get(wallet_ledger))
        .route("/coupon-types", get(coupon_types))
        .route("/admin/coupon-types", post(admin_create_coupon_type))
        .route("/admin/ledger", get(admin_ledger))
        .route("/admin/issue", post(admin_issue))
        .route("/admin/issue/bulk", post(admin_bulk_issue))
        .route("/gamification/eco-points", post(award_eco_points))
        .route("/gamification/stats", get(gamification_stats))
        .route("/gamification/streak", get(streak_status))
        .route("/gamification/leaderboard", get(leaderboard))
        .route("/gamification/leaderboard/department", get(department_leaderboard))
        .route("/gamification/carbon-ledger", get(carbon_ledger));

    Router::new()
        .nest(API_V1_PREFIX, api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─── Identity ───

/// Caller identity as asserted by the upstream gateway.
#[derive(Debug, Clone, Copy)]
struct Caller {
    id: Uuid,
    role: Role,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn caller(headers: &HeaderMap) -> Result<Caller, ServerError> {
    let id = header_str(headers, "x-user-id")
        .and_then(|v| v.parse::<Uuid>().ok())
        .ok_or(ServerError::Unauthenticated)?;
    let role = header_str(headers, "x-user-role")
        .and_then(|v| v.to_ascii_uppercase().parse::<Role>().ok())
        .ok_or(ServerError::Unauthenticated)?;
    Ok(Caller { id, role })
}

fn require_role(headers: &HeaderMap, role: Role) -> Result<Caller, ServerError> {
    let caller = caller(headers)?;
    if caller.role != role {
        return Err(ServerError::Forbidden(format!("{role} role required")));
    }
    Ok(caller)
}

fn require_back_office(headers: &HeaderMap) -> Result<Caller, ServerError> {
    let caller = caller(headers)?;
    if !caller.role.is_back_office() {
        return Err(ServerError::Forbidden("ADMIN or FINANCE role required".into()));
    }
    Ok(caller)
}

/// Employees read their own wallet; back-office roles may read anyone's.
fn wallet_subject(caller: Caller, requested: Option<Uuid>) -> Result<Uuid, ServerError> {
    match requested {
        Some(id) if id == caller.id || caller.role.is_back_office() => Ok(id),
        Some(_) => Err(ServerError::Forbidden(
            "cannot read another employee's wallet".into(),
        )),
        None if caller.role == Role::Employee => Ok(caller.id),
        None if caller.role.is_back_office() => {
            Err(ServerError::Validation("employeeId is required".into()))
        }
        None => Err(ServerError::Forbidden("EMPLOYEE role required".into())),
    }
}

// ─── Request / response types ───

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct LimitQuery {
    limit: Option<u32>,
}

impl LimitQuery {
    fn resolve(&self) -> Result<u32, ServerError> {
        let (_, limit) = PageQuery {
            page: None,
            limit: self.limit,
        }
        .resolve()?;
        Ok(limit)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletQuery {
    employee_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerQuery {
    employee_id: Option<Uuid>,
    page: Option<u32>,
    limit: Option<u32>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
}

impl LedgerQuery {
    fn range(&self) -> Result<Option<DateRange>, ServerError> {
        date_range(self.start_date, self.end_date)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GlobalLedgerQuery {
    page: Option<u32>,
    limit: Option<u32>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    entry_type: Option<LedgerEntryType>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CarbonLedgerQuery {
    employee_id: Option<Uuid>,
    page: Option<u32>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SellerInfoQuery {
    seller_id: Uuid,
}

fn date_range(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<Option<DateRange>, ServerError> {
    match (start, end) {
        (Some(start), Some(end)) => Ok(Some(DateRange { start, end })),
        (None, None) => Ok(None),
        _ => Err(ServerError::Validation(
            "startDate and endDate must be given together".into(),
        )),
    }
}

#[derive(Debug, Deserialize)]
struct BulkIssueRequest {
    items: Vec<IssueRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EcoPointsRequest {
    beverage_type: String,
    #[serde(default)]
    reusable_cup: bool,
}

// ─── Handlers ───

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn seller_qr(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<NoncePayload>, ServerError> {
    let seller = require_role(&headers, Role::Seller)?;
    let payload = state
        .with_db(move |engine, db| engine.nonces.issue(db, seller.id))
        .await?;
    Ok(Json(payload))
}

async fn seller_qr_refresh(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<NoncePayload>, ServerError> {
    let seller = require_role(&headers, Role::Seller)?;
    let payload = state
        .with_db(move |engine, db| engine.nonces.force_refresh(db, seller.id))
        .await?;
    Ok(Json(payload))
}

async fn seller_feed(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<SellerFeedItem>>, ServerError> {
    let seller = require_role(&headers, Role::Seller)?;
    let limit = query.resolve()?;
    let feed = state
        .with_db(move |engine, db| engine.redemptions.seller_feed(db, seller.id, limit))
        .await?;
    Ok(Json(feed))
}

async fn seller_info(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<SellerInfoQuery>,
) -> Result<Json<SellerInfo>, ServerError> {
    let viewer = caller(&headers)?;
    if !matches!(viewer.role, Role::Employee | Role::Admin) {
        return Err(ServerError::Forbidden("EMPLOYEE or ADMIN role required".into()));
    }
    let info = state
        .with_db(move |engine, db| engine.nonces.seller_info(db, query.seller_id))
        .await?;
    Ok(Json(info))
}

async fn redeem(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<RedeemRequest>,
) -> Result<Json<RedemptionOutcome>, ServerError> {
    let employee = require_role(&headers, Role::Employee)?;
    let outcome = state
        .with_db(move |engine, db| engine.redemptions.redeem(db, employee.id, &req))
        .await?;
    Ok(Json(outcome))
}

async fn redemption_history(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Redemption>>, ServerError> {
    let employee = require_role(&headers, Role::Employee)?;
    let (page, limit) = query.resolve()?;
    let history = state
        .with_db(move |engine, db| engine.redemptions.history(db, employee.id, page, limit))
        .await?;
    Ok(Json(history))
}

async fn transfer(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<TransferOutcome>, ServerError> {
    let sender = require_role(&headers, Role::Employee)?;
    let outcome = state
        .with_db(move |engine, db| engine.transfers.transfer(db, sender.id, &req))
        .await?;
    Ok(Json(outcome))
}

async fn transfer_history(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<TransferHistoryItem>>, ServerError> {
    let user = caller(&headers)?;
    let (page, limit) = query.resolve()?;
    let history = state
        .with_db(move |engine, db| engine.transfers.history(db, user.id, page, limit))
        .await?;
    Ok(Json(history))
}

async fn appreciation_wall(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<WallTransfer>>, ServerError> {
    caller(&headers)?;
    let (page, limit) = query.resolve()?;
    let wall = state
        .with_db(move |engine, db| engine.transfers.appreciation_wall(db, page, limit))
        .await?;
    Ok(Json(wall))
}

async fn wallet_balance(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<WalletQuery>,
) -> Result<Json<Vec<BalanceView>>, ServerError> {
    let employee_id = wallet_subject(caller(&headers)?, query.employee_id)?;
    let balances = state
        .with_db(move |engine, db| engine.wallet.balances(db, employee_id))
        .await?;
    Ok(Json(balances))
}

async fn wallet_ledger(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<Page<LedgerEntry>>, ServerError> {
    let employee_id = wallet_subject(caller(&headers)?, query.employee_id)?;
    let range = query.range()?;
    let paging = PageQuery {
        page: query.page,
        limit: query.limit,
    };
    let ledger = state
        .with_db(move |engine, db| engine.wallet.ledger(db, employee_id, paging, range))
        .await?;
    Ok(Json(ledger))
}

async fn coupon_types(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<CouponType>>, ServerError> {
    caller(&headers)?;
    let types = state
        .with_db(|engine, db| engine.wallet.coupon_types(db))
        .await?;
    Ok(Json(types))
}

async fn admin_create_coupon_type(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<CreateCouponTypeRequest>,
) -> Result<Json<CouponType>, ServerError> {
    let actor = require_back_office(&headers)?;
    let coupon_type = state
        .with_db(move |engine, db| engine.wallet.create_coupon_type(db, actor.id, &req))
        .await?;
    Ok(Json(coupon_type))
}

async fn admin_ledger(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<GlobalLedgerQuery>,
) -> Result<Json<Page<GlobalLedgerEntry>>, ServerError> {
    require_back_office(&headers)?;
    let range = date_range(query.start_date, query.end_date)?;
    let paging = PageQuery {
        page: query.page,
        limit: query.limit,
    };
    let entry_type = query.entry_type;
    let ledger = state
        .with_db(move |engine, db| engine.wallet.global_ledger(db, paging, range, entry_type))
        .await?;
    Ok(Json(ledger))
}

async fn admin_issue(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<IssueRequest>,
) -> Result<Json<IssueOutcome>, ServerError> {
    let actor = require_back_office(&headers)?;
    let outcome = state
        .with_db(move |engine, db| engine.wallet.issue(db, actor.id, &req))
        .await?;
    Ok(Json(outcome))
}

async fn admin_bulk_issue(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<BulkIssueRequest>,
) -> Result<Json<BulkIssueSummary>, ServerError> {
    let actor = require_back_office(&headers)?;
    if req.items.is_empty() {
        return Err(ServerError::Validation("items must not be empty".into()));
    }
    let summary = state
        .with_db(move |engine, db| Ok(engine.wallet.bulk_issue(db, actor.id, &req.items)))
        .await?;
    info!(
        actor = %actor.id,
        successful = summary.successful,
        failed = summary.failed,
        "Bulk issuance finished"
    );
    Ok(Json(summary))
}

async fn award_eco_points(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<EcoPointsRequest>,
) -> Result<Json<EcoPointsAward>, ServerError> {
    let employee = require_role(&headers, Role::Employee)?;
    let award = state
        .with_db(move |engine, db| {
            engine
                .gamification
                .award_eco_points(db, employee.id, &req.beverage_type, req.reusable_cup)
        })
        .await?;
    Ok(Json(award))
}

async fn gamification_stats(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<GamificationStats>, ServerError> {
    let employee = require_role(&headers, Role::Employee)?;
    let stats = state
        .with_db(move |engine, db| engine.gamification.stats(db, employee.id))
        .await?;
    Ok(Json(stats))
}

async fn streak_status(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<StreakStatus>, ServerError> {
    let employee = require_role(&headers, Role::Employee)?;
    let status = state
        .with_db(move |engine, db| engine.gamification.streak_status(db, employee.id))
        .await?;
    Ok(Json(status))
}

async fn leaderboard(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<LeaderboardRow>>, ServerError> {
    caller(&headers)?;
    let limit = query.resolve()?;
    let rows = state
        .with_db(move |engine, db| engine.gamification.leaderboard(db, limit))
        .await?;
    Ok(Json(rows))
}

async fn department_leaderboard(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<DepartmentStanding>>, ServerError> {
    caller(&headers)?;
    let rows = state
        .with_db(|engine, db| engine.gamification.department_leaderboard(db))
        .await?;
    Ok(Json(rows))
}

async fn carbon_ledger(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<CarbonLedgerQuery>,
) -> Result<Json<Page<CarbonLedgerEntry>>, ServerError> {
    let employee_id = wallet_subject(caller(&headers)?, query.employee_id)?;
    let paging = PageQuery {
        page: query.page,
        limit: query.limit,
    };
    let ledger = state
        .with_db(move |engine, db| engine.gamification.carbon_ledger(db, employee_id, paging))
        .await?;
    Ok(Json(ledger))
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
