//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, patch, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::{AuditLogEntry, AuditLogService};
use crate::budgets::{BudgetPatch, BudgetRecord, BudgetService};
use crate::domain::{Delta, Identity, OperationContext};
use crate::error::AppError;
use crate::fund_pool::{FundPoolBalance, FundPoolService};
use crate::notifications::{NotificationRecord, NotificationService};
use crate::remittances::{RemittanceRecord, RemittanceService};
use crate::transactions::{TransactionDetail, TransactionService, TransactionSummary};

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct ApplyDeltaRequest {
    /// Accepted as a raw JSON value and validated into a `Delta` by the
    /// handler, so non-numeric or fractional deltas surface as a 400.
    pub delta: serde_json::Value,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApplyDeltaResponse {
    pub success: bool,
    pub balance: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub message: String,
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct NotificationsListResponse {
    pub notifications: Vec<NotificationRecord>,
}

#[derive(Debug, Serialize)]
pub struct TransactionEnvelope {
    pub success: bool,
    pub data: TransactionDetail,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct TransactionsListResponse {
    pub transactions: Vec<TransactionSummary>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBudgetRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Amount as string for precise decimal
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBudgetRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BudgetDecisionRequest {
    pub approve: bool,
    #[serde(default)]
    pub allocated_amount: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BudgetsListResponse {
    pub budgets: Vec<BudgetRecord>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRemittanceRequest {
    /// Amount as string for precise decimal
    pub amount: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RemittanceDecisionRequest {
    pub approve: bool,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RemittancesListResponse {
    pub remittances: Vec<RemittanceRecord>,
}

#[derive(Debug, Deserialize)]
pub struct AuditLogsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct AuditLogsResponse {
    pub entries: Vec<AuditLogEntry>,
}

fn default_limit() -> i64 {
    50
}

fn parse_amount(raw: &str) -> Result<Decimal, AppError> {
    raw.parse()
        .map_err(|_| AppError::InvalidRequest(format!("Invalid amount: {}", raw)))
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router.
///
/// The fund pool read requires no authorization; everything else sits behind
/// the session gate.
pub fn create_router(pool: PgPool) -> Router<PgPool> {
    let public = Router::new().route("/fund-pool", get(get_fund_pool));

    let protected = Router::new()
        // Fund pool (admin-only mutation)
        .route("/fund-pool", post(apply_fund_pool_delta))
        // Notifications
        .route("/notifications", get(list_notifications))
        .route("/notifications/mark-all-read", patch(mark_all_notifications_read))
        // Transactions (read-only)
        .route("/transactions", get(list_transactions))
        .route("/transactions/:transaction_id", get(get_transaction))
        // Budgets
        .route("/budgets", post(create_budget).get(list_budgets))
        .route("/budgets/:budget_id", get(get_budget).patch(update_budget))
        .route("/budgets/:budget_id/submit", post(submit_budget))
        .route("/budgets/:budget_id/decision", post(decide_budget))
        // Remittances
        .route("/remittances", post(create_remittance).get(list_remittances))
        .route("/remittances/:remittance_id", get(get_remittance))
        .route("/remittances/:remittance_id/decision", post(decide_remittance))
        // Audit trail (admin only)
        .route("/audit-logs", get(list_audit_logs))
        .route_layer(middleware::from_fn_with_state(
            pool,
            super::middleware::session_auth_middleware,
        ));

    public.merge(protected)
}

// =========================================================================
// GET /fund-pool
// =========================================================================

/// Current fund pool balance (no authorization required)
async fn get_fund_pool(
    State(pool): State<PgPool>,
) -> Result<Json<FundPoolBalance>, AppError> {
    let service = FundPoolService::new(pool);
    let balance = service.get_balance().await?;

    Ok(Json(balance))
}

// =========================================================================
// POST /fund-pool
// =========================================================================

/// Apply a signed delta to the fund pool (admin only)
async fn apply_fund_pool_delta(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<ApplyDeltaRequest>,
) -> Result<Json<ApplyDeltaResponse>, AppError> {
    let delta = match request.delta {
        serde_json::Value::Number(number) => {
            Delta::try_from(number).map_err(|e| AppError::InvalidRequest(e.to_string()))?
        }
        other => {
            return Err(AppError::InvalidRequest(format!(
                "Delta must be a number, got {}",
                other
            )));
        }
    };

    let service = FundPoolService::new(pool);
    let balance = service
        .apply_delta(&identity, delta, request.note, &context)
        .await?;

    Ok(Json(ApplyDeltaResponse {
        success: true,
        balance,
    }))
}

// =========================================================================
// GET /notifications
// =========================================================================

/// List the caller's notifications, newest first
async fn list_notifications(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<NotificationsListResponse>, AppError> {
    let service = NotificationService::new(pool);
    let notifications = service.list(identity.user_id).await?;

    Ok(Json(NotificationsListResponse { notifications }))
}

// =========================================================================
// PATCH /notifications/mark-all-read
// =========================================================================

/// Mark every unread notification of the caller as read
async fn mark_all_notifications_read(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<MarkAllReadResponse>, AppError> {
    let service = NotificationService::new(pool);
    let updated = service.mark_all_read(identity.user_id).await?;

    Ok(Json(MarkAllReadResponse {
        message: "All notifications marked as read".to_string(),
        updated,
    }))
}

// =========================================================================
// GET /transactions/:transaction_id
// =========================================================================

/// Get one transaction with user and budget projections (owner or admin)
async fn get_transaction(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<TransactionEnvelope>, AppError> {
    let service = TransactionService::new(pool);
    let data = service.get_by_id(transaction_id, &identity).await?;

    Ok(Json(TransactionEnvelope {
        success: true,
        data,
    }))
}

// =========================================================================
// GET /transactions
// =========================================================================

/// List transactions visible to the caller
async fn list_transactions(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<TransactionsListResponse>, AppError> {
    let service = TransactionService::new(pool);
    let transactions = service.list(&identity, query.limit).await?;

    Ok(Json(TransactionsListResponse { transactions }))
}

// =========================================================================
// POST /budgets
// =========================================================================

/// Create a budget in DRAFT status
async fn create_budget(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<CreateBudgetRequest>,
) -> Result<(StatusCode, Json<BudgetRecord>), AppError> {
    let amount = parse_amount(&request.amount)?;

    let service = BudgetService::new(pool);
    let budget = service
        .create(&identity, request.title, request.description, amount, &context)
        .await?;

    Ok((StatusCode::CREATED, Json(budget)))
}

// =========================================================================
// GET /budgets
// =========================================================================

/// List budgets visible to the caller
async fn list_budgets(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<BudgetsListResponse>, AppError> {
    let service = BudgetService::new(pool);
    let budgets = service.list(&identity).await?;

    Ok(Json(BudgetsListResponse { budgets }))
}

// =========================================================================
// GET /budgets/:budget_id
// =========================================================================

/// Get one budget (creator or admin)
async fn get_budget(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    Path(budget_id): Path<Uuid>,
) -> Result<Json<BudgetRecord>, AppError> {
    let service = BudgetService::new(pool);
    let budget = service.get(budget_id, &identity).await?;

    Ok(Json(budget))
}

// =========================================================================
// PATCH /budgets/:budget_id
// =========================================================================

/// Edit a budget through the edit gate (creator, DRAFT or PENDING)
async fn update_budget(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    Extension(context): Extension<OperationContext>,
    Path(budget_id): Path<Uuid>,
    Json(request): Json<UpdateBudgetRequest>,
) -> Result<Json<BudgetRecord>, AppError> {
    let amount = match request.amount {
        Some(raw) => Some(parse_amount(&raw)?),
        None => None,
    };

    let patch = BudgetPatch {
        title: request.title,
        description: request.description,
        amount,
    };

    let service = BudgetService::new(pool);
    let budget = service.update(budget_id, &identity, patch, &context).await?;

    Ok(Json(budget))
}

// =========================================================================
// POST /budgets/:budget_id/submit
// =========================================================================

/// Submit a DRAFT budget for review (creator only)
async fn submit_budget(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    Extension(context): Extension<OperationContext>,
    Path(budget_id): Path<Uuid>,
) -> Result<Json<BudgetRecord>, AppError> {
    let service = BudgetService::new(pool);
    let budget = service.submit(budget_id, &identity, &context).await?;

    Ok(Json(budget))
}

// =========================================================================
// POST /budgets/:budget_id/decision
// =========================================================================

/// Approve or reject a PENDING budget (admin only)
async fn decide_budget(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    Extension(context): Extension<OperationContext>,
    Path(budget_id): Path<Uuid>,
    Json(request): Json<BudgetDecisionRequest>,
) -> Result<Json<BudgetRecord>, AppError> {
    let allocated_amount = match request.allocated_amount {
        Some(raw) => Some(parse_amount(&raw)?),
        None => None,
    };

    let service = BudgetService::new(pool);
    let budget = service
        .decide(
            budget_id,
            &identity,
            request.approve,
            allocated_amount,
            request.note,
            &context,
        )
        .await?;

    Ok(Json(budget))
}

// =========================================================================
// POST /remittances
// =========================================================================

/// Submit a remittance request
async fn create_remittance(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<CreateRemittanceRequest>,
) -> Result<(StatusCode, Json<RemittanceRecord>), AppError> {
    let amount = parse_amount(&request.amount)?;

    let service = RemittanceService::new(pool);
    let remittance = service
        .create(&identity, amount, request.note, &context)
        .await?;

    Ok((StatusCode::CREATED, Json(remittance)))
}

// =========================================================================
// GET /remittances
// =========================================================================

/// List remittances visible to the caller
async fn list_remittances(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<RemittancesListResponse>, AppError> {
    let service = RemittanceService::new(pool);
    let remittances = service.list(&identity).await?;

    Ok(Json(RemittancesListResponse { remittances }))
}

// =========================================================================
// GET /remittances/:remittance_id
// =========================================================================

/// Get one remittance (owner or admin)
async fn get_remittance(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    Path(remittance_id): Path<Uuid>,
) -> Result<Json<RemittanceRecord>, AppError> {
    let service = RemittanceService::new(pool);
    let remittance = service.get(remittance_id, &identity).await?;

    Ok(Json(remittance))
}

// =========================================================================
// POST /remittances/:remittance_id/decision
// =========================================================================

/// Approve or reject a PENDING remittance (admin only)
async fn decide_remittance(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    Extension(context): Extension<OperationContext>,
    Path(remittance_id): Path<Uuid>,
    Json(request): Json<RemittanceDecisionRequest>,
) -> Result<Json<RemittanceRecord>, AppError> {
    let service = RemittanceService::new(pool);
    let remittance = service
        .decide(remittance_id, &identity, request.approve, request.note, &context)
        .await?;

    Ok(Json(remittance))
}

// =========================================================================
// GET /audit-logs
// =========================================================================

/// List audit log entries (admin only)
async fn list_audit_logs(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<AuditLogsQuery>,
) -> Result<Json<AuditLogsResponse>, AppError> {
    if !identity.is_admin() {
        return Err(AppError::PermissionDenied);
    }

    let limit = query.limit.min(1000);
    let service = AuditLogService::new(pool);

    let entries = match query.user_id {
        Some(user_id) => service.get_by_user(user_id, limit).await,
        None => service.get_recent(limit).await,
    }
    .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(AuditLogsResponse { entries }))
}
