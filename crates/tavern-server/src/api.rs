use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use tavern_bots::{BotRegistry, BotScheduler, NewBot, TickReport};
use tavern_economy::{
    ExecuteOutcome, Funding, LedgerEngine, Operation, RankAccumulator, TransactionRequest,
    XpResult,
};
use tavern_shared::metadata::Metadata;
use tavern_shared::{triggers, BotActionKind, Coins, ContentKind, TrustLevel, WalletOwner, Xp};
use tavern_store::{
    Bot, BotAction, ContentItem, Database, LedgerTransaction, RankTier, StoreError, Treasury,
    Wallet,
};

use crate::audit;
use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub engine: LedgerEngine,
    pub ranks: RankAccumulator,
    pub registry: BotRegistry,
    pub scheduler: BotScheduler,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/economy/execute", post(economy_execute))
        .route("/economy/wallet/:user_id", get(wallet_balance))
        .route("/economy/wallet/:user_id/history", get(wallet_history))
        .route("/economy/xp", post(award_xp))
        .route("/economy/ranks", get(rank_ladder))
        .route("/admin/tick", post(admin_tick))
        .route("/admin/treasury", get(admin_treasury))
        .route("/admin/treasury/refill", post(admin_refill))
        .route("/admin/treasury/limits", post(admin_treasury_limits))
        .route("/admin/wallets/:user_id/drain", post(admin_drain))
        .route("/admin/bots", get(admin_list_bots).post(admin_create_bot))
        .route("/admin/bots/:bot_id", post(admin_update_bot))
        .route("/admin/bots/:bot_id/toggle", post(admin_toggle_bot))
        .route("/admin/bots/:bot_id/actions", get(admin_bot_actions))
        .route("/admin/content", post(admin_sync_content))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    bot_ticks_enabled: bool,
    tick_interval_secs: u64,
}

/// Operations the public economy endpoint accepts. Admin-only shapes
/// (refill, drain) have their own authenticated routes.
#[derive(Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum EconomyOp {
    Award {
        to: Uuid,
        amount: Coins,
        /// Promotional credits consume the treasury's daily bot budget.
        #[serde(default)]
        promotional: bool,
    },
    Spend {
        from: Uuid,
        amount: Coins,
        #[serde(default)]
        allow_overdraft: bool,
    },
    Transfer {
        from: Uuid,
        to: Uuid,
        amount: Coins,
    },
}

#[derive(Deserialize)]
struct ExecuteRequestBody {
    #[serde(flatten)]
    op: EconomyOp,
    trigger: String,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    idempotency_key: Option<String>,
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
}

#[derive(Deserialize)]
struct XpRequestBody {
    user_id: Uuid,
    activity: String,
    amount: Xp,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Deserialize)]
struct RefillRequest {
    amount: Coins,
    admin_id: String,
}

#[derive(Deserialize)]
struct DrainRequest {
    percent: u8,
    admin_id: String,
}

#[derive(Deserialize)]
struct ToggleRequest {
    active: bool,
    admin_id: String,
}

#[derive(Deserialize)]
struct BotUpdateRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    trust: Option<u8>,
    #[serde(default)]
    activity_caps: Option<BTreeMap<BotActionKind, u32>>,
    admin_id: String,
}

#[derive(Deserialize)]
struct TreasuryLimitsRequest {
    #[serde(default)]
    daily_spend_limit: Option<Coins>,
    #[serde(default)]
    wallet_cap_amount: Option<Coins>,
    admin_id: String,
}

#[derive(Deserialize)]
struct ContentSyncRequest {
    id: Uuid,
    author_id: Uuid,
    kind: ContentKind,
    #[serde(default)]
    price: Option<Coins>,
}

// ---------------------------------------------------------------------------
// Public endpoints
// ---------------------------------------------------------------------------

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        bot_ticks_enabled: state.config.bot_ticks_enabled,
        tick_interval_secs: state.config.tick_interval_secs,
    })
}

async fn economy_execute(
    State(state): State<AppState>,
    Json(body): Json<ExecuteRequestBody>,
) -> Result<Json<ExecuteOutcome>, ServerError> {
    if body.trigger.trim().is_empty() {
        return Err(ServerError::BadRequest("trigger must not be empty".into()));
    }

    let operation = match body.op {
        EconomyOp::Award {
            to,
            amount,
            promotional,
        } => {
            require_positive(amount)?;
            Operation::Award {
                to,
                amount,
                funding: if promotional {
                    Funding::Promotional
                } else {
                    Funding::Organic
                },
            }
        }
        EconomyOp::Spend {
            from,
            amount,
            allow_overdraft,
        } => {
            require_positive(amount)?;
            Operation::Spend {
                from,
                amount,
                allow_overdraft,
            }
        }
        EconomyOp::Transfer { from, to, amount } => {
            require_positive(amount)?;
            Operation::Transfer { from, to, amount }
        }
    };

    let outcome = state
        .engine
        .execute(TransactionRequest {
            operation,
            trigger: body.trigger,
            channel: triggers::channel::WEB.to_string(),
            metadata: body.metadata,
            idempotency_key: body.idempotency_key,
        })
        .await?;

    Ok(Json(outcome))
}

async fn wallet_balance(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Wallet>, ServerError> {
    let wallet = state.engine.wallet(WalletOwner::User(user_id)).await?;
    Ok(Json(wallet))
}

async fn wallet_history(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<LedgerTransaction>>, ServerError> {
    let limit = query.limit.unwrap_or(20).min(100);
    let history = state
        .engine
        .history(WalletOwner::User(user_id), limit)
        .await?;
    Ok(Json(history))
}

async fn award_xp(
    State(state): State<AppState>,
    Json(body): Json<XpRequestBody>,
) -> Result<Json<XpResult>, ServerError> {
    if body.activity.trim().is_empty() {
        return Err(ServerError::BadRequest("activity must not be empty".into()));
    }
    if body.amount <= 0 {
        return Err(ServerError::BadRequest(format!(
            "amount must be positive, got {}",
            body.amount
        )));
    }

    let result = state
        .ranks
        .award_xp(body.user_id, &body.activity, body.amount, body.metadata)
        .await?;
    Ok(Json(result))
}

async fn rank_ladder(
    State(state): State<AppState>,
) -> Result<Json<Vec<RankTier>>, ServerError> {
    Ok(Json(state.ranks.tiers().await?))
}

// ---------------------------------------------------------------------------
// Admin endpoints
// ---------------------------------------------------------------------------

fn verify_admin_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(ref expected) = config.admin_token else {
        return Err(ServerError::Forbidden(
            "Admin API is disabled (no ADMIN_TOKEN configured)".into(),
        ));
    };

    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);

    // Constant-time comparison to prevent timing attacks on admin token.
    use subtle::ConstantTimeEq;
    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    if token_bytes.len() != expected_bytes.len()
        || token_bytes.ct_eq(expected_bytes).unwrap_u8() != 1
    {
        return Err(ServerError::Forbidden("Invalid admin token".into()));
    }

    Ok(())
}

async fn admin_tick(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<TickReport>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    info!("manual bot tick requested");
    let report = state.scheduler.tick().await;
    Ok(Json(report))
}

async fn admin_treasury(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Treasury>, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    Ok(Json(state.engine.treasury_status().await?))
}

async fn admin_refill(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<RefillRequest>,
) -> Result<Json<Treasury>, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    require_positive(req.amount)?;

    let outcome = state
        .engine
        .refill_treasury(req.amount, &req.admin_id)
        .await?;
    audit::record(
        "treasury.refill",
        &req.admin_id,
        json!({ "amount": req.amount, "transaction_id": outcome.transaction.id }),
    );

    Ok(Json(state.engine.treasury_status().await?))
}

async fn admin_drain(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<DrainRequest>,
) -> Result<Json<ExecuteOutcome>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    let outcome = state
        .engine
        .drain_wallet(user_id, req.percent, &req.admin_id)
        .await?;
    audit::record(
        "wallet.drain",
        &req.admin_id,
        json!({
            "user_id": user_id,
            "percent": req.percent,
            "transaction_id": outcome.transaction.id,
        }),
    );

    Ok(Json(outcome))
}

async fn admin_list_bots(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<Bot>>, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    Ok(Json(state.registry.list().await?))
}

async fn admin_create_bot(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(spec): Json<NewBot>,
) -> Result<Json<Bot>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    let bot = state.registry.create(spec).await?;
    Ok(Json(bot))
}

async fn admin_update_bot(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(bot_id): Path<Uuid>,
    Json(req): Json<BotUpdateRequest>,
) -> Result<Json<Bot>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    let mut bot = state.registry.get(bot_id).await?;
    if let Some(name) = req.name {
        if name.trim().is_empty() {
            return Err(ServerError::BadRequest("bot name must not be empty".into()));
        }
        bot.name = name;
    }
    if let Some(trust) = req.trust {
        bot.trust = TrustLevel::new(trust);
    }
    if let Some(caps) = req.activity_caps {
        bot.activity_caps = caps;
    }

    state.registry.update(&bot).await?;
    audit::record("bot.update", &req.admin_id, json!({ "bot_id": bot_id }));

    Ok(Json(bot))
}

async fn admin_bot_actions(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(bot_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<BotAction>>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    let limit = query.limit.unwrap_or(20).min(100);
    Ok(Json(state.registry.recent_actions(bot_id, limit).await?))
}

async fn admin_treasury_limits(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<TreasuryLimitsRequest>,
) -> Result<Json<Treasury>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    if let Some(limit) = req.daily_spend_limit {
        require_positive(limit)?;
    }
    if let Some(cap) = req.wallet_cap_amount {
        require_positive(cap)?;
    }

    {
        let mut db = state.db.lock().await;
        db.with_tx::<_, StoreError>(|tx| {
            if let Some(limit) = req.daily_spend_limit {
                tx.set_daily_spend_limit(limit)?;
            }
            if let Some(cap) = req.wallet_cap_amount {
                tx.set_wallet_cap_amount(cap)?;
            }
            Ok(())
        })
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    }

    audit::record(
        "treasury.limits",
        &req.admin_id,
        json!({
            "daily_spend_limit": req.daily_spend_limit,
            "wallet_cap_amount": req.wallet_cap_amount,
        }),
    );

    Ok(Json(state.engine.treasury_status().await?))
}

async fn admin_toggle_bot(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(bot_id): Path<Uuid>,
    Json(req): Json<ToggleRequest>,
) -> Result<Json<Bot>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    let bot = state.registry.toggle(bot_id, req.active).await?;
    audit::record(
        "bot.toggle",
        &req.admin_id,
        json!({ "bot_id": bot_id, "active": req.active }),
    );

    Ok(Json(bot))
}

/// Read-model sync: the platform pushes fresh threads/listings here so the
/// bot selector has candidates. Idempotent per content id.
async fn admin_sync_content(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<ContentSyncRequest>,
) -> Result<Json<ContentItem>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    if req.kind == ContentKind::Listing && !matches!(req.price, Some(p) if p > 0) {
        return Err(ServerError::BadRequest(
            "listings need a positive price".into(),
        ));
    }

    let item = ContentItem {
        id: req.id,
        author_id: req.author_id,
        kind: req.kind,
        price: req.price,
        created_at: Utc::now(),
    };

    let mut db = state.db.lock().await;
    db.with_tx::<_, StoreError>(|tx| tx.upsert_content(&item))
        .map_err(|e| ServerError::Internal(e.to_string()))?;

    Ok(Json(item))
}

fn require_positive(amount: Coins) -> Result<(), ServerError> {
    if amount <= 0 {
        return Err(ServerError::BadRequest(format!(
            "amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_token_check() {
        let mut config = ServerConfig::default();
        let mut headers = HeaderMap::new();

        // Disabled admin API rejects everything.
        assert!(verify_admin_token(&headers, &config).is_err());

        config.admin_token = Some("sesame".to_string());
        headers.insert("authorization", "Bearer sesame".parse().unwrap());
        assert!(verify_admin_token(&headers, &config).is_ok());

        headers.insert("authorization", "Bearer wrong".parse().unwrap());
        assert!(verify_admin_token(&headers, &config).is_err());

        // Bare token without the Bearer prefix also works.
        headers.insert("authorization", "sesame".parse().unwrap());
        assert!(verify_admin_token(&headers, &config).is_ok());
    }
}
