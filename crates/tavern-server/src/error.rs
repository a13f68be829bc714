use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use tavern_bots::BotError;
use tavern_economy::{LedgerError, RankError};
use tavern_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Rank(#[from] RankError),

    #[error(transparent)]
    Bot(#[from] BotError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),

            // Spend failures carry a specific, non-leaking message.
            ServerError::Ledger(LedgerError::InsufficientBalance { .. })
            | ServerError::Ledger(LedgerError::WalletCapExceeded) => {
                (StatusCode::CONFLICT, self.to_string())
            }

            // Treasury state is internal; end users only see that rewards
            // are paused.
            ServerError::Ledger(LedgerError::TreasuryExhausted { .. })
            | ServerError::Ledger(LedgerError::InsufficientTreasuryFunds) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Rewards temporarily unavailable".to_string(),
            ),

            ServerError::Ledger(LedgerError::InvalidTransactionShape(_))
            | ServerError::Rank(RankError::InvalidAmount(_))
            | ServerError::Bot(BotError::InvalidDefinition(_)) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }

            ServerError::Ledger(LedgerError::Store(StoreError::NotFound))
            | ServerError::Rank(RankError::Store(StoreError::NotFound))
            | ServerError::Bot(BotError::Store(StoreError::NotFound)) => {
                (StatusCode::NOT_FOUND, "Record not found".to_string())
            }

            ServerError::Ledger(_)
            | ServerError::Rank(_)
            | ServerError::Bot(_)
            | ServerError::Internal(_) => {
                tracing::error!(error = %self, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
