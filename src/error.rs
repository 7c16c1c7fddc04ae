/// 마켓 서비스 에러 정의
/// 모든 코어 연산은 아래 분류 중 하나로 실패한다.
/// 저장소 에러는 Unavailable 로 감싸서 외부로 원문이 새지 않도록 한다.
// region:    --- Imports
use crate::marketplace::model::ItemStatus;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

// endregion: --- Imports

// region:    --- Reasons
/// 상태 충돌 사유 (어느 쪽이 막고 있는지 UI 가 설명할 수 있도록)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    NotAvailable,
    ReservedByOtherBuyer,
    AlreadySold,
    LostRace,
}

/// 권한 거부 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForbiddenReason {
    NotOwner,
    NotParticipant,
    NotReserver,
    ChatNotApproved,
    AdminOnly,
}
// endregion: --- Reasons

// region:    --- Market Error
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Forbidden {
        message: String,
        reason: ForbiddenReason,
    },

    #[error("{message}")]
    Conflict {
        message: String,
        reason: ConflictReason,
        current_status: Option<ItemStatus>,
    },

    #[error("{message}")]
    InvalidState {
        message: String,
        current_status: ItemStatus,
    },

    #[error("{0}")]
    InvalidInput(String),

    /// 인증 게이트웨이가 사용자 정보를 넘기지 않음
    #[error("{0}")]
    Unauthorized(String),

    #[error("저장소를 사용할 수 없습니다: {0}")]
    Unavailable(String),
}

impl MarketError {
    pub fn not_found(what: &str) -> Self {
        MarketError::NotFound(format!("{} not found", what))
    }

    pub fn forbidden(reason: ForbiddenReason, message: impl Into<String>) -> Self {
        MarketError::Forbidden {
            message: message.into(),
            reason,
        }
    }

    pub fn conflict(
        reason: ConflictReason,
        current_status: Option<ItemStatus>,
        message: impl Into<String>,
    ) -> Self {
        MarketError::Conflict {
            message: message.into(),
            reason,
            current_status,
        }
    }

    /// 에러 코드 (응답 바디의 code 필드)
    pub fn code(&self) -> &'static str {
        match self {
            MarketError::NotFound(_) => "NOT_FOUND",
            MarketError::Forbidden { .. } => "FORBIDDEN",
            MarketError::Conflict { .. } => "CONFLICT",
            MarketError::InvalidState { .. } => "INVALID_STATE",
            MarketError::InvalidInput(_) => "INVALID_INPUT",
            MarketError::Unauthorized(_) => "UNAUTHORIZED",
            MarketError::Unavailable(_) => "UNAVAILABLE",
        }
    }

    /// 클라이언트에 보여줄 메시지 (저장소 원문은 감춘다)
    pub fn client_message(&self) -> String {
        match self {
            MarketError::Unavailable(detail) => {
                error!("{:<12} --> 저장소 오류: {}", "Error", detail);
                "Storage unavailable".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for MarketError {
    fn from(err: sqlx::Error) -> Self {
        MarketError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for MarketError {
    fn from(err: serde_json::Error) -> Self {
        MarketError::Unavailable(err.to_string())
    }
}

/// HTTP 응답 변환
impl IntoResponse for MarketError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, body) = match &self {
            MarketError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({ "error": msg, "code": code }),
            ),
            MarketError::Forbidden { message, reason } => (
                StatusCode::FORBIDDEN,
                serde_json::json!({ "error": message, "code": code, "reason": reason }),
            ),
            MarketError::Conflict {
                message,
                reason,
                current_status,
            } => (
                StatusCode::CONFLICT,
                serde_json::json!({
                    "error": message,
                    "code": code,
                    "reason": reason,
                    "current_status": current_status,
                }),
            ),
            MarketError::InvalidState {
                message,
                current_status,
            } => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": message,
                    "code": code,
                    "current_status": current_status,
                }),
            ),
            MarketError::InvalidInput(msg) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": msg, "code": code }),
            ),
            MarketError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({ "error": msg, "code": code }),
            ),
            MarketError::Unavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({ "error": self.client_message(), "code": code }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

pub type MarketResult<T> = Result<T, MarketError>;
// endregion: --- Market Error
