/// 요청 사용자 식별
/// 토큰 검증은 앞단 인증 게이트웨이가 담당하고, 검증된 사용자 정보를 헤더로 전달한다.
// region:    --- Imports
use crate::error::MarketError;
use crate::marketplace::model::Role;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

// endregion: --- Imports

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// 인증된 요청 사용자
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, MarketError> {
        let user_id = headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| MarketError::Unauthorized("Authentication required".to_string()))?;
        let role = headers
            .get(USER_ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(Role::parse)
            .unwrap_or(Role::User);

        Ok(Actor {
            user_id: user_id.to_string(),
            role,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = MarketError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(actor) = parts.extensions.get::<Actor>().cloned() {
            return Ok(actor);
        }

        let actor = Actor::from_headers(&parts.headers)?;
        parts.extensions.insert(actor.clone());
        Ok(actor)
    }
}

/// 관리자 전용 요청 사용자
#[derive(Debug, Clone)]
pub struct AdminActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for AdminActor
where
    S: Send + Sync,
{
    type Rejection = MarketError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let actor = Actor::from_request_parts(parts, state).await?;
        if !actor.is_admin() {
            return Err(MarketError::forbidden(
                crate::error::ForbiddenReason::AdminOnly,
                "Admin access required",
            ));
        }
        Ok(AdminActor(actor))
    }
}
