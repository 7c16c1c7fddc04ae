// region:    --- Imports
use super::AppState;
use crate::auth::{Actor, AdminActor};
use crate::error::MarketResult;
use crate::marketplace::model::{Item, NewItem};
use crate::query::handlers::{self as queries, AdminItemView, ItemSearch};
use crate::reservation::{ApprovalGrant, ItemAccess, PickupOption, PickupQuery};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

// endregion: --- Imports

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveBuyerBody {
    #[serde(default)]
    pub buyer_id: String,
}

// region:    --- Query Handlers
/// 물품 검색
pub async fn handle_list_items(
    State(state): State<AppState>,
    Query(search): Query<ItemSearch>,
) -> MarketResult<Json<Vec<Item>>> {
    Ok(Json(queries::list_items(&state.engine, &search).await?))
}

/// 캐러셀
pub async fn handle_carousel(State(state): State<AppState>) -> MarketResult<Json<Vec<Item>>> {
    Ok(Json(queries::carousel(&state.engine).await?))
}

/// 내 물품
pub async fn handle_my_items(
    State(state): State<AppState>,
    actor: Actor,
) -> MarketResult<Json<Vec<Item>>> {
    Ok(Json(queries::my_items(&state.engine, &actor.user_id).await?))
}

/// 내 예약
pub async fn handle_my_reservations(
    State(state): State<AppState>,
    actor: Actor,
) -> MarketResult<Json<Vec<Item>>> {
    Ok(Json(
        queries::my_reservations(&state.engine, &actor.user_id).await?,
    ))
}

/// 관리자 전체 물품
pub async fn handle_admin_all_items(
    State(state): State<AppState>,
    _admin: AdminActor,
) -> MarketResult<Json<Vec<AdminItemView>>> {
    Ok(Json(queries::admin_all_items(&state.engine).await?))
}

/// 물품 조회
pub async fn handle_get_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> MarketResult<Json<Item>> {
    Ok(Json(queries::get_item(&state.engine, &id).await?))
}

/// 역할별 물품 접근 정보
pub async fn handle_item_access(
    State(state): State<AppState>,
    Path(id): Path<String>,
    actor: Actor,
) -> MarketResult<Json<ItemAccess>> {
    Ok(Json(state.engine.item_access(&id, &actor.user_id).await?))
}

/// 픽업 장소 안내
pub async fn handle_pickup_options(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PickupQuery>,
    actor: Actor,
) -> MarketResult<Json<Vec<PickupOption>>> {
    Ok(Json(
        state
            .engine
            .request_pickup_options(&id, &actor.user_id, &query)
            .await?,
    ))
}
// endregion: --- Query Handlers

// region:    --- Command Handlers
/// 물품 등록
pub async fn handle_create_item(
    State(state): State<AppState>,
    actor: Actor,
    Json(new_item): Json<NewItem>,
) -> MarketResult<impl IntoResponse> {
    info!("{:<12} --> 물품 등록 요청 owner: {}", "Handler", actor.user_id);
    let item = state.engine.create_item(&actor.user_id, new_item).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// 예약
pub async fn handle_reserve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    actor: Actor,
) -> MarketResult<Json<Item>> {
    info!("{:<12} --> 예약 요청 id: {}, user: {}", "Handler", id, actor.user_id);
    Ok(Json(state.engine.reserve(&id, &actor.user_id).await?))
}

/// 예약 취소
pub async fn handle_cancel_reservation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    actor: Actor,
) -> MarketResult<Json<Item>> {
    info!("{:<12} --> 예약 취소 요청 id: {}, user: {}", "Handler", id, actor.user_id);
    Ok(Json(
        state.engine.cancel_reservation(&id, &actor.user_id).await?,
    ))
}

/// 픽업 승인 요청 (새로 만들면 201, 기존 요청이면 200)
pub async fn handle_request_approval(
    State(state): State<AppState>,
    Path(id): Path<String>,
    actor: Actor,
) -> MarketResult<impl IntoResponse> {
    info!("{:<12} --> 승인 요청 id: {}, buyer: {}", "Handler", id, actor.user_id);
    let request = state.engine.request_approval(&id, &actor.user_id).await?;
    let status = if request.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(request.approval)))
}

/// 구매자 승인
pub async fn handle_approve_buyer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    actor: Actor,
    Json(body): Json<ApproveBuyerBody>,
) -> MarketResult<Json<ApprovalGrant>> {
    info!(
        "{:<12} --> 구매자 승인 요청 id: {}, buyer: {}",
        "Handler", id, body.buyer_id
    );
    Ok(Json(
        state
            .engine
            .approve_buyer(&id, &actor.user_id, &body.buyer_id)
            .await?,
    ))
}

/// 구매 확정
pub async fn handle_purchase(
    State(state): State<AppState>,
    Path(id): Path<String>,
    actor: Actor,
) -> MarketResult<Json<Item>> {
    info!("{:<12} --> 구매 확정 요청 id: {}, buyer: {}", "Handler", id, actor.user_id);
    Ok(Json(
        state.engine.complete_purchase(&id, &actor.user_id).await?,
    ))
}

/// 물품 삭제
pub async fn handle_delete_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    actor: Actor,
) -> MarketResult<impl IntoResponse> {
    state
        .engine
        .delete_item(&id, &actor.user_id, actor.role)
        .await?;
    Ok(Json(json!({ "deleted": "success" })))
}
// endregion: --- Command Handlers
