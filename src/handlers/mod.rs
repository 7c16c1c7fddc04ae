// region:    --- Imports
use crate::chat::ChatGate;
use crate::error::MarketError;
use crate::reservation::ReservationEngine;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub mod chats;
pub mod items;
pub mod ws;

// endregion: --- Imports

// region:    --- App State
#[derive(Clone)]
pub struct AppState {
    pub engine: ReservationEngine,
    pub chat: ChatGate,
}

impl AppState {
    pub fn new(engine: ReservationEngine, chat: ChatGate) -> Self {
        Self { engine, chat }
    }
}
// endregion: --- App State

/// 경로의 채팅방 id 파싱
pub(crate) fn parse_chat_id(raw: &str) -> Result<i64, MarketError> {
    raw.parse::<i64>()
        .map_err(|_| MarketError::InvalidInput("Invalid chat ID".to_string()))
}

// region:    --- Router
pub fn build_router(state: AppState) -> Router {
    // 프론트엔드를 위한 cors 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/items", get(items::handle_list_items).post(items::handle_create_item))
        .route("/items/carousel", get(items::handle_carousel))
        .route("/items/mine", get(items::handle_my_items))
        .route("/items/reservations/me", get(items::handle_my_reservations))
        .route("/items/admin/all", get(items::handle_admin_all_items))
        .route(
            "/items/:id",
            get(items::handle_get_item).delete(items::handle_delete_item),
        )
        .route("/items/:id/reserve", post(items::handle_reserve))
        .route(
            "/items/:id/cancel-reservation",
            post(items::handle_cancel_reservation),
        )
        .route(
            "/items/:id/request-approval",
            post(items::handle_request_approval),
        )
        .route("/items/:id/approve-buyer", post(items::handle_approve_buyer))
        .route("/items/:id/secure", get(items::handle_item_access))
        .route("/items/:id/pickup-options", get(items::handle_pickup_options))
        .route("/items/:id/purchase", post(items::handle_purchase))
        .route("/chats", get(chats::handle_list_chats))
        .route(
            "/chats/:id",
            post(chats::handle_open_chat).delete(chats::handle_delete_chat),
        )
        .route("/chats/:id/approve", patch(chats::handle_approve_chat))
        .route(
            "/chats/:id/messages",
            get(chats::handle_list_messages).post(chats::handle_post_message),
        )
        .route("/ws", get(ws::handle_ws))
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(state)
}
// endregion: --- Router
