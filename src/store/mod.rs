/// 저장소 트레이트
/// 코어는 아래 트레이트만 의존하고 구현체(Postgres, 메모리)는 주입받는다.
/// 물품 상태를 확인 후 변경하는 모든 연산은 단일 조건부 업데이트로 표현한다.
// region:    --- Imports
use crate::error::MarketResult;
use crate::marketplace::model::{
    Approval, ApprovalStatus, Chat, ChatMessage, ExpiredHold, Item, ItemStatus, NewItem,
    ReservedReason, UserRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;

pub mod memory;
pub mod postgres;

// endregion: --- Imports

// region:    --- Item Guards
/// 조건부 업데이트의 기대 상태
#[derive(Debug, Clone, PartialEq)]
pub enum ItemGuard {
    /// status 가 available 이거나 없음
    Available,
    /// 해당 구매자가 예약 중
    ReservedBy(String),
    /// available/없음 또는 해당 구매자가 예약 중 (sold 제외)
    AvailableOrReservedBy(String),
}

impl ItemGuard {
    pub fn matches(&self, item: &Item) -> bool {
        match self {
            ItemGuard::Available => item.effective_status() == ItemStatus::Available,
            ItemGuard::ReservedBy(buyer_id) => item.is_reserved_by(buyer_id),
            ItemGuard::AvailableOrReservedBy(buyer_id) => {
                item.effective_status() == ItemStatus::Available || item.is_reserved_by(buyer_id)
            }
        }
    }
}

/// 조건부 업데이트로 적용할 새 상태
#[derive(Debug, Clone, PartialEq)]
pub enum ItemTransition {
    Reserve {
        buyer_id: String,
        until: DateTime<Utc>,
        reason: Option<ReservedReason>,
        approved_at: Option<DateTime<Utc>>,
    },
    Release,
    Sell {
        buyer_id: String,
        at: DateTime<Utc>,
    },
}

impl ItemTransition {
    /// 메모리 구현과 테스트에서 사용하는 적용 함수
    pub fn apply(&self, item: &mut Item) {
        match self {
            ItemTransition::Reserve {
                buyer_id,
                until,
                reason,
                approved_at,
            } => {
                item.status = Some(ItemStatus::Reserved);
                item.reserved_by_user_id = Some(buyer_id.clone());
                item.reserved_until = Some(*until);
                item.reserved_reason = *reason;
                item.pickup_approved_at = *approved_at;
            }
            ItemTransition::Release => {
                item.status = Some(ItemStatus::Available);
                clear_reservation(item);
            }
            ItemTransition::Sell { buyer_id, at } => {
                item.status = Some(ItemStatus::Sold);
                item.sold_to = Some(buyer_id.clone());
                item.sold_at = Some(*at);
                clear_reservation(item);
            }
        }
    }
}

pub(crate) fn clear_reservation(item: &mut Item) {
    item.reserved_by_user_id = None;
    item.reserved_until = None;
    item.reserved_reason = None;
    item.pickup_approved_at = None;
}

/// 물품 조회 조건
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub owner_id: Option<String>,
    pub reserved_by: Option<String>,
    pub status: Option<ItemStatus>,
    pub exclude_sold: bool,
    pub name_contains: Option<String>,
    pub category: Option<String>,
    pub condition: Option<String>,
    pub city: Option<String>,
    pub area: Option<String>,
    pub newest_first: bool,
    pub limit: Option<i64>,
}

impl ItemFilter {
    pub fn matches(&self, item: &Item) -> bool {
        let eq = |want: &Option<String>, have: &str| want.as_deref().map_or(true, |w| w == have);

        if let Some(owner_id) = &self.owner_id {
            if !item.is_owned_by(owner_id) {
                return false;
            }
        }
        if let Some(reserved_by) = &self.reserved_by {
            if item.reserved_by_user_id.as_deref() != Some(reserved_by.as_str()) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if item.effective_status() != status {
                return false;
            }
        }
        if self.exclude_sold && item.effective_status() == ItemStatus::Sold {
            return false;
        }
        if let Some(name) = &self.name_contains {
            if !item.name.to_lowercase().contains(&name.to_lowercase()) {
                return false;
            }
        }
        eq(&self.category, &item.category)
            && eq(&self.condition, &item.condition)
            && eq(&self.city, &item.city)
            && eq(&self.area, &item.area)
    }
}
// endregion: --- Item Guards

// region:    --- Store Traits
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// 물품 등록 (id 는 기존 최대값 + 1)
    async fn insert(&self, new_item: NewItem, owner_id: &str, now: DateTime<Utc>) -> MarketResult<Item>;

    async fn find_by_id(&self, id: &str) -> MarketResult<Option<Item>>;

    async fn find_many(&self, filter: &ItemFilter) -> MarketResult<Vec<Item>>;

    /// 기대 상태와 일치할 때만 전이. 일치하지 않으면 None
    async fn conditional_update_status(
        &self,
        id: &str,
        guard: &ItemGuard,
        transition: &ItemTransition,
    ) -> MarketResult<Option<Item>>;

    /// 만료된 예약을 해제하고, 이 호출이 실제로 해제한 예약만 반환
    async fn bulk_clear_expired(&self, now: DateTime<Utc>) -> MarketResult<Vec<ExpiredHold>>;

    /// status 필드가 없는 물품을 available 로 정규화
    async fn normalize_missing_status(&self) -> MarketResult<u64>;

    /// date_added 가 (after, up_to] 범위이고 아직 알림을 보내지 않은 물품
    async fn find_carousel_exit_candidates(
        &self,
        added_after: DateTime<Utc>,
        added_up_to: DateTime<Utc>,
    ) -> MarketResult<Vec<Item>>;

    /// 알림 플래그를 세운다. 이미 세워져 있으면 false
    async fn mark_carousel_exit_notified(&self, id: &str, at: DateTime<Utc>) -> MarketResult<bool>;

    async fn soft_delete(&self, id: &str, at: DateTime<Utc>) -> MarketResult<bool>;
}

#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// 기존 요청을 찾거나 pending 으로 생성. 생성 여부를 함께 반환
    async fn find_or_create(
        &self,
        item_id: &str,
        buyer_id: &str,
        seller_id: &str,
        now: DateTime<Utc>,
    ) -> MarketResult<(Approval, bool)>;

    /// 상태 upsert (hold_placed_at 은 초기화)
    async fn upsert_status(
        &self,
        item_id: &str,
        buyer_id: &str,
        seller_id: &str,
        status: ApprovalStatus,
        now: DateTime<Utc>,
    ) -> MarketResult<Approval>;

    async fn list_by_seller(&self, item_id: &str, seller_id: &str) -> MarketResult<Vec<Approval>>;

    async fn find_by_buyer(&self, item_id: &str, buyer_id: &str) -> MarketResult<Option<Approval>>;

    async fn mark_hold_placed(&self, approval_id: i64, at: DateTime<Utc>) -> MarketResult<bool>;

    /// 승인되었으나 물품 예약이 확인되지 않은 요청 (updated_at <= before)
    async fn list_unconfirmed(&self, before: DateTime<Utc>) -> MarketResult<Vec<Approval>>;

    /// 미확인 승인을 pending 으로 되돌린다
    async fn revert_unconfirmed(&self, approval_id: i64, now: DateTime<Utc>) -> MarketResult<bool>;
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn find_or_create(
        &self,
        item_id: &str,
        buyer_id: &str,
        seller_id: &str,
        initial_approved: bool,
        now: DateTime<Utc>,
    ) -> MarketResult<(Chat, bool)>;

    async fn find_by_id(&self, chat_id: i64) -> MarketResult<Option<Chat>>;

    async fn find_by_participants(
        &self,
        item_id: &str,
        buyer_id: &str,
        seller_id: &str,
    ) -> MarketResult<Option<Chat>>;

    async fn set_approved(&self, chat_id: i64, now: DateTime<Utc>) -> MarketResult<Option<Chat>>;

    /// 최근 갱신 순
    async fn list_for_user(&self, user_id: &str, limit: i64) -> MarketResult<Vec<Chat>>;

    /// 메시지 추가 및 채팅방 updated_at 갱신
    async fn append_message(
        &self,
        chat_id: i64,
        sender_id: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> MarketResult<ChatMessage>;

    /// 작성 순
    async fn list_messages(&self, chat_id: i64, limit: i64) -> MarketResult<Vec<ChatMessage>>;

    /// 메시지를 먼저 지우고 채팅방 삭제
    async fn delete_chat_cascade(&self, chat_id: i64) -> MarketResult<bool>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, user_id: &str) -> MarketResult<Option<UserRecord>>;

    /// 카운트 증가 후 갱신된 사용자 반환 (없는 사용자는 None)
    async fn increment_timeout_count(
        &self,
        user_id: &str,
        delta: i64,
    ) -> MarketResult<Option<UserRecord>>;

    /// 플래그를 세운다. 이 호출이 세웠을 때만 true
    async fn set_flagged(&self, user_id: &str) -> MarketResult<bool>;

    async fn list_admins(&self) -> MarketResult<Vec<String>>;
}
// endregion: --- Store Traits

// region:    --- Stores
/// 코어가 사용하는 저장소 묶음
#[derive(Clone)]
pub struct Stores {
    pub items: Arc<dyn ItemStore>,
    pub approvals: Arc<dyn ApprovalStore>,
    pub chats: Arc<dyn ChatStore>,
    pub users: Arc<dyn UserStore>,
}

impl Stores {
    pub fn postgres(pool: Arc<PgPool>, max_pickup_locations: usize) -> Self {
        Self {
            items: Arc::new(postgres::PostgresItemStore::new(
                Arc::clone(&pool),
                max_pickup_locations,
            )),
            approvals: Arc::new(postgres::PostgresApprovalStore::new(Arc::clone(&pool))),
            chats: Arc::new(postgres::PostgresChatStore::new(Arc::clone(&pool))),
            users: Arc::new(postgres::PostgresUserStore::new(pool)),
        }
    }

    pub fn in_memory(max_pickup_locations: usize) -> Self {
        Self {
            items: Arc::new(memory::MemoryItemStore::new(max_pickup_locations)),
            approvals: Arc::new(memory::MemoryApprovalStore::new()),
            chats: Arc::new(memory::MemoryChatStore::new()),
            users: Arc::new(memory::MemoryUserStore::new()),
        }
    }
}
// endregion: --- Stores
