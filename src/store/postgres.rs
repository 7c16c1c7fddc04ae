/// Postgres 저장소 구현
/// 상태 전이는 모두 `UPDATE ... WHERE <기대 상태> RETURNING` 한 문장으로 처리한다.
// region:    --- Imports
use super::{ApprovalStore, ChatStore, ItemFilter, ItemGuard, ItemStore, ItemTransition, UserStore};
use crate::error::{MarketError, MarketResult};
use crate::marketplace::model::{
    clean_pickup_locations, Approval, ApprovalStatus, Chat, ChatMessage, ExpiredHold, Item,
    ItemStatus, NewItem, PickupLocation, ReservedReason, Role, UserRecord,
};
use crate::query::queries;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::sync::Arc;
use tracing::{debug, warn};

// endregion: --- Imports

// 최대 재시도 횟수 (물품 id 충돌)
const MAX_RETRIES: i32 = 100;

// region:    --- Rows
#[derive(FromRow)]
struct ItemRow {
    id: String,
    name: String,
    category: String,
    condition: String,
    description: String,
    price: f64,
    city: String,
    area: String,
    pickup_locations: Json<Vec<PickupLocation>>,
    owner_id: Option<String>,
    status: Option<String>,
    reserved_by_user_id: Option<String>,
    reserved_until: Option<DateTime<Utc>>,
    reserved_reason: Option<String>,
    pickup_approved_at: Option<DateTime<Utc>>,
    carousel_exit_notified: bool,
    sold_to: Option<String>,
    sold_at: Option<DateTime<Utc>>,
    date_added: DateTime<Utc>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            id: row.id,
            name: row.name,
            category: row.category,
            condition: row.condition,
            description: row.description,
            price: row.price,
            city: row.city,
            area: row.area,
            pickup_locations: row.pickup_locations.0,
            owner_id: row.owner_id,
            status: row.status.as_deref().and_then(ItemStatus::parse),
            reserved_by_user_id: row.reserved_by_user_id,
            reserved_until: row.reserved_until,
            reserved_reason: row.reserved_reason.as_deref().and_then(ReservedReason::parse),
            pickup_approved_at: row.pickup_approved_at,
            carousel_exit_notified: row.carousel_exit_notified,
            sold_to: row.sold_to,
            sold_at: row.sold_at,
            date_added: row.date_added,
        }
    }
}

#[derive(FromRow)]
struct ExpiredRow {
    id: String,
    reserved_by_user_id: Option<String>,
    reserved_reason: Option<String>,
}

#[derive(FromRow)]
struct ApprovalRow {
    id: i64,
    item_id: String,
    buyer_id: String,
    seller_id: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    hold_placed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ApprovalRow> for Approval {
    type Error = MarketError;

    fn try_from(row: ApprovalRow) -> Result<Self, Self::Error> {
        let status = ApprovalStatus::parse(&row.status).ok_or_else(|| {
            MarketError::Unavailable(format!("unknown approval status: {}", row.status))
        })?;
        Ok(Approval {
            id: row.id,
            item_id: row.item_id,
            buyer_id: row.buyer_id,
            seller_id: row.seller_id,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            hold_placed_at: row.hold_placed_at,
        })
    }
}

#[derive(FromRow)]
struct ChatRow {
    id: i64,
    item_id: String,
    buyer_id: String,
    seller_id: String,
    is_approved: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ChatRow> for Chat {
    fn from(row: ChatRow) -> Self {
        Chat {
            id: row.id,
            item_id: row.item_id,
            buyer_id: row.buyer_id,
            seller_id: row.seller_id,
            is_approved: row.is_approved,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct MessageRow {
    id: i64,
    chat_id: i64,
    sender_id: String,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for ChatMessage {
    fn from(row: MessageRow) -> Self {
        ChatMessage {
            id: row.id,
            chat_id: row.chat_id,
            sender_id: row.sender_id,
            content: row.content,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct UserRow {
    id: String,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    role: String,
    pickup_timeout_count: i64,
    pickup_timeout_flagged: bool,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        UserRecord {
            id: row.id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            role: Role::parse(&row.role),
            pickup_timeout_count: row.pickup_timeout_count,
            pickup_timeout_flagged: row.pickup_timeout_flagged,
        }
    }
}
// endregion: --- Rows

// region:    --- Postgres Item Store
pub struct PostgresItemStore {
    pool: Arc<PgPool>,
    max_pickup_locations: usize,
}

impl PostgresItemStore {
    pub fn new(pool: Arc<PgPool>, max_pickup_locations: usize) -> Self {
        Self {
            pool,
            max_pickup_locations,
        }
    }
}

/// LIKE 패턴 이스케이프
fn like_pattern(raw: &str) -> String {
    let escaped = raw
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl ItemStore for PostgresItemStore {
    async fn insert(&self, new_item: NewItem, owner_id: &str, now: DateTime<Utc>) -> MarketResult<Item> {
        let pickup_locations = clean_pickup_locations(&new_item.pickup_locations, self.max_pickup_locations);
        let mut retries = 0;

        // 동시 등록으로 id 가 겹치면 다음 id 로 재시도
        while retries < MAX_RETRIES {
            let next_id: i64 = sqlx::query_scalar(queries::NEXT_ITEM_ID)
                .fetch_one(&*self.pool)
                .await?;

            let inserted = sqlx::query_as::<_, ItemRow>(queries::INSERT_ITEM)
                .bind(next_id.to_string())
                .bind(&new_item.name)
                .bind(&new_item.category)
                .bind(&new_item.condition)
                .bind(&new_item.description)
                .bind(new_item.price.max(0.0))
                .bind(&new_item.city)
                .bind(&new_item.area)
                .bind(Json(&pickup_locations))
                .bind(owner_id)
                .bind(now)
                .fetch_optional(&*self.pool)
                .await?;

            match inserted {
                Some(row) => return Ok(row.into()),
                None => {
                    warn!("{:<12} --> 물품 id 충돌: 재시도 (id: {})", "Store", next_id);
                    retries += 1;
                }
            }
        }

        Err(MarketError::Unavailable("item id allocation retries exceeded".to_string()))
    }

    async fn find_by_id(&self, id: &str) -> MarketResult<Option<Item>> {
        let row = sqlx::query_as::<_, ItemRow>(queries::GET_ITEM)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.map(Item::from))
    }

    async fn find_many(&self, filter: &ItemFilter) -> MarketResult<Vec<Item>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        qb.push(queries::ITEM_COLUMNS)
            .push(" FROM items WHERE deleted_at IS NULL");

        if let Some(owner_id) = &filter.owner_id {
            qb.push(" AND owner_id = ").push_bind(owner_id.as_str());
        }
        if let Some(reserved_by) = &filter.reserved_by {
            qb.push(" AND reserved_by_user_id = ").push_bind(reserved_by.as_str());
        }
        match filter.status {
            Some(ItemStatus::Available) => {
                qb.push(" AND (status IS NULL OR status = 'available')");
            }
            Some(status) => {
                qb.push(" AND status = ").push_bind(status.as_str());
            }
            None => {}
        }
        if filter.exclude_sold {
            qb.push(" AND (status IS NULL OR status <> 'sold')");
        }
        if let Some(name) = &filter.name_contains {
            qb.push(" AND name ILIKE ").push_bind(like_pattern(name));
        }
        if let Some(category) = &filter.category {
            qb.push(" AND category = ").push_bind(category.as_str());
        }
        if let Some(condition) = &filter.condition {
            qb.push(" AND condition = ").push_bind(condition.as_str());
        }
        if let Some(city) = &filter.city {
            qb.push(" AND city = ").push_bind(city.as_str());
        }
        if let Some(area) = &filter.area {
            qb.push(" AND area = ").push_bind(area.as_str());
        }
        if filter.newest_first {
            qb.push(" ORDER BY date_added DESC, pk DESC");
        } else {
            qb.push(" ORDER BY pk ASC");
        }
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let rows = qb
            .build_query_as::<ItemRow>()
            .fetch_all(&*self.pool)
            .await?;
        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn conditional_update_status(
        &self,
        id: &str,
        guard: &ItemGuard,
        transition: &ItemTransition,
    ) -> MarketResult<Option<Item>> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE items SET ");
        match transition {
            ItemTransition::Reserve {
                buyer_id,
                until,
                reason,
                approved_at,
            } => {
                qb.push("status = 'reserved', reserved_by_user_id = ")
                    .push_bind(buyer_id.as_str())
                    .push(", reserved_until = ")
                    .push_bind(*until)
                    .push(", reserved_reason = ")
                    .push_bind(reason.map(|r| r.as_str()))
                    .push(", pickup_approved_at = ")
                    .push_bind(*approved_at);
            }
            ItemTransition::Release => {
                qb.push(
                    "status = 'available', reserved_by_user_id = NULL, reserved_until = NULL, \
                     reserved_reason = NULL, pickup_approved_at = NULL",
                );
            }
            ItemTransition::Sell { buyer_id, at } => {
                qb.push("status = 'sold', sold_to = ")
                    .push_bind(buyer_id.as_str())
                    .push(", sold_at = ")
                    .push_bind(*at)
                    .push(
                        ", reserved_by_user_id = NULL, reserved_until = NULL, \
                         reserved_reason = NULL, pickup_approved_at = NULL",
                    );
            }
        }

        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(" AND deleted_at IS NULL AND ");
        match guard {
            ItemGuard::Available => {
                qb.push("(status IS NULL OR status = 'available')");
            }
            ItemGuard::ReservedBy(buyer_id) => {
                qb.push("(status = 'reserved' AND reserved_by_user_id = ")
                    .push_bind(buyer_id.as_str())
                    .push(")");
            }
            ItemGuard::AvailableOrReservedBy(buyer_id) => {
                qb.push("(status IS NULL OR status = 'available' OR (status = 'reserved' AND reserved_by_user_id = ")
                    .push_bind(buyer_id.as_str())
                    .push("))");
            }
        }
        qb.push(" RETURNING ").push(queries::ITEM_COLUMNS);

        let row = qb
            .build_query_as::<ItemRow>()
            .fetch_optional(&*self.pool)
            .await?;
        debug!(
            "{:<12} --> 조건부 업데이트 id: {}, 일치: {}",
            "Store",
            id,
            row.is_some()
        );
        Ok(row.map(Item::from))
    }

    async fn bulk_clear_expired(&self, now: DateTime<Utc>) -> MarketResult<Vec<ExpiredHold>> {
        let rows = sqlx::query_as::<_, ExpiredRow>(queries::CLEAR_EXPIRED_RESERVATIONS)
            .bind(now)
            .fetch_all(&*self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| ExpiredHold {
                item_id: row.id,
                buyer_id: row.reserved_by_user_id,
                reason: row.reserved_reason.as_deref().and_then(ReservedReason::parse),
            })
            .collect())
    }

    async fn normalize_missing_status(&self) -> MarketResult<u64> {
        let result = sqlx::query(queries::NORMALIZE_MISSING_STATUS)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn find_carousel_exit_candidates(
        &self,
        added_after: DateTime<Utc>,
        added_up_to: DateTime<Utc>,
    ) -> MarketResult<Vec<Item>> {
        let rows = sqlx::query_as::<_, ItemRow>(queries::GET_CAROUSEL_EXIT_CANDIDATES)
            .bind(added_after)
            .bind(added_up_to)
            .fetch_all(&*self.pool)
            .await?;
        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn mark_carousel_exit_notified(&self, id: &str, at: DateTime<Utc>) -> MarketResult<bool> {
        let result = sqlx::query(queries::MARK_CAROUSEL_EXIT_NOTIFIED)
            .bind(id)
            .bind(at)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete(&self, id: &str, at: DateTime<Utc>) -> MarketResult<bool> {
        let result = sqlx::query(queries::SOFT_DELETE_ITEM)
            .bind(id)
            .bind(at)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
// endregion: --- Postgres Item Store

// region:    --- Postgres Approval Store
pub struct PostgresApprovalStore {
    pool: Arc<PgPool>,
}

impl PostgresApprovalStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApprovalStore for PostgresApprovalStore {
    async fn find_or_create(
        &self,
        item_id: &str,
        buyer_id: &str,
        seller_id: &str,
        now: DateTime<Utc>,
    ) -> MarketResult<(Approval, bool)> {
        let inserted = sqlx::query_as::<_, ApprovalRow>(queries::INSERT_APPROVAL)
            .bind(item_id)
            .bind(buyer_id)
            .bind(seller_id)
            .bind(now)
            .fetch_optional(&*self.pool)
            .await?;
        if let Some(row) = inserted {
            return Ok((row.try_into()?, true));
        }

        let existing = sqlx::query_as::<_, ApprovalRow>(queries::GET_APPROVAL)
            .bind(item_id)
            .bind(buyer_id)
            .bind(seller_id)
            .fetch_one(&*self.pool)
            .await?;
        Ok((existing.try_into()?, false))
    }

    async fn upsert_status(
        &self,
        item_id: &str,
        buyer_id: &str,
        seller_id: &str,
        status: ApprovalStatus,
        now: DateTime<Utc>,
    ) -> MarketResult<Approval> {
        sqlx::query_as::<_, ApprovalRow>(queries::UPSERT_APPROVAL_STATUS)
            .bind(item_id)
            .bind(buyer_id)
            .bind(seller_id)
            .bind(status.as_str())
            .bind(now)
            .fetch_one(&*self.pool)
            .await?
            .try_into()
    }

    async fn list_by_seller(&self, item_id: &str, seller_id: &str) -> MarketResult<Vec<Approval>> {
        sqlx::query_as::<_, ApprovalRow>(queries::GET_APPROVALS_BY_SELLER)
            .bind(item_id)
            .bind(seller_id)
            .fetch_all(&*self.pool)
            .await?
            .into_iter()
            .map(Approval::try_from)
            .collect()
    }

    async fn find_by_buyer(&self, item_id: &str, buyer_id: &str) -> MarketResult<Option<Approval>> {
        sqlx::query_as::<_, ApprovalRow>(queries::GET_APPROVAL_BY_BUYER)
            .bind(item_id)
            .bind(buyer_id)
            .fetch_optional(&*self.pool)
            .await?
            .map(Approval::try_from)
            .transpose()
    }

    async fn mark_hold_placed(&self, approval_id: i64, at: DateTime<Utc>) -> MarketResult<bool> {
        let result = sqlx::query(queries::MARK_APPROVAL_HOLD_PLACED)
            .bind(approval_id)
            .bind(at)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_unconfirmed(&self, before: DateTime<Utc>) -> MarketResult<Vec<Approval>> {
        sqlx::query_as::<_, ApprovalRow>(queries::GET_UNCONFIRMED_APPROVALS)
            .bind(before)
            .fetch_all(&*self.pool)
            .await?
            .into_iter()
            .map(Approval::try_from)
            .collect()
    }

    async fn revert_unconfirmed(&self, approval_id: i64, now: DateTime<Utc>) -> MarketResult<bool> {
        let result = sqlx::query(queries::REVERT_UNCONFIRMED_APPROVAL)
            .bind(approval_id)
            .bind(now)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
// endregion: --- Postgres Approval Store

// region:    --- Postgres Chat Store
pub struct PostgresChatStore {
    pool: Arc<PgPool>,
}

impl PostgresChatStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatStore for PostgresChatStore {
    async fn find_or_create(
        &self,
        item_id: &str,
        buyer_id: &str,
        seller_id: &str,
        initial_approved: bool,
        now: DateTime<Utc>,
    ) -> MarketResult<(Chat, bool)> {
        let inserted = sqlx::query_as::<_, ChatRow>(queries::INSERT_CHAT)
            .bind(item_id)
            .bind(buyer_id)
            .bind(seller_id)
            .bind(initial_approved)
            .bind(now)
            .fetch_optional(&*self.pool)
            .await?;
        if let Some(row) = inserted {
            return Ok((row.into(), true));
        }

        let existing = sqlx::query_as::<_, ChatRow>(queries::GET_CHAT_BY_PARTICIPANTS)
            .bind(item_id)
            .bind(buyer_id)
            .bind(seller_id)
            .fetch_one(&*self.pool)
            .await?;
        Ok((existing.into(), false))
    }

    async fn find_by_id(&self, chat_id: i64) -> MarketResult<Option<Chat>> {
        let row = sqlx::query_as::<_, ChatRow>(queries::GET_CHAT)
            .bind(chat_id)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.map(Chat::from))
    }

    async fn find_by_participants(
        &self,
        item_id: &str,
        buyer_id: &str,
        seller_id: &str,
    ) -> MarketResult<Option<Chat>> {
        let row = sqlx::query_as::<_, ChatRow>(queries::GET_CHAT_BY_PARTICIPANTS)
            .bind(item_id)
            .bind(buyer_id)
            .bind(seller_id)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.map(Chat::from))
    }

    async fn set_approved(&self, chat_id: i64, now: DateTime<Utc>) -> MarketResult<Option<Chat>> {
        let row = sqlx::query_as::<_, ChatRow>(queries::APPROVE_CHAT)
            .bind(chat_id)
            .bind(now)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.map(Chat::from))
    }

    async fn list_for_user(&self, user_id: &str, limit: i64) -> MarketResult<Vec<Chat>> {
        let rows = sqlx::query_as::<_, ChatRow>(queries::GET_CHATS_FOR_USER)
            .bind(user_id)
            .bind(limit)
            .fetch_all(&*self.pool)
            .await?;
        Ok(rows.into_iter().map(Chat::from).collect())
    }

    async fn append_message(
        &self,
        chat_id: i64,
        sender_id: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> MarketResult<ChatMessage> {
        // 트랜잭션 시작
        let mut tx = self.pool.begin().await?;

        let touched = sqlx::query(queries::TOUCH_CHAT)
            .bind(chat_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(MarketError::not_found("Chat"));
        }

        let row = sqlx::query_as::<_, MessageRow>(queries::INSERT_CHAT_MESSAGE)
            .bind(chat_id)
            .bind(sender_id)
            .bind(content)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        // 트랜잭션 커밋
        tx.commit().await?;
        Ok(row.into())
    }

    async fn list_messages(&self, chat_id: i64, limit: i64) -> MarketResult<Vec<ChatMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(queries::GET_CHAT_MESSAGES)
            .bind(chat_id)
            .bind(limit)
            .fetch_all(&*self.pool)
            .await?;
        Ok(rows.into_iter().map(ChatMessage::from).collect())
    }

    async fn delete_chat_cascade(&self, chat_id: i64) -> MarketResult<bool> {
        let mut tx = self.pool.begin().await?;

        // 메시지 먼저 삭제
        sqlx::query(queries::DELETE_CHAT_MESSAGES)
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query(queries::DELETE_CHAT)
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(deleted.rows_affected() > 0)
    }
}
// endregion: --- Postgres Chat Store

// region:    --- Postgres User Store
pub struct PostgresUserStore {
    pool: Arc<PgPool>,
}

impl PostgresUserStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn find_by_id(&self, user_id: &str) -> MarketResult<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(queries::GET_USER)
            .bind(user_id)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.map(UserRecord::from))
    }

    async fn increment_timeout_count(
        &self,
        user_id: &str,
        delta: i64,
    ) -> MarketResult<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(queries::INCREMENT_PICKUP_TIMEOUT)
            .bind(user_id)
            .bind(delta)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.map(UserRecord::from))
    }

    async fn set_flagged(&self, user_id: &str) -> MarketResult<bool> {
        let result = sqlx::query(queries::FLAG_PICKUP_TIMEOUT)
            .bind(user_id)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_admins(&self) -> MarketResult<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(queries::GET_ADMIN_IDS)
            .fetch_all(&*self.pool)
            .await?;
        Ok(ids)
    }
}
// endregion: --- Postgres User Store
