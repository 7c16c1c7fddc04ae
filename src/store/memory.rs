/// 메모리 저장소
/// 단일 프로세스 개발/테스트용. 각 연산은 잠금 안에서 검사와 변경을 함께 수행하므로
/// Postgres 구현의 조건부 업데이트와 같은 원자성을 가진다.
// region:    --- Imports
use super::{clear_reservation, ApprovalStore, ChatStore, ItemFilter, ItemGuard, ItemStore, ItemTransition, UserStore};
use crate::error::{MarketError, MarketResult};
use crate::marketplace::model::{
    clean_pickup_locations, Approval, ApprovalStatus, Chat, ChatMessage, ExpiredHold, Item,
    ItemStatus, NewItem, Role, UserRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

// endregion: --- Imports

fn lock<T>(mutex: &Mutex<T>) -> MarketResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| MarketError::Unavailable("memory store lock poisoned".to_string()))
}

// region:    --- Memory Item Store
struct StoredItem {
    item: Item,
    deleted: bool,
}

#[derive(Default)]
pub struct MemoryItemStore {
    items: Mutex<Vec<StoredItem>>,
    max_pickup_locations: usize,
}

impl MemoryItemStore {
    pub fn new(max_pickup_locations: usize) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            max_pickup_locations,
        }
    }

    /// 가공 없이 물품을 넣는다 (레거시 데이터 재현용)
    pub fn insert_raw(&self, item: Item) -> MarketResult<()> {
        lock(&self.items)?.push(StoredItem {
            item,
            deleted: false,
        });
        Ok(())
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn insert(&self, new_item: NewItem, owner_id: &str, now: DateTime<Utc>) -> MarketResult<Item> {
        let mut items = lock(&self.items)?;
        let next_id = items
            .iter()
            .filter_map(|stored| stored.item.id.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            + 1;

        let item = Item {
            id: next_id.to_string(),
            name: new_item.name,
            category: new_item.category,
            condition: new_item.condition,
            description: new_item.description,
            price: new_item.price.max(0.0),
            city: new_item.city,
            area: new_item.area,
            pickup_locations: clean_pickup_locations(&new_item.pickup_locations, self.max_pickup_locations),
            owner_id: Some(owner_id.to_string()),
            status: Some(ItemStatus::Available),
            reserved_by_user_id: None,
            reserved_until: None,
            reserved_reason: None,
            pickup_approved_at: None,
            carousel_exit_notified: false,
            sold_to: None,
            sold_at: None,
            date_added: now,
        };
        items.push(StoredItem {
            item: item.clone(),
            deleted: false,
        });
        Ok(item)
    }

    async fn find_by_id(&self, id: &str) -> MarketResult<Option<Item>> {
        let items = lock(&self.items)?;
        Ok(items
            .iter()
            .find(|stored| !stored.deleted && stored.item.id == id)
            .map(|stored| stored.item.clone()))
    }

    async fn find_many(&self, filter: &ItemFilter) -> MarketResult<Vec<Item>> {
        let items = lock(&self.items)?;
        let mut found: Vec<Item> = items
            .iter()
            .filter(|stored| !stored.deleted && filter.matches(&stored.item))
            .map(|stored| stored.item.clone())
            .collect();
        if filter.newest_first {
            // 같은 시각이면 나중에 등록된 물품이 먼저
            found.reverse();
            found.sort_by(|a, b| b.date_added.cmp(&a.date_added));
        }
        if let Some(limit) = filter.limit {
            found.truncate(limit.max(0) as usize);
        }
        Ok(found)
    }

    async fn conditional_update_status(
        &self,
        id: &str,
        guard: &ItemGuard,
        transition: &ItemTransition,
    ) -> MarketResult<Option<Item>> {
        let mut items = lock(&self.items)?;
        let Some(stored) = items
            .iter_mut()
            .find(|stored| !stored.deleted && stored.item.id == id)
        else {
            return Ok(None);
        };
        if !guard.matches(&stored.item) {
            return Ok(None);
        }
        transition.apply(&mut stored.item);
        Ok(Some(stored.item.clone()))
    }

    async fn bulk_clear_expired(&self, now: DateTime<Utc>) -> MarketResult<Vec<ExpiredHold>> {
        let mut items = lock(&self.items)?;
        let mut released = Vec::new();
        for stored in items.iter_mut().filter(|stored| !stored.deleted) {
            let item = &mut stored.item;
            let expired = item.status == Some(ItemStatus::Reserved)
                && item.reserved_until.map_or(false, |until| until < now);
            if !expired {
                continue;
            }
            released.push(ExpiredHold {
                item_id: item.id.clone(),
                buyer_id: item.reserved_by_user_id.clone(),
                reason: item.reserved_reason,
            });
            item.status = Some(ItemStatus::Available);
            clear_reservation(item);
        }
        Ok(released)
    }

    async fn normalize_missing_status(&self) -> MarketResult<u64> {
        let mut items = lock(&self.items)?;
        let mut repaired = 0;
        for stored in items.iter_mut().filter(|stored| stored.item.status.is_none()) {
            stored.item.status = Some(ItemStatus::Available);
            clear_reservation(&mut stored.item);
            repaired += 1;
        }
        Ok(repaired)
    }

    async fn find_carousel_exit_candidates(
        &self,
        added_after: DateTime<Utc>,
        added_up_to: DateTime<Utc>,
    ) -> MarketResult<Vec<Item>> {
        let items = lock(&self.items)?;
        Ok(items
            .iter()
            .filter(|stored| {
                let item = &stored.item;
                !stored.deleted
                    && !item.carousel_exit_notified
                    && item.owner_id.is_some()
                    && item.date_added > added_after
                    && item.date_added <= added_up_to
            })
            .map(|stored| stored.item.clone())
            .collect())
    }

    async fn mark_carousel_exit_notified(&self, id: &str, _at: DateTime<Utc>) -> MarketResult<bool> {
        let mut items = lock(&self.items)?;
        match items
            .iter_mut()
            .find(|stored| stored.item.id == id && !stored.item.carousel_exit_notified)
        {
            Some(stored) => {
                stored.item.carousel_exit_notified = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn soft_delete(&self, id: &str, _at: DateTime<Utc>) -> MarketResult<bool> {
        let mut items = lock(&self.items)?;
        match items
            .iter_mut()
            .find(|stored| !stored.deleted && stored.item.id == id)
        {
            Some(stored) => {
                stored.deleted = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
// endregion: --- Memory Item Store

// region:    --- Memory Approval Store
#[derive(Default)]
struct ApprovalTable {
    rows: Vec<Approval>,
    next_id: i64,
}

#[derive(Default)]
pub struct MemoryApprovalStore {
    table: Mutex<ApprovalTable>,
}

impl MemoryApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 전체 요청 수 (테스트용)
    pub fn count(&self) -> MarketResult<usize> {
        Ok(lock(&self.table)?.rows.len())
    }
}

fn same_triple(approval: &Approval, item_id: &str, buyer_id: &str, seller_id: &str) -> bool {
    approval.item_id == item_id && approval.buyer_id == buyer_id && approval.seller_id == seller_id
}

#[async_trait]
impl ApprovalStore for MemoryApprovalStore {
    async fn find_or_create(
        &self,
        item_id: &str,
        buyer_id: &str,
        seller_id: &str,
        now: DateTime<Utc>,
    ) -> MarketResult<(Approval, bool)> {
        let mut table = lock(&self.table)?;
        if let Some(existing) = table
            .rows
            .iter()
            .find(|a| same_triple(a, item_id, buyer_id, seller_id))
        {
            return Ok((existing.clone(), false));
        }
        table.next_id += 1;
        let approval = Approval {
            id: table.next_id,
            item_id: item_id.to_string(),
            buyer_id: buyer_id.to_string(),
            seller_id: seller_id.to_string(),
            status: ApprovalStatus::Pending,
            created_at: now,
            updated_at: now,
            hold_placed_at: None,
        };
        table.rows.push(approval.clone());
        Ok((approval, true))
    }

    async fn upsert_status(
        &self,
        item_id: &str,
        buyer_id: &str,
        seller_id: &str,
        status: ApprovalStatus,
        now: DateTime<Utc>,
    ) -> MarketResult<Approval> {
        let mut table = lock(&self.table)?;
        if let Some(existing) = table
            .rows
            .iter_mut()
            .find(|a| same_triple(a, item_id, buyer_id, seller_id))
        {
            existing.status = status;
            existing.updated_at = now;
            existing.hold_placed_at = None;
            return Ok(existing.clone());
        }
        table.next_id += 1;
        let approval = Approval {
            id: table.next_id,
            item_id: item_id.to_string(),
            buyer_id: buyer_id.to_string(),
            seller_id: seller_id.to_string(),
            status,
            created_at: now,
            updated_at: now,
            hold_placed_at: None,
        };
        table.rows.push(approval.clone());
        Ok(approval)
    }

    async fn list_by_seller(&self, item_id: &str, seller_id: &str) -> MarketResult<Vec<Approval>> {
        let table = lock(&self.table)?;
        Ok(table
            .rows
            .iter()
            .filter(|a| a.item_id == item_id && a.seller_id == seller_id)
            .cloned()
            .collect())
    }

    async fn find_by_buyer(&self, item_id: &str, buyer_id: &str) -> MarketResult<Option<Approval>> {
        let table = lock(&self.table)?;
        Ok(table
            .rows
            .iter()
            .find(|a| a.item_id == item_id && a.buyer_id == buyer_id)
            .cloned())
    }

    async fn mark_hold_placed(&self, approval_id: i64, at: DateTime<Utc>) -> MarketResult<bool> {
        let mut table = lock(&self.table)?;
        match table
            .rows
            .iter_mut()
            .find(|a| a.id == approval_id && a.status == ApprovalStatus::Approved)
        {
            Some(approval) => {
                approval.hold_placed_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_unconfirmed(&self, before: DateTime<Utc>) -> MarketResult<Vec<Approval>> {
        let table = lock(&self.table)?;
        Ok(table
            .rows
            .iter()
            .filter(|a| {
                a.status == ApprovalStatus::Approved
                    && a.hold_placed_at.is_none()
                    && a.updated_at <= before
            })
            .cloned()
            .collect())
    }

    async fn revert_unconfirmed(&self, approval_id: i64, now: DateTime<Utc>) -> MarketResult<bool> {
        let mut table = lock(&self.table)?;
        match table.rows.iter_mut().find(|a| {
            a.id == approval_id && a.status == ApprovalStatus::Approved && a.hold_placed_at.is_none()
        }) {
            Some(approval) => {
                approval.status = ApprovalStatus::Pending;
                approval.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
// endregion: --- Memory Approval Store

// region:    --- Memory Chat Store
#[derive(Default)]
struct ChatTables {
    chats: Vec<Chat>,
    messages: Vec<ChatMessage>,
    next_chat_id: i64,
    next_message_id: i64,
}

#[derive(Default)]
pub struct MemoryChatStore {
    tables: Mutex<ChatTables>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 특정 채팅방의 메시지 수 (테스트용)
    pub fn message_count(&self, chat_id: i64) -> MarketResult<usize> {
        Ok(lock(&self.tables)?
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .count())
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn find_or_create(
        &self,
        item_id: &str,
        buyer_id: &str,
        seller_id: &str,
        initial_approved: bool,
        now: DateTime<Utc>,
    ) -> MarketResult<(Chat, bool)> {
        let mut tables = lock(&self.tables)?;
        if let Some(existing) = tables
            .chats
            .iter()
            .find(|c| c.item_id == item_id && c.buyer_id == buyer_id && c.seller_id == seller_id)
        {
            return Ok((existing.clone(), false));
        }
        tables.next_chat_id += 1;
        let chat = Chat {
            id: tables.next_chat_id,
            item_id: item_id.to_string(),
            buyer_id: buyer_id.to_string(),
            seller_id: seller_id.to_string(),
            is_approved: initial_approved,
            created_at: now,
            updated_at: now,
        };
        tables.chats.push(chat.clone());
        Ok((chat, true))
    }

    async fn find_by_id(&self, chat_id: i64) -> MarketResult<Option<Chat>> {
        let tables = lock(&self.tables)?;
        Ok(tables.chats.iter().find(|c| c.id == chat_id).cloned())
    }

    async fn find_by_participants(
        &self,
        item_id: &str,
        buyer_id: &str,
        seller_id: &str,
    ) -> MarketResult<Option<Chat>> {
        let tables = lock(&self.tables)?;
        Ok(tables
            .chats
            .iter()
            .find(|c| c.item_id == item_id && c.buyer_id == buyer_id && c.seller_id == seller_id)
            .cloned())
    }

    async fn set_approved(&self, chat_id: i64, now: DateTime<Utc>) -> MarketResult<Option<Chat>> {
        let mut tables = lock(&self.tables)?;
        Ok(tables.chats.iter_mut().find(|c| c.id == chat_id).map(|chat| {
            chat.is_approved = true;
            chat.updated_at = now;
            chat.clone()
        }))
    }

    async fn list_for_user(&self, user_id: &str, limit: i64) -> MarketResult<Vec<Chat>> {
        let tables = lock(&self.tables)?;
        let mut chats: Vec<Chat> = tables
            .chats
            .iter()
            .filter(|c| c.is_participant(user_id))
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        chats.truncate(limit.max(0) as usize);
        Ok(chats)
    }

    async fn append_message(
        &self,
        chat_id: i64,
        sender_id: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> MarketResult<ChatMessage> {
        let mut tables = lock(&self.tables)?;
        let Some(chat) = tables.chats.iter_mut().find(|c| c.id == chat_id) else {
            return Err(MarketError::not_found("Chat"));
        };
        chat.updated_at = now;
        tables.next_message_id += 1;
        let message = ChatMessage {
            id: tables.next_message_id,
            chat_id,
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            created_at: now,
        };
        tables.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, chat_id: i64, limit: i64) -> MarketResult<Vec<ChatMessage>> {
        let tables = lock(&self.tables)?;
        let mut messages: Vec<ChatMessage> = tables
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        messages.truncate(limit.max(0) as usize);
        Ok(messages)
    }

    async fn delete_chat_cascade(&self, chat_id: i64) -> MarketResult<bool> {
        let mut tables = lock(&self.tables)?;
        tables.messages.retain(|m| m.chat_id != chat_id);
        let before = tables.chats.len();
        tables.chats.retain(|c| c.id != chat_id);
        Ok(tables.chats.len() < before)
    }
}
// endregion: --- Memory Chat Store

// region:    --- Memory User Store
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: UserRecord) -> MarketResult<()> {
        lock(&self.users)?.insert(user.id.clone(), user);
        Ok(())
    }

    /// 간단한 사용자 생성 헬퍼
    pub fn add(&self, id: &str, role: Role) -> MarketResult<()> {
        self.insert_user(UserRecord {
            id: id.to_string(),
            email: Some(format!("{}@example.com", id)),
            first_name: None,
            last_name: None,
            role,
            pickup_timeout_count: 0,
            pickup_timeout_flagged: false,
        })
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, user_id: &str) -> MarketResult<Option<UserRecord>> {
        Ok(lock(&self.users)?.get(user_id).cloned())
    }

    async fn increment_timeout_count(
        &self,
        user_id: &str,
        delta: i64,
    ) -> MarketResult<Option<UserRecord>> {
        let mut users = lock(&self.users)?;
        Ok(users.get_mut(user_id).map(|user| {
            user.pickup_timeout_count += delta;
            user.clone()
        }))
    }

    async fn set_flagged(&self, user_id: &str) -> MarketResult<bool> {
        let mut users = lock(&self.users)?;
        match users.get_mut(user_id) {
            Some(user) if !user.pickup_timeout_flagged => {
                user.pickup_timeout_flagged = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_admins(&self) -> MarketResult<Vec<String>> {
        let users = lock(&self.users)?;
        let mut admins: Vec<String> = users
            .values()
            .filter(|u| u.role == Role::Admin)
            .map(|u| u.id.clone())
            .collect();
        admins.sort();
        Ok(admins)
    }
}
// endregion: --- Memory User Store
