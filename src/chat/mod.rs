/// 채팅 접근 제어
/// 참여자(구매자/판매자)이고 승인된 채팅방에서만 메시지를 쓰고 실시간 구독할 수 있다.
/// 미승인 채팅방의 메시지 조회는 구매자만 막힌다 (판매자 조회는 허용).
// region:    --- Imports
use crate::clock::Clock;
use crate::config::ReservationPolicy;
use crate::error::{ForbiddenReason, MarketError, MarketResult};
use crate::marketplace::model::{Chat, ChatMessage, Role};
use crate::store::Stores;
use std::sync::Arc;
use tracing::info;

mod hub;

pub use hub::ChatHub;

// endregion: --- Imports

// region:    --- Chat Gate
#[derive(Clone)]
pub struct ChatGate {
    stores: Stores,
    hub: ChatHub,
    clock: Arc<dyn Clock>,
    policy: ReservationPolicy,
}

impl ChatGate {
    pub fn new(stores: Stores, hub: ChatHub, clock: Arc<dyn Clock>, policy: ReservationPolicy) -> Self {
        Self {
            stores,
            hub,
            clock,
            policy,
        }
    }

    pub fn hub(&self) -> &ChatHub {
        &self.hub
    }

    pub async fn load_chat(&self, chat_id: i64) -> MarketResult<Chat> {
        self.stores
            .chats
            .find_by_id(chat_id)
            .await?
            .ok_or_else(|| MarketError::not_found("Chat"))
    }

    fn ensure_participant(chat: &Chat, user_id: &str, message: &str) -> MarketResult<()> {
        if chat.is_participant(user_id) {
            Ok(())
        } else {
            Err(MarketError::forbidden(ForbiddenReason::NotParticipant, message))
        }
    }

    fn ensure_approved(chat: &Chat) -> MarketResult<()> {
        if chat.is_approved {
            Ok(())
        } else {
            Err(MarketError::forbidden(
                ForbiddenReason::ChatNotApproved,
                "Chat not yet approved",
            ))
        }
    }

    /// 구매자가 채팅방 열기 (미승인 상태로 생성). 생성 여부를 함께 반환
    pub async fn open_chat(&self, item_id: &str, buyer_id: &str) -> MarketResult<(Chat, bool)> {
        let item = self
            .stores
            .items
            .find_by_id(item_id)
            .await?
            .ok_or_else(|| MarketError::not_found("Item"))?;
        let seller_id = item.owner_id.as_deref().ok_or_else(|| {
            MarketError::InvalidInput("Item does not have an owner assigned".to_string())
        })?;
        if seller_id == buyer_id {
            return Err(MarketError::InvalidInput(
                "Cannot open chat on your own item".to_string(),
            ));
        }

        let (chat, created) = self
            .stores
            .chats
            .find_or_create(item_id, buyer_id, seller_id, false, self.clock.now())
            .await?;
        if created {
            info!("{:<12} --> 채팅방 생성 id: {}, item: {}", "Chat", chat.id, item_id);
        }
        Ok((chat, created))
    }

    /// 내 채팅방 목록 (최근 갱신 순)
    pub async fn list_chats(&self, user_id: &str) -> MarketResult<Vec<Chat>> {
        self.stores
            .chats
            .list_for_user(user_id, self.policy.chat_list_limit)
            .await
    }

    /// 채팅방 승인 (판매자 또는 관리자)
    pub async fn approve_chat(&self, chat_id: i64, user_id: &str, role: Role) -> MarketResult<Chat> {
        let chat = self.load_chat(chat_id).await?;
        if chat.seller_id != user_id && role != Role::Admin {
            return Err(MarketError::forbidden(
                ForbiddenReason::NotOwner,
                "Only seller or admin can approve chat",
            ));
        }

        let chat = self
            .stores
            .chats
            .set_approved(chat_id, self.clock.now())
            .await?
            .ok_or_else(|| MarketError::not_found("Chat"))?;
        info!("{:<12} --> 채팅방 승인 id: {}, by: {}", "Chat", chat_id, user_id);
        Ok(chat)
    }

    /// 메시지 조회 (작성 순)
    pub async fn list_messages(&self, chat_id: i64, user_id: &str) -> MarketResult<Vec<ChatMessage>> {
        let chat = self.load_chat(chat_id).await?;
        Self::ensure_participant(&chat, user_id, "Not allowed to view this chat")?;
        if chat.buyer_id == user_id {
            Self::ensure_approved(&chat)?;
        }

        self.stores
            .chats
            .list_messages(chat_id, self.policy.message_page_limit)
            .await
    }

    /// 메시지 작성 후 구독자에게 전달
    pub async fn post_message(
        &self,
        chat_id: i64,
        user_id: &str,
        content: &str,
    ) -> MarketResult<ChatMessage> {
        let content = content.trim();
        if content.is_empty() {
            return Err(MarketError::InvalidInput(
                "Message content is required".to_string(),
            ));
        }

        let chat = self.load_chat(chat_id).await?;
        Self::ensure_participant(&chat, user_id, "Not allowed to post in this chat")?;
        Self::ensure_approved(&chat)?;

        let message = self
            .stores
            .chats
            .append_message(chat_id, user_id, content, self.clock.now())
            .await?;
        self.hub.publish(&message);
        Ok(message)
    }

    /// 채팅방 삭제 (참여자 또는 관리자, 메시지 먼저 삭제)
    pub async fn delete_chat(&self, chat_id: i64, user_id: &str, role: Role) -> MarketResult<()> {
        let chat = self.load_chat(chat_id).await?;
        if !chat.is_participant(user_id) && role != Role::Admin {
            return Err(MarketError::forbidden(
                ForbiddenReason::NotParticipant,
                "Not allowed to delete this chat",
            ));
        }

        if !self.stores.chats.delete_chat_cascade(chat_id).await? {
            return Err(MarketError::not_found("Chat"));
        }
        self.hub.close(chat_id);
        info!("{:<12} --> 채팅방 삭제 id: {}, by: {}", "Chat", chat_id, user_id);
        Ok(())
    }

    /// 실시간 구독 권한 확인 (참여자이고 승인된 채팅방)
    pub async fn authorize_join(&self, chat_id: i64, user_id: &str) -> MarketResult<Chat> {
        let chat = self.load_chat(chat_id).await?;
        Self::ensure_participant(&chat, user_id, "Not authorized for this chat")?;
        Self::ensure_approved(&chat)?;
        Ok(chat)
    }
}
// endregion: --- Chat Gate
