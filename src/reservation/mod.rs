/// 예약/승인 라이프사이클 엔진
/// 물품 상태를 확인 후 변경하는 연산은 모두 저장소의 조건부 업데이트 한 번으로 수행한다.
/// 사전 검사는 에러 메시지를 위한 것이고, 실제 판정은 조건부 업데이트의 일치 여부로 한다.
// region:    --- Imports
use crate::clock::Clock;
use crate::config::ReservationPolicy;
use crate::error::{ConflictReason, ForbiddenReason, MarketError, MarketResult};
use crate::marketplace::model::{
    Approval, ApprovalStatus, Item, ItemStatus, NewItem, ReservedReason, Role,
};
use crate::notification::Notifier;
use crate::store::{ItemGuard, ItemTransition, Stores};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

mod carousel;
mod pickup;
mod sweep;

pub use carousel::carousel_days_left;
pub use pickup::{haversine_km, ApprovalView, ItemAccess, PickupOption, PickupQuery};
pub use sweep::{ReconcileReport, SweepReport};

// endregion: --- Imports

// region:    --- Outcomes
/// requestApproval 결과 (created 로 201/200 을 구분)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub approval: Approval,
    #[serde(skip)]
    pub created: bool,
}

/// approveBuyer 결과
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalGrant {
    pub approval: Approval,
    pub chat_id: i64,
}
// endregion: --- Outcomes

// region:    --- Reservation Engine
#[derive(Clone)]
pub struct ReservationEngine {
    stores: Stores,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
    policy: ReservationPolicy,
}

impl ReservationEngine {
    pub fn new(
        stores: Stores,
        notifier: Notifier,
        clock: Arc<dyn Clock>,
        policy: ReservationPolicy,
    ) -> Self {
        Self {
            stores,
            notifier,
            clock,
            policy,
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn policy(&self) -> &ReservationPolicy {
        &self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// 물품 조회 (삭제된 물품도 NotFound)
    pub async fn load_item(&self, item_id: &str) -> MarketResult<Item> {
        self.stores
            .items
            .find_by_id(item_id)
            .await?
            .ok_or_else(|| MarketError::not_found("Item"))
    }

    /// 조건부 업데이트 실패 시 에러에 실을 현재 상태
    async fn current_status(&self, item_id: &str) -> Option<ItemStatus> {
        match self.stores.items.find_by_id(item_id).await {
            Ok(item) => item.map(|item| item.effective_status()),
            Err(_) => None,
        }
    }

    async fn lost_race(&self, item_id: &str, message: &str) -> MarketError {
        warn!("{:<12} --> 조건부 업데이트 불일치 (id: {}): {}", "Engine", item_id, message);
        MarketError::conflict(
            ConflictReason::LostRace,
            self.current_status(item_id).await,
            message,
        )
    }

    /// 물품 등록
    pub async fn create_item(&self, owner_id: &str, new_item: NewItem) -> MarketResult<Item> {
        if new_item.name.trim().is_empty() {
            return Err(MarketError::InvalidInput("name is required".to_string()));
        }
        if !new_item.price.is_finite() || new_item.price < 0.0 {
            return Err(MarketError::InvalidInput(
                "price must be a non-negative number".to_string(),
            ));
        }

        let item = self
            .stores
            .items
            .insert(new_item, owner_id, self.clock.now())
            .await?;
        info!("{:<12} --> 물품 등록 id: {}, owner: {}", "Engine", item.id, owner_id);
        Ok(item)
    }

    /// 일반 예약 (무료 물품, 10시간)
    pub async fn reserve(&self, item_id: &str, buyer_id: &str) -> MarketResult<Item> {
        self.sweep_quietly().await;
        let item = self.load_item(item_id).await?;

        match item.effective_status() {
            ItemStatus::Available => {}
            ItemStatus::Sold => {
                return Err(MarketError::conflict(
                    ConflictReason::AlreadySold,
                    Some(ItemStatus::Sold),
                    "Item is already sold",
                ))
            }
            ItemStatus::Reserved if item.is_reserved_by(buyer_id) => {
                return Err(MarketError::conflict(
                    ConflictReason::NotAvailable,
                    Some(ItemStatus::Reserved),
                    "Item is already reserved by you",
                ))
            }
            ItemStatus::Reserved => {
                return Err(MarketError::conflict(
                    ConflictReason::ReservedByOtherBuyer,
                    Some(ItemStatus::Reserved),
                    "Item is not available for reservation",
                ))
            }
        }

        let transition = ItemTransition::Reserve {
            buyer_id: buyer_id.to_string(),
            until: self.clock.now() + self.policy.plain_hold,
            reason: None,
            approved_at: None,
        };
        match self
            .stores
            .items
            .conditional_update_status(item_id, &ItemGuard::Available, &transition)
            .await?
        {
            Some(item) => {
                info!("{:<12} --> 예약 완료 id: {}, buyer: {}", "Engine", item_id, buyer_id);
                Ok(item)
            }
            None => Err(self.lost_race(item_id, "Item could not be reserved").await),
        }
    }

    /// 예약 취소 (예약자 본인만)
    pub async fn cancel_reservation(&self, item_id: &str, user_id: &str) -> MarketResult<Item> {
        let item = self.load_item(item_id).await?;
        let status = item.effective_status();

        if status != ItemStatus::Reserved {
            return Err(MarketError::InvalidState {
                message: format!("Item is not reserved. Current status: {}", status.as_str()),
                current_status: status,
            });
        }
        if !item.is_reserved_by(user_id) {
            return Err(MarketError::forbidden(
                ForbiddenReason::NotReserver,
                "You did not reserve this item",
            ));
        }

        match self
            .stores
            .items
            .conditional_update_status(
                item_id,
                &ItemGuard::ReservedBy(user_id.to_string()),
                &ItemTransition::Release,
            )
            .await?
        {
            Some(item) => {
                info!("{:<12} --> 예약 취소 id: {}, buyer: {}", "Engine", item_id, user_id);
                Ok(item)
            }
            None => Err(self.lost_race(item_id, "Reservation could not be cancelled").await),
        }
    }

    /// 픽업 승인 요청 (멱등)
    pub async fn request_approval(
        &self,
        item_id: &str,
        buyer_id: &str,
    ) -> MarketResult<ApprovalRequest> {
        let item = self.load_item(item_id).await?;
        let seller_id = item
            .owner_id
            .clone()
            .ok_or_else(|| MarketError::InvalidInput("Item has no owner".to_string()))?;
        if seller_id == buyer_id {
            return Err(MarketError::InvalidInput(
                "You cannot request approval for your own item".to_string(),
            ));
        }

        let (approval, created) = self
            .stores
            .approvals
            .find_or_create(item_id, buyer_id, &seller_id, self.clock.now())
            .await?;

        if created {
            info!(
                "{:<12} --> 승인 요청 생성 id: {}, item: {}, buyer: {}",
                "Engine", approval.id, item_id, buyer_id
            );
            self.notifier
                .pickup_approval_request(&item, &seller_id, buyer_id)
                .await;
        }

        Ok(ApprovalRequest { approval, created })
    }

    /// 판매자의 구매자 승인
    /// 승인 -> 채팅 -> 물품 예약 순으로 기록한다. 마지막 단계가 실패하면 Conflict 를 돌려주고,
    /// 앞선 기록은 reconcile_approvals 가 정리한다.
    pub async fn approve_buyer(
        &self,
        item_id: &str,
        seller_id: &str,
        buyer_id: &str,
    ) -> MarketResult<ApprovalGrant> {
        let buyer_id = buyer_id.trim();
        if buyer_id.is_empty() {
            return Err(MarketError::InvalidInput("buyerId is required".to_string()));
        }

        let item = self.load_item(item_id).await?;
        if !item.is_owned_by(seller_id) {
            return Err(MarketError::forbidden(
                ForbiddenReason::NotOwner,
                "Only the owner can approve buyers",
            ));
        }
        if buyer_id == seller_id {
            return Err(MarketError::InvalidInput(
                "You cannot approve yourself as a buyer".to_string(),
            ));
        }
        match item.effective_status() {
            ItemStatus::Sold => {
                return Err(MarketError::conflict(
                    ConflictReason::AlreadySold,
                    Some(ItemStatus::Sold),
                    "Item is already sold",
                ))
            }
            ItemStatus::Reserved if !item.is_reserved_by(buyer_id) => {
                return Err(MarketError::conflict(
                    ConflictReason::ReservedByOtherBuyer,
                    Some(ItemStatus::Reserved),
                    "Item is currently reserved for another buyer",
                ))
            }
            _ => {}
        }

        let now = self.clock.now();

        // 1. 승인 기록
        let mut approval = self
            .stores
            .approvals
            .upsert_status(item_id, buyer_id, seller_id, ApprovalStatus::Approved, now)
            .await?;

        // 2. 채팅방 승인
        let (mut chat, created) = self
            .stores
            .chats
            .find_or_create(item_id, buyer_id, seller_id, true, now)
            .await?;
        if !created && !chat.is_approved {
            if let Some(approved) = self.stores.chats.set_approved(chat.id, now).await? {
                chat = approved;
            }
        }

        // 3. 물품 예약 (24시간)
        let placed = self
            .place_pickup_hold(item_id, buyer_id, now + self.policy.pickup_hold, now)
            .await?;
        if placed.is_none() {
            return Err(self
                .lost_race(item_id, "Item is not available for pickup approval")
                .await);
        }

        if self.stores.approvals.mark_hold_placed(approval.id, now).await? {
            approval.hold_placed_at = Some(now);
        }
        info!(
            "{:<12} --> 구매자 승인 item: {}, buyer: {}, chat: {}",
            "Engine", item_id, buyer_id, chat.id
        );

        Ok(ApprovalGrant {
            approval,
            chat_id: chat.id,
        })
    }

    /// 픽업 승인 예약 (available 이거나 같은 구매자가 예약 중일 때만)
    async fn place_pickup_hold(
        &self,
        item_id: &str,
        buyer_id: &str,
        until: DateTime<Utc>,
        approved_at: DateTime<Utc>,
    ) -> MarketResult<Option<Item>> {
        let transition = ItemTransition::Reserve {
            buyer_id: buyer_id.to_string(),
            until,
            reason: Some(ReservedReason::PickupApproval),
            approved_at: Some(approved_at),
        };
        self.stores
            .items
            .conditional_update_status(
                item_id,
                &ItemGuard::AvailableOrReservedBy(buyer_id.to_string()),
                &transition,
            )
            .await
    }

    /// 결제 완료 후 판매 확정
    pub async fn complete_purchase(&self, item_id: &str, buyer_id: &str) -> MarketResult<Item> {
        let item = self.load_item(item_id).await?;
        if item.is_owned_by(buyer_id) {
            return Err(MarketError::InvalidInput(
                "You cannot purchase your own item".to_string(),
            ));
        }
        match item.effective_status() {
            ItemStatus::Sold => {
                return Err(MarketError::conflict(
                    ConflictReason::AlreadySold,
                    Some(ItemStatus::Sold),
                    "Item is already sold",
                ))
            }
            ItemStatus::Reserved if !item.is_reserved_by(buyer_id) => {
                return Err(MarketError::conflict(
                    ConflictReason::ReservedByOtherBuyer,
                    Some(ItemStatus::Reserved),
                    "Item is reserved by another buyer",
                ))
            }
            _ => {}
        }

        let transition = ItemTransition::Sell {
            buyer_id: buyer_id.to_string(),
            at: self.clock.now(),
        };
        let sold = match self
            .stores
            .items
            .conditional_update_status(
                item_id,
                &ItemGuard::AvailableOrReservedBy(buyer_id.to_string()),
                &transition,
            )
            .await?
        {
            Some(sold) => sold,
            None => return Err(self.lost_race(item_id, "Item could not be purchased").await),
        };

        info!("{:<12} --> 판매 완료 id: {}, buyer: {}", "Engine", item_id, buyer_id);
        if let Some(seller_id) = sold.owner_id.as_deref() {
            self.notifier.item_sold(&sold, seller_id, buyer_id).await;
        }
        Ok(sold)
    }

    /// 물품 삭제 (소유자 또는 관리자)
    pub async fn delete_item(&self, item_id: &str, user_id: &str, role: Role) -> MarketResult<()> {
        let item = self.load_item(item_id).await?;
        if !item.is_owned_by(user_id) && role != Role::Admin {
            return Err(MarketError::forbidden(
                ForbiddenReason::NotOwner,
                "You do not have permission to delete this item",
            ));
        }

        if !self.stores.items.soft_delete(item_id, self.clock.now()).await? {
            return Err(MarketError::not_found("Item"));
        }
        info!("{:<12} --> 물품 삭제 id: {}, by: {}", "Engine", item_id, user_id);
        Ok(())
    }
}
// endregion: --- Reservation Engine
