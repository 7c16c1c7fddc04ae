mod common;

use async_trait::async_trait;
use chrono::Duration;
use common::Harness;
use secondhand_market::error::{ConflictReason, ForbiddenReason, MarketError, MarketResult};
use secondhand_market::marketplace::model::{
    ApprovalStatus, Item, ItemStatus, ReservedReason, Role, UserRecord,
};
use secondhand_market::notification::{Notification, NotificationKind, NotificationSink};
use secondhand_market::query::handlers as query;
use secondhand_market::reservation::PickupQuery;
use secondhand_market::store::UserStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration as StdDuration;

fn assert_conflict(err: MarketError, want: ConflictReason, status: Option<ItemStatus>) {
    match err {
        MarketError::Conflict {
            reason,
            current_status,
            ..
        } => {
            assert_eq!(reason, want);
            assert_eq!(current_status, status);
        }
        other => panic!("Conflict 가 아닌 에러: {:?}", other),
    }
}

fn assert_forbidden(err: MarketError, want: ForbiddenReason) {
    match err {
        MarketError::Forbidden { reason, .. } => assert_eq!(reason, want),
        other => panic!("Forbidden 이 아닌 에러: {:?}", other),
    }
}

// region:    --- Plain Reservation
/// 무료 물품 예약 후 다른 구매자는 충돌
#[tokio::test]
async fn test_reserve_free_item_then_other_buyer_conflicts() {
    let h = Harness::new();
    let item = h.list_item("seller", "Free chair", 0.0).await;
    assert_eq!(item.status, Some(ItemStatus::Available));

    let reserved = h.engine.reserve(&item.id, "buyer-b").await.expect("예약 실패");
    assert_eq!(reserved.status, Some(ItemStatus::Reserved));
    assert_eq!(reserved.reserved_by_user_id.as_deref(), Some("buyer-b"));
    assert_eq!(reserved.reserved_until, Some(h.engine.now() + Duration::hours(10)));
    assert_eq!(reserved.reserved_reason, None);

    let err = h.engine.reserve(&item.id, "buyer-c").await.unwrap_err();
    assert_conflict(err, ConflictReason::ReservedByOtherBuyer, Some(ItemStatus::Reserved));

    // 본인 재예약도 충돌
    let err = h.engine.reserve(&item.id, "buyer-b").await.unwrap_err();
    assert_conflict(err, ConflictReason::NotAvailable, Some(ItemStatus::Reserved));

    let err = h.engine.reserve("999", "buyer-b").await.unwrap_err();
    assert!(matches!(err, MarketError::NotFound(_)));

    h.assert_reservation_invariant().await;
}

/// 동시 예약은 정확히 하나만 성공
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reserves_have_single_winner() {
    let h = Harness::new();

    for round in 0..20 {
        let item = h.list_item("seller", &format!("Lamp {}", round), 0.0).await;

        let first = {
            let engine = h.engine.clone();
            let id = item.id.clone();
            tokio::spawn(async move { engine.reserve(&id, "buyer-b").await })
        };
        let second = {
            let engine = h.engine.clone();
            let id = item.id.clone();
            tokio::spawn(async move { engine.reserve(&id, "buyer-c").await })
        };

        let results = vec![first.await.unwrap(), second.await.unwrap()];
        let winners: Vec<&Item> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1, "round {}: 승자는 하나여야 함", round);

        for result in &results {
            if let Err(err) = result {
                assert!(matches!(err, MarketError::Conflict { .. }), "{:?}", err);
            }
        }

        let stored = h.item(&item.id).await;
        assert_eq!(stored.reserved_by_user_id, winners[0].reserved_by_user_id);
    }

    h.assert_reservation_invariant().await;
}

/// 예약 취소 규칙
#[tokio::test]
async fn test_cancel_reservation_rules() {
    let h = Harness::new();
    let item = h.list_item("seller", "Bookshelf", 0.0).await;

    let err = h.engine.cancel_reservation(&item.id, "buyer-b").await.unwrap_err();
    match err {
        MarketError::InvalidState { current_status, message } => {
            assert_eq!(current_status, ItemStatus::Available);
            assert!(message.contains("available"));
        }
        other => panic!("InvalidState 가 아닌 에러: {:?}", other),
    }

    h.engine.reserve(&item.id, "buyer-b").await.unwrap();

    let err = h.engine.cancel_reservation(&item.id, "buyer-c").await.unwrap_err();
    assert_forbidden(err, ForbiddenReason::NotReserver);

    let released = h.engine.cancel_reservation(&item.id, "buyer-b").await.unwrap();
    assert_eq!(released.status, Some(ItemStatus::Available));
    assert!(released.reserved_by_user_id.is_none());
    assert!(released.reserved_until.is_none());

    // 취소 후 다른 구매자가 예약 가능
    h.engine.reserve(&item.id, "buyer-c").await.unwrap();
    h.assert_reservation_invariant().await;
}
// endregion: --- Plain Reservation

// region:    --- Pickup Approval
/// 승인 요청은 멱등이고 판매자에게 한 번만 알린다
#[tokio::test]
async fn test_request_approval_is_idempotent() {
    let h = Harness::new();
    let item = h.list_item("seller", "Desk", 50.0).await;

    let first = h.engine.request_approval(&item.id, "buyer-b").await.unwrap();
    assert!(first.created);
    assert_eq!(first.approval.status, ApprovalStatus::Pending);
    assert_eq!(first.approval.seller_id, "seller");

    let second = h.engine.request_approval(&item.id, "buyer-b").await.unwrap();
    assert!(!second.created);
    assert_eq!(second.approval.id, first.approval.id);
    assert_eq!(h.approvals.count().unwrap(), 1);

    let sent = h.sent_of(NotificationKind::PickupApprovalRequest).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipients, vec!["seller".to_string()]);

    let err = h.engine.request_approval(&item.id, "seller").await.unwrap_err();
    assert!(matches!(err, MarketError::InvalidInput(_)));
}

/// 승인 -> 채팅방 승인 -> 24시간 예약
#[tokio::test]
async fn test_approve_buyer_places_pickup_hold() {
    let h = Harness::new();
    let item = h.list_item("seller", "Desk", 50.0).await;
    h.engine.request_approval(&item.id, "buyer-b").await.unwrap();

    let grant = h
        .engine
        .approve_buyer(&item.id, "seller", "buyer-b")
        .await
        .expect("승인 실패");
    let now = h.engine.now();
    assert_eq!(grant.approval.status, ApprovalStatus::Approved);
    assert_eq!(grant.approval.hold_placed_at, Some(now));

    let chat = h.gate.load_chat(grant.chat_id).await.unwrap();
    assert!(chat.is_approved);
    assert_eq!(chat.buyer_id, "buyer-b");
    assert_eq!(chat.seller_id, "seller");

    let held = h.item(&item.id).await;
    assert_eq!(held.status, Some(ItemStatus::Reserved));
    assert_eq!(held.reserved_by_user_id.as_deref(), Some("buyer-b"));
    assert_eq!(held.reserved_until, Some(now + Duration::hours(24)));
    assert_eq!(held.reserved_reason, Some(ReservedReason::PickupApproval));
    assert_eq!(held.pickup_approved_at, Some(now));

    let body = serde_json::to_value(&grant).unwrap();
    assert_eq!(body["chatId"], json!(grant.chat_id));
    assert_eq!(body["approval"]["status"], json!("approved"));

    // 재승인은 예약을 연장
    h.clock.advance(Duration::hours(1));
    h.engine.approve_buyer(&item.id, "seller", "buyer-b").await.unwrap();
    let extended = h.item(&item.id).await;
    assert_eq!(extended.reserved_until, Some(h.engine.now() + Duration::hours(24)));

    h.assert_reservation_invariant().await;
}

/// 다른 구매자가 예약 중이면 승인 불가, 기록도 남지 않음
#[tokio::test]
async fn test_approve_buyer_blocked_by_other_reservation() {
    let h = Harness::new();
    let item = h.list_item("seller", "Stroller", 0.0).await;
    h.engine.reserve(&item.id, "buyer-c").await.unwrap();

    let err = h
        .engine
        .approve_buyer(&item.id, "seller", "buyer-b")
        .await
        .unwrap_err();
    assert_conflict(err, ConflictReason::ReservedByOtherBuyer, Some(ItemStatus::Reserved));
    assert_eq!(h.approvals.count().unwrap(), 0);

    let held = h.item(&item.id).await;
    assert_eq!(held.reserved_by_user_id.as_deref(), Some("buyer-c"));
}

/// 승인 권한과 입력 검증
#[tokio::test]
async fn test_approve_buyer_validation() {
    let h = Harness::new();
    let item = h.list_item("seller", "Table", 30.0).await;

    let err = h
        .engine
        .approve_buyer(&item.id, "buyer-c", "buyer-b")
        .await
        .unwrap_err();
    assert_forbidden(err, ForbiddenReason::NotOwner);

    let err = h.engine.approve_buyer(&item.id, "seller", "  ").await.unwrap_err();
    assert!(matches!(err, MarketError::InvalidInput(_)));

    let err = h
        .engine
        .approve_buyer(&item.id, "seller", "seller")
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::InvalidInput(_)));
}

/// 미리 열린 채팅방은 승인 시 같은 방이 승인된다
#[tokio::test]
async fn test_approve_buyer_reuses_open_chat() {
    let h = Harness::new();
    let item = h.list_item("seller", "Mirror", 15.0).await;

    let (chat, created) = h.gate.open_chat(&item.id, "buyer-b").await.unwrap();
    assert!(created);
    assert!(!chat.is_approved);

    let grant = h.engine.approve_buyer(&item.id, "seller", "buyer-b").await.unwrap();
    assert_eq!(grant.chat_id, chat.id);
    assert!(h.gate.load_chat(chat.id).await.unwrap().is_approved);
}
// endregion: --- Pickup Approval

// region:    --- Sweep
/// 만료된 픽업 예약은 해제되고 구매자 노쇼 카운트가 오른다
#[tokio::test]
async fn test_sweep_releases_and_counts_pickup_timeouts() {
    let h = Harness::new();
    let desk = h.list_item("seller", "Desk", 50.0).await;
    let chair = h.list_item("seller", "Chair", 0.0).await;

    h.engine.approve_buyer(&desk.id, "seller", "buyer-b").await.unwrap();
    h.engine.reserve(&chair.id, "buyer-c").await.unwrap();

    // 아직 만료 전
    h.clock.advance(Duration::hours(9));
    let report = h.engine.sweep_expired_reservations().await.unwrap();
    assert_eq!(report.released, 0);

    h.clock.advance(Duration::hours(16));

    // 읽기 경로에서 만료 예약이 정리된다
    let desk = query::get_item(&h.engine, &desk.id).await.unwrap();
    assert_eq!(desk.status, Some(ItemStatus::Available));
    assert!(desk.reserved_by_user_id.is_none());
    assert!(desk.reserved_reason.is_none());
    let chair = h.item(&chair.id).await;
    assert_eq!(chair.status, Some(ItemStatus::Available));

    // 픽업 승인 예약만 노쇼로 집계
    assert_eq!(h.user("buyer-b").await.pickup_timeout_count, 1);
    assert_eq!(h.user("buyer-c").await.pickup_timeout_count, 0);

    // 반복 스윕은 추가로 세지 않는다
    for _ in 0..3 {
        let report = h.engine.sweep_expired_reservations().await.unwrap();
        assert_eq!(report.released, 0);
        assert!(report.timeouts.is_empty());
    }
    assert_eq!(h.user("buyer-b").await.pickup_timeout_count, 1);

    h.assert_reservation_invariant().await;
}

/// 임계값에 도달한 구매자는 관리자에게 정확히 한 번 알린다
#[tokio::test]
async fn test_no_show_threshold_notifies_admins_once() {
    let h = Harness::new();

    let mut ids = Vec::new();
    for n in 0..3 {
        let item = h.list_item("seller", &format!("Box {}", n), 10.0).await;
        h.engine.approve_buyer(&item.id, "seller", "buyer-b").await.unwrap();
        ids.push(item.id);
    }

    h.clock.advance(Duration::hours(25));
    let report = h.engine.sweep_expired_reservations().await.unwrap();
    assert_eq!(report.released, 3);
    assert_eq!(report.timeouts.get("buyer-b"), Some(&3));
    assert_eq!(report.flagged, vec!["buyer-b".to_string()]);

    let buyer = h.user("buyer-b").await;
    assert_eq!(buyer.pickup_timeout_count, 3);
    assert!(buyer.pickup_timeout_flagged);

    let flagged = h.sent_of(NotificationKind::BuyerFlagged).await;
    assert_eq!(flagged.len(), 1);
    let mut recipients = flagged[0].recipients.clone();
    recipients.sort();
    assert_eq!(recipients, vec!["admin-1".to_string(), "admin-2".to_string()]);
    assert_eq!(flagged[0].context["buyerId"], json!("buyer-b"));
    assert_eq!(flagged[0].context["count"], json!(3));

    // 이후 노쇼는 카운트만 오르고 알림은 없다
    for id in ids.iter().take(2) {
        h.engine.approve_buyer(id, "seller", "buyer-b").await.unwrap();
    }
    h.clock.advance(Duration::hours(25));
    let report = h.engine.sweep_expired_reservations().await.unwrap();
    assert_eq!(report.released, 2);
    assert!(report.flagged.is_empty());

    assert_eq!(h.user("buyer-b").await.pickup_timeout_count, 5);
    assert_eq!(h.sent_of(NotificationKind::BuyerFlagged).await.len(), 1);
}

/// 동시에 실행된 스윕도 같은 노쇼를 한 번만 센다
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sweeps_count_each_no_show_once() {
    let h = Harness::new();
    h.users.increment_timeout_count("buyer-b", 2).await.unwrap();

    let item = h.list_item("seller", "Mirror", 30.0).await;
    h.engine.approve_buyer(&item.id, "seller", "buyer-b").await.unwrap();
    h.clock.advance(Duration::hours(25));

    let sweeps: Vec<_> = (0..2)
        .map(|_| {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.sweep_expired_reservations().await })
        })
        .collect();

    let mut released = 0;
    let mut flagged = 0;
    for sweep in sweeps {
        let report = sweep.await.unwrap().expect("스윕 실패");
        released += report.released;
        flagged += report.flagged.len();
    }
    assert_eq!(released, 1);
    assert_eq!(flagged, 1);

    let buyer = h.user("buyer-b").await;
    assert_eq!(buyer.pickup_timeout_count, 3);
    assert!(buyer.pickup_timeout_flagged);
    assert_eq!(h.sent_of(NotificationKind::BuyerFlagged).await.len(), 1);
    h.assert_reservation_invariant().await;
}

/// 특정 구매자의 카운트 증가만 실패하는 저장소
struct BrokenCounterStore {
    inner: Arc<dyn UserStore>,
    broken: String,
}

#[async_trait]
impl UserStore for BrokenCounterStore {
    async fn find_by_id(&self, user_id: &str) -> MarketResult<Option<UserRecord>> {
        self.inner.find_by_id(user_id).await
    }

    async fn increment_timeout_count(
        &self,
        user_id: &str,
        delta: i64,
    ) -> MarketResult<Option<UserRecord>> {
        if user_id == self.broken {
            return Err(MarketError::Unavailable("connection reset by peer".to_string()));
        }
        self.inner.increment_timeout_count(user_id, delta).await
    }

    async fn set_flagged(&self, user_id: &str) -> MarketResult<bool> {
        self.inner.set_flagged(user_id).await
    }

    async fn list_admins(&self) -> MarketResult<Vec<String>> {
        self.inner.list_admins().await
    }
}

/// 한 구매자의 집계 실패가 다른 구매자의 집계를 막지 않는다
#[tokio::test]
async fn test_sweep_keeps_counting_after_one_buyer_fails() {
    let h = Harness::with_user_store(|inner| -> Arc<dyn UserStore> {
        Arc::new(BrokenCounterStore {
            inner,
            broken: "buyer-b".to_string(),
        })
    });
    let desk = h.list_item("seller", "Desk", 50.0).await;
    let lamp = h.list_item("seller", "Lamp", 15.0).await;
    h.engine.approve_buyer(&desk.id, "seller", "buyer-b").await.unwrap();
    h.engine.approve_buyer(&lamp.id, "seller", "buyer-c").await.unwrap();

    h.clock.advance(Duration::hours(25));
    let report = h.engine.sweep_expired_reservations().await.expect("스윕 실패");
    assert_eq!(report.released, 2);

    assert_eq!(h.user("buyer-b").await.pickup_timeout_count, 0);
    assert_eq!(h.user("buyer-c").await.pickup_timeout_count, 1);
    assert_eq!(h.item(&desk.id).await.status, Some(ItemStatus::Available));
    assert_eq!(h.item(&lamp.id).await.status, Some(ItemStatus::Available));
}

/// 임계값 미만에서는 플래그가 세워지지 않는다
#[tokio::test]
async fn test_no_show_below_threshold_is_silent() {
    let h = Harness::new();
    for n in 0..2 {
        let item = h.list_item("seller", &format!("Crate {}", n), 10.0).await;
        h.engine.approve_buyer(&item.id, "seller", "buyer-b").await.unwrap();
    }

    h.clock.advance(Duration::hours(25));
    let report = h.engine.sweep_expired_reservations().await.unwrap();
    assert_eq!(report.timeouts.get("buyer-b"), Some(&2));
    assert!(report.flagged.is_empty());
    assert!(!h.user("buyer-b").await.pickup_timeout_flagged);
    assert!(h.sent_of(NotificationKind::BuyerFlagged).await.is_empty());
}

/// status 가 없는 레거시 물품은 스윕 때 available 로 정규화
#[tokio::test]
async fn test_sweep_normalizes_legacy_items() {
    let h = Harness::new();
    let legacy = Item {
        status: None,
        ..h.list_item("seller", "Old radio", 5.0).await
    };
    let legacy = Item {
        id: "100".to_string(),
        ..legacy
    };
    h.items.insert_raw(legacy).unwrap();

    // 상태가 없어도 예약 가능한 물품으로 취급
    let seen = h.item("100").await;
    assert_eq!(seen.effective_status(), ItemStatus::Available);

    let chair = h.list_item("seller", "Chair", 0.0).await;
    assert_eq!(chair.id, "101");
    h.engine.reserve(&chair.id, "buyer-b").await.unwrap();

    h.clock.advance(Duration::hours(11));
    let report = h.engine.sweep_expired_reservations().await.unwrap();
    assert_eq!(report.released, 1);
    assert_eq!(report.normalized, 1);
    assert_eq!(h.item("100").await.status, Some(ItemStatus::Available));
}
// endregion: --- Sweep

// region:    --- Reconcile
/// 승인 기록만 남은 경우 예약을 다시 시도하거나 pending 으로 되돌린다
#[tokio::test]
async fn test_reconcile_retries_or_reverts_unconfirmed_approvals() {
    let h = Harness::new();
    let free = h.list_item("seller", "Sofa", 80.0).await;
    let taken = h.list_item("seller", "Rug", 0.0).await;
    let approved_at = h.engine.now();

    // 물품 예약 단계 전에 멈춘 승인
    for item in [&free, &taken] {
        h.engine
            .stores()
            .approvals
            .upsert_status(&item.id, "buyer-b", "seller", ApprovalStatus::Approved, approved_at)
            .await
            .unwrap();
    }
    h.engine.reserve(&taken.id, "buyer-c").await.unwrap();

    // 유예 시간 전에는 손대지 않는다
    let report = h.engine.reconcile_approvals(Duration::minutes(2)).await.unwrap();
    assert_eq!((report.retried, report.reverted), (0, 0));

    h.clock.advance(Duration::minutes(5));
    let report = h.engine.reconcile_approvals(Duration::minutes(2)).await.unwrap();
    assert_eq!(report.retried, 1);
    assert_eq!(report.reverted, 1);

    let held = h.item(&free.id).await;
    assert_eq!(held.reserved_by_user_id.as_deref(), Some("buyer-b"));
    assert_eq!(held.reserved_reason, Some(ReservedReason::PickupApproval));
    assert_eq!(held.reserved_until, Some(approved_at + Duration::hours(24)));

    let stores = h.engine.stores();
    let confirmed = stores.approvals.find_by_buyer(&free.id, "buyer-b").await.unwrap().unwrap();
    assert_eq!(confirmed.status, ApprovalStatus::Approved);
    assert!(confirmed.hold_placed_at.is_some());

    let reverted = stores.approvals.find_by_buyer(&taken.id, "buyer-b").await.unwrap().unwrap();
    assert_eq!(reverted.status, ApprovalStatus::Pending);
    assert_eq!(h.item(&taken.id).await.reserved_by_user_id.as_deref(), Some("buyer-c"));

    // 정리된 뒤에는 더 할 일이 없다
    let report = h.engine.reconcile_approvals(Duration::minutes(2)).await.unwrap();
    assert_eq!((report.retried, report.reverted), (0, 0));
    h.assert_reservation_invariant().await;
}
// endregion: --- Reconcile

// region:    --- Carousel
/// 노출 종료 임박 알림은 물품당 한 번
#[tokio::test]
async fn test_carousel_exit_notice_is_sent_once() {
    let h = Harness::new();
    let old = h.list_item("seller", "Old lamp", 10.0).await;

    h.clock.advance(Duration::days(5) + Duration::hours(1));
    let fresh = h.list_item("seller", "New lamp", 10.0).await;

    let shown = query::carousel(&h.engine).await.unwrap();
    let ids: Vec<&str> = shown.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, vec![fresh.id.as_str(), old.id.as_str()]);

    let notices = h.sent_of(NotificationKind::CarouselExitSoon).await;
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].recipients, vec!["seller".to_string()]);
    assert_eq!(notices[0].context["itemId"], json!(old.id));
    assert_eq!(notices[0].context["daysLeft"], json!(2));
    assert!(h.item(&old.id).await.carousel_exit_notified);
    assert!(!h.item(&fresh.id).await.carousel_exit_notified);

    // 두 번째 조회는 알림 없음
    query::carousel(&h.engine).await.unwrap();
    assert_eq!(h.engine.run_carousel_exit_notices().await.unwrap(), 0);
    assert_eq!(h.sent_of(NotificationKind::CarouselExitSoon).await.len(), 1);
}

/// 노출 기간(7일)이 지난 물품은 알림 대상이 아니다
#[tokio::test]
async fn test_carousel_exit_notice_stops_at_window_end() {
    let h = Harness::new();
    let expired = h.list_item("seller", "Vase", 10.0).await;
    h.clock.advance(Duration::hours(1));
    let closing = h.list_item("seller", "Clock", 10.0).await;

    // expired 는 정확히 7일, closing 은 6일 23시간
    h.clock.advance(Duration::days(6) + Duration::hours(23));
    assert_eq!(h.engine.run_carousel_exit_notices().await.unwrap(), 1);

    let notices = h.sent_of(NotificationKind::CarouselExitSoon).await;
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].context["itemId"], json!(closing.id));
    assert_eq!(notices[0].context["daysLeft"], json!(1));

    h.clock.advance(Duration::days(1));
    query::carousel(&h.engine).await.unwrap();
    assert_eq!(h.sent_of(NotificationKind::CarouselExitSoon).await.len(), 1);
    assert!(!h.item(&expired.id).await.carousel_exit_notified);
}

/// 판매 완료 물품은 캐러셀에서 빠진다
#[tokio::test]
async fn test_carousel_excludes_sold_items() {
    let h = Harness::new();
    let sold = h.list_item("seller", "Bike", 120.0).await;
    let kept = h.list_item("seller", "Helmet", 20.0).await;
    h.engine.complete_purchase(&sold.id, "buyer-b").await.unwrap();

    let shown = h.engine.carousel().await.unwrap();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].id, kept.id);
}
// endregion: --- Carousel

// region:    --- Notification Delivery
/// 응답이 느린 알림 싱크
struct StalledSink;

#[async_trait]
impl NotificationSink for StalledSink {
    async fn notify(&self, _notification: Notification) {
        tokio::time::sleep(StdDuration::from_secs(5)).await;
    }
}

/// 알림 전달을 기다리지 않고 연산이 끝난다
#[tokio::test]
async fn test_slow_sink_does_not_delay_operations() {
    let h = Harness::with_sink(Arc::new(StalledSink));
    let item = h.list_item("seller", "Sofa", 40.0).await;

    let requested = tokio::time::timeout(
        StdDuration::from_secs(1),
        h.engine.request_approval(&item.id, "buyer-b"),
    )
    .await
    .expect("승인 요청이 알림 전달을 기다림");
    assert!(requested.unwrap().created);

    h.engine.approve_buyer(&item.id, "seller", "buyer-b").await.unwrap();
    let sold = tokio::time::timeout(
        StdDuration::from_secs(1),
        h.engine.complete_purchase(&item.id, "buyer-b"),
    )
    .await
    .expect("구매 확정이 알림 전달을 기다림");
    assert_eq!(sold.unwrap().status, Some(ItemStatus::Sold));
}
// endregion: --- Notification Delivery

// region:    --- Purchase & Delete
/// 판매 확정 후에는 예약/승인/재구매 모두 충돌
#[tokio::test]
async fn test_complete_purchase_is_terminal() {
    let h = Harness::new();
    let item = h.list_item("seller", "Camera", 200.0).await;
    h.engine.approve_buyer(&item.id, "seller", "buyer-b").await.unwrap();

    let err = h.engine.complete_purchase(&item.id, "buyer-c").await.unwrap_err();
    assert_conflict(err, ConflictReason::ReservedByOtherBuyer, Some(ItemStatus::Reserved));

    let err = h.engine.complete_purchase(&item.id, "seller").await.unwrap_err();
    assert!(matches!(err, MarketError::InvalidInput(_)));

    let sold = h.engine.complete_purchase(&item.id, "buyer-b").await.unwrap();
    assert_eq!(sold.status, Some(ItemStatus::Sold));
    assert_eq!(sold.sold_to.as_deref(), Some("buyer-b"));
    assert_eq!(sold.sold_at, Some(h.engine.now()));
    assert!(sold.reserved_by_user_id.is_none());
    assert!(sold.reserved_until.is_none());

    let sold_notices = h.sent_of(NotificationKind::ItemSold).await;
    assert_eq!(sold_notices.len(), 1);
    assert_eq!(sold_notices[0].recipients, vec!["seller".to_string()]);

    let err = h.engine.complete_purchase(&item.id, "buyer-b").await.unwrap_err();
    assert_conflict(err, ConflictReason::AlreadySold, Some(ItemStatus::Sold));
    let err = h.engine.reserve(&item.id, "buyer-c").await.unwrap_err();
    assert_conflict(err, ConflictReason::AlreadySold, Some(ItemStatus::Sold));
    let err = h
        .engine
        .approve_buyer(&item.id, "seller", "buyer-c")
        .await
        .unwrap_err();
    assert_conflict(err, ConflictReason::AlreadySold, Some(ItemStatus::Sold));

    // 만료 시각이 지나도 판매 상태 유지
    h.clock.advance(Duration::days(2));
    h.engine.sweep_expired_reservations().await.unwrap();
    assert_eq!(h.item(&item.id).await.status, Some(ItemStatus::Sold));
    h.assert_reservation_invariant().await;
}

/// 삭제는 소유자 또는 관리자만
#[tokio::test]
async fn test_delete_item_permissions() {
    let h = Harness::new();
    let mine = h.list_item("seller", "Vase", 12.0).await;
    let other = h.list_item("seller", "Plate", 3.0).await;

    let err = h.engine.delete_item(&mine.id, "buyer-b", Role::User).await.unwrap_err();
    assert_forbidden(err, ForbiddenReason::NotOwner);

    h.engine.delete_item(&mine.id, "seller", Role::User).await.unwrap();
    h.engine.delete_item(&other.id, "admin-1", Role::Admin).await.unwrap();

    let err = h.engine.load_item(&mine.id).await.unwrap_err();
    assert!(matches!(err, MarketError::NotFound(_)));

    // 삭제된 id 는 재사용되지 않는다
    let next = h.list_item("seller", "Cup", 1.0).await;
    assert_eq!(next.id, "3");
}
// endregion: --- Purchase & Delete

// region:    --- Queries
/// 검색 조건과 내 물품/내 예약 조회
#[tokio::test]
async fn test_item_queries() {
    let h = Harness::new();
    let lamp = h.list_item("seller", "Desk Lamp", 0.0).await;
    h.list_item("seller", "Armchair", 40.0).await;
    h.list_item("buyer-c", "Lampshade", 5.0).await;

    let search = query::ItemSearch {
        name: Some("lamp".to_string()),
        ..query::ItemSearch::default()
    };
    let found = query::list_items(&h.engine, &search).await.unwrap();
    assert_eq!(found.len(), 2);

    let search = query::ItemSearch {
        name: Some("lamp".to_string()),
        city: Some("  ".to_string()),
        ..query::ItemSearch::default()
    };
    assert_eq!(query::list_items(&h.engine, &search).await.unwrap().len(), 2);

    let mine = query::my_items(&h.engine, "seller").await.unwrap();
    assert_eq!(mine.len(), 2);

    h.engine.reserve(&lamp.id, "buyer-b").await.unwrap();
    let reservations = query::my_reservations(&h.engine, "buyer-b").await.unwrap();
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0].id, lamp.id);

    let all = query::admin_all_items(&h.engine).await.unwrap();
    assert_eq!(all.len(), 3);
    let body = serde_json::to_value(&all).unwrap();
    assert!(body[0]["owner"].is_object());
}
// endregion: --- Queries

// region:    --- Pickup Details
/// 픽업 주소는 판매자와 승인된 구매자에게만 보인다
#[tokio::test]
async fn test_pickup_details_follow_approval() {
    let h = Harness::new();
    h.add_named_user("buyer-n", "Noa", "Levi");
    let item = h.list_item_with_pickup("seller", "Shelf").await;

    let near = PickupQuery {
        lat: Some(32.07),
        lng: Some(34.78),
        ..PickupQuery::default()
    };
    let options = h
        .engine
        .request_pickup_options(&item.id, "buyer-n", &near)
        .await
        .unwrap();
    assert_eq!(options.len(), 1);
    assert!(options[0].address.is_none());
    assert!(options[0].distance_km.expect("거리 없음") < 2.0);

    let access = h.engine.item_access(&item.id, "buyer-n").await.unwrap();
    assert_eq!(access.role, "viewer");
    assert!(access.approval_status.is_none());
    assert!(access.pickup_locations[0].address.is_none());

    h.engine.request_approval(&item.id, "buyer-n").await.unwrap();
    let seller_view = h.engine.item_access(&item.id, "seller").await.unwrap();
    assert_eq!(seller_view.role, "seller");
    assert_eq!(seller_view.approvals.len(), 1);
    assert_eq!(seller_view.approvals[0].buyer_name, "Noa Levi");
    assert_eq!(seller_view.approvals[0].status, ApprovalStatus::Pending);
    assert!(seller_view.approvals[0].chat_id.is_none());
    assert_eq!(
        seller_view.pickup_locations[0].address.as_deref(),
        Some("12 Rothschild Blvd")
    );

    let grant = h.engine.approve_buyer(&item.id, "seller", "buyer-n").await.unwrap();
    let access = h.engine.item_access(&item.id, "buyer-n").await.unwrap();
    assert_eq!(access.approval_status, Some(ApprovalStatus::Approved));
    assert_eq!(access.chat_id, Some(grant.chat_id));
    assert_eq!(
        access.pickup_locations[0].address.as_deref(),
        Some("12 Rothschild Blvd")
    );

    let options = h
        .engine
        .request_pickup_options(&item.id, "buyer-n", &PickupQuery::default())
        .await
        .unwrap();
    assert!(options[0].address.is_some());
}
// endregion: --- Pickup Details

// region:    --- Scheduler
/// 스케줄러 1회 실행으로 만료 해제와 승인 정리가 함께 수행된다
#[tokio::test]
async fn test_scheduler_run_once_sweeps_and_reconciles() {
    use secondhand_market::scheduler::ReservationScheduler;

    let h = Harness::new();
    let expiring = h.list_item("seller", "Tripod", 0.0).await;
    let pending = h.list_item("seller", "Easel", 40.0).await;

    h.engine.reserve(&expiring.id, "buyer-c").await.unwrap();
    h.engine
        .stores()
        .approvals
        .upsert_status(&pending.id, "buyer-b", "seller", ApprovalStatus::Approved, h.engine.now())
        .await
        .unwrap();

    h.clock.advance(Duration::hours(11));
    let scheduler = ReservationScheduler::new(
        h.engine.clone(),
        std::time::Duration::from_secs(60),
        Duration::minutes(2),
    );
    scheduler.run_once().await;

    assert_eq!(h.item(&expiring.id).await.status, Some(ItemStatus::Available));
    let held = h.item(&pending.id).await;
    assert_eq!(held.reserved_by_user_id.as_deref(), Some("buyer-b"));
    assert_eq!(held.reserved_reason, Some(ReservedReason::PickupApproval));
    h.assert_reservation_invariant().await;
}
// endregion: --- Scheduler
