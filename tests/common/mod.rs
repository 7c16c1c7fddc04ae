#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use secondhand_market::chat::{ChatGate, ChatHub};
use secondhand_market::clock::ManualClock;
use secondhand_market::config::ReservationPolicy;
use secondhand_market::handlers::AppState;
use secondhand_market::marketplace::model::{
    Item, NewItem, PickupLocationInput, Role, UserRecord,
};
use secondhand_market::notification::{
    Notification, NotificationKind, NotificationSink, Notifier, RecordingNotificationSink,
};
use secondhand_market::reservation::ReservationEngine;
use secondhand_market::store::memory::{
    MemoryApprovalStore, MemoryChatStore, MemoryItemStore, MemoryUserStore,
};
use secondhand_market::store::{ItemFilter, Stores, UserStore};
use std::sync::Arc;

/// 트레이싱 초기화 (여러 테스트에서 호출해도 안전)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .with_test_writer()
        .try_init();
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

/// 메모리 저장소와 수동 시계로 구성한 엔진
pub struct Harness {
    pub items: Arc<MemoryItemStore>,
    pub approvals: Arc<MemoryApprovalStore>,
    pub chats: Arc<MemoryChatStore>,
    pub users: Arc<MemoryUserStore>,
    pub sink: Arc<RecordingNotificationSink>,
    pub notifier: Notifier,
    pub clock: Arc<ManualClock>,
    pub engine: ReservationEngine,
    pub gate: ChatGate,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(None, |users| users)
    }

    /// 알림 싱크를 바꿔 끼운 엔진
    pub fn with_sink(sink: Arc<dyn NotificationSink>) -> Self {
        Self::build(Some(sink), |users| users)
    }

    /// 사용자 저장소를 감싼 엔진 (장애 주입용)
    pub fn with_user_store(
        wrap: impl FnOnce(Arc<dyn UserStore>) -> Arc<dyn UserStore>,
    ) -> Self {
        Self::build(None, wrap)
    }

    fn build(
        sink_override: Option<Arc<dyn NotificationSink>>,
        wrap_users: impl FnOnce(Arc<dyn UserStore>) -> Arc<dyn UserStore>,
    ) -> Self {
        init_tracing();
        let policy = ReservationPolicy::default();

        let items = Arc::new(MemoryItemStore::new(policy.max_pickup_locations));
        let approvals = Arc::new(MemoryApprovalStore::new());
        let chats = Arc::new(MemoryChatStore::new());
        let users = Arc::new(MemoryUserStore::new());
        let memory_users: Arc<dyn UserStore> = users.clone();
        let stores = Stores {
            items: items.clone(),
            approvals: approvals.clone(),
            chats: chats.clone(),
            users: wrap_users(memory_users),
        };

        let sink = Arc::new(RecordingNotificationSink::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let active_sink: Arc<dyn NotificationSink> = match sink_override {
            Some(sink) => sink,
            None => sink.clone(),
        };
        let notifier = Notifier::new(active_sink, stores.users.clone());
        let engine = ReservationEngine::new(
            stores.clone(),
            notifier.clone(),
            clock.clone(),
            policy.clone(),
        );
        let gate = ChatGate::new(stores, ChatHub::new(), clock.clone(), policy);

        for (id, role) in [
            ("seller", Role::User),
            ("buyer-b", Role::User),
            ("buyer-c", Role::User),
            ("admin-1", Role::Admin),
            ("admin-2", Role::Admin),
        ] {
            users.add(id, role).unwrap();
        }

        Self {
            items,
            approvals,
            chats,
            users,
            sink,
            notifier,
            clock,
            engine,
            gate,
        }
    }

    /// 전달 중인 알림을 기다린 뒤 종류별로 조회
    pub async fn sent_of(&self, kind: NotificationKind) -> Vec<Notification> {
        self.notifier.flush().await;
        self.sink.sent_of(kind)
    }

    pub fn state(&self) -> AppState {
        AppState::new(self.engine.clone(), self.gate.clone())
    }

    pub fn add_named_user(&self, id: &str, first: &str, last: &str) {
        self.users
            .insert_user(UserRecord {
                id: id.to_string(),
                email: Some(format!("{}@example.com", id)),
                first_name: Some(first.to_string()),
                last_name: Some(last.to_string()),
                role: Role::User,
                pickup_timeout_count: 0,
                pickup_timeout_flagged: false,
            })
            .unwrap();
    }

    pub async fn list_item(&self, owner: &str, name: &str, price: f64) -> Item {
        self.engine
            .create_item(
                owner,
                NewItem {
                    name: name.to_string(),
                    price,
                    city: "Haifa".to_string(),
                    area: "Carmel".to_string(),
                    ..NewItem::default()
                },
            )
            .await
            .unwrap()
    }

    pub async fn list_item_with_pickup(&self, owner: &str, name: &str) -> Item {
        self.engine
            .create_item(
                owner,
                NewItem {
                    name: name.to_string(),
                    price: 20.0,
                    pickup_locations: vec![PickupLocationInput {
                        label: Some("Lobby".to_string()),
                        city: Some("Tel Aviv".to_string()),
                        area: Some("Center".to_string()),
                        address: Some("12 Rothschild Blvd".to_string()),
                        lat: Some(32.0636),
                        lng: Some(34.7730),
                    }],
                    ..NewItem::default()
                },
            )
            .await
            .unwrap()
    }

    pub async fn item(&self, id: &str) -> Item {
        self.engine.load_item(id).await.unwrap()
    }

    pub async fn user(&self, id: &str) -> UserRecord {
        self.engine
            .stores()
            .users
            .find_by_id(id)
            .await
            .unwrap()
            .unwrap()
    }

    /// 예약 상태이면 예약자와 만료 시각이 모두 있어야 하고, 아니면 둘 다 없어야 한다
    pub async fn assert_reservation_invariant(&self) {
        let items = self
            .engine
            .stores()
            .items
            .find_many(&ItemFilter::default())
            .await
            .unwrap();
        for item in items {
            let reserved = item.status == Some(secondhand_market::marketplace::model::ItemStatus::Reserved);
            assert_eq!(
                reserved,
                item.reserved_by_user_id.is_some() && item.reserved_until.is_some(),
                "item {} violates the reservation invariant",
                item.id
            );
            if !reserved {
                assert!(item.reserved_by_user_id.is_none() && item.reserved_until.is_none());
            }
        }
    }
}
