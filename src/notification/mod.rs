/// 알림 전송
/// 알림은 best-effort 이다. 싱크는 실패를 스스로 로그로 남기고 호출자에게 전파하지 않는다.
/// 싱크 호출은 별도 태스크에서 실행되어 호출자는 전달 완료를 기다리지 않는다.
// region:    --- Imports
use crate::marketplace::model::{Item, UserRecord};
use crate::message_broker::KafkaProducer;
use crate::store::UserStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

// endregion: --- Imports

// region:    --- Notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    PickupApprovalRequest,
    CarouselExitSoon,
    BuyerFlagged,
    ItemSold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipients: Vec<String>,
    pub title: String,
    pub message: String,
    pub context: serde_json::Value,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification);
}
// endregion: --- Notification

// region:    --- Sinks
/// Kafka 토픽으로 알림 발행
pub struct KafkaNotificationSink {
    producer: Arc<KafkaProducer>,
    topic: String,
}

impl KafkaNotificationSink {
    pub fn new(producer: Arc<KafkaProducer>, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl NotificationSink for KafkaNotificationSink {
    async fn notify(&self, notification: Notification) {
        let payload = match serde_json::to_string(&notification) {
            Ok(payload) => payload,
            Err(e) => {
                error!("{:<12} --> 알림 직렬화 실패: {:?}", "Notify", e);
                return;
            }
        };

        for recipient in &notification.recipients {
            if let Err(e) = self
                .producer
                .send_message(&self.topic, recipient, &payload)
                .await
            {
                error!(
                    "{:<12} --> 알림 발행 실패 (recipient: {}): {}",
                    "Notify", recipient, e
                );
            }
        }
    }
}

/// 로그로만 남기는 싱크 (Kafka 미설정 시)
#[derive(Debug, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(&self, notification: Notification) {
        info!(
            "{:<12} --> {:?} -> {:?}: {}",
            "Notify", notification.kind, notification.recipients, notification.title
        );
    }
}

/// 전송된 알림을 기록하는 싱크
#[derive(Debug, Default)]
pub struct RecordingNotificationSink {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn sent_of(&self, kind: NotificationKind) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| n.kind == kind)
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn notify(&self, notification: Notification) {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }
}
// endregion: --- Sinks

// region:    --- Notifier
/// 마켓 이벤트별 알림 문구 작성 후 싱크로 전달
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    users: Arc<dyn UserStore>,
    in_flight: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>, users: Arc<dyn UserStore>) -> Self {
        Self {
            sink,
            users,
            in_flight: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn in_flight(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        match self.in_flight.lock() {
            Ok(handles) => handles,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 수신자가 확정된 알림을 싱크로 넘기고 바로 반환
    async fn send(&self, notification: Notification) {
        if notification.recipients.is_empty() {
            warn!("{:<12} --> 수신자 없음: {:?}", "Notify", notification.kind);
            return;
        }
        debug!("{:<12} --> 알림 전달 시작: {:?}", "Notify", notification.kind);

        let sink = Arc::clone(&self.sink);
        let handle = tokio::spawn(async move {
            sink.notify(notification).await;
        });

        let mut in_flight = self.in_flight();
        in_flight.retain(|handle| !handle.is_finished());
        in_flight.push(handle);
    }

    /// 전달 중인 알림이 모두 끝날 때까지 대기 (종료 시점과 테스트용)
    pub async fn flush(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.in_flight());
        for handle in handles {
            if let Err(e) = handle.await {
                error!("{:<12} --> 알림 태스크 실패: {}", "Notify", e);
            }
        }
    }

    /// 구매자의 픽업 승인 요청 -> 판매자
    pub async fn pickup_approval_request(&self, item: &Item, seller_id: &str, buyer_id: &str) {
        self.send(Notification {
            kind: NotificationKind::PickupApprovalRequest,
            recipients: vec![seller_id.to_string()],
            title: "Pickup approval requested".to_string(),
            message: format!("A buyer asked to pick up \"{}\".", item.name),
            context: json!({ "itemId": item.id, "buyerId": buyer_id }),
        })
        .await;
    }

    /// 캐러셀 노출 종료 예정 -> 물품 소유자
    pub async fn carousel_exit_soon(&self, item: &Item, owner_id: &str, days_left: i64) {
        self.send(Notification {
            kind: NotificationKind::CarouselExitSoon,
            recipients: vec![owner_id.to_string()],
            title: "Your item is leaving the featured carousel".to_string(),
            message: format!(
                "\"{}\" will leave the featured carousel in {} day(s).",
                item.name, days_left
            ),
            context: json!({ "itemId": item.id, "daysLeft": days_left }),
        })
        .await;
    }

    /// 노쇼 반복 구매자 -> 모든 관리자
    pub async fn buyer_no_show(&self, buyer: &UserRecord) {
        let admins = match self.users.list_admins().await {
            Ok(admins) => admins,
            Err(e) => {
                error!("{:<12} --> 관리자 목록 조회 실패: {}", "Notify", e);
                return;
            }
        };

        self.send(Notification {
            kind: NotificationKind::BuyerFlagged,
            recipients: admins,
            title: "Buyer missed pickup repeatedly".to_string(),
            message: format!(
                "{} missed {} approved pickups.",
                buyer.display_name(),
                buyer.pickup_timeout_count
            ),
            context: json!({
                "buyerId": buyer.id,
                "buyerName": buyer.display_name(),
                "email": buyer.email,
                "count": buyer.pickup_timeout_count,
            }),
        })
        .await;
    }

    /// 판매 완료 -> 판매자
    pub async fn item_sold(&self, item: &Item, seller_id: &str, buyer_id: &str) {
        self.send(Notification {
            kind: NotificationKind::ItemSold,
            recipients: vec![seller_id.to_string()],
            title: "Item sold".to_string(),
            message: format!("\"{}\" has been purchased.", item.name),
            context: json!({ "itemId": item.id, "buyerId": buyer_id }),
        })
        .await;
    }
}
// endregion: --- Notifier
