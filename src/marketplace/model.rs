use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// region:    --- Item
/// 물품 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Available,
    Reserved,
    Sold,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Available => "available",
            ItemStatus::Reserved => "reserved",
            ItemStatus::Sold => "sold",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "available" => Some(ItemStatus::Available),
            "reserved" => Some(ItemStatus::Reserved),
            "sold" => Some(ItemStatus::Sold),
            _ => None,
        }
    }
}

/// 예약 사유 (일반 예약은 None)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservedReason {
    #[serde(rename = "pickupApproval")]
    PickupApproval,
}

impl ReservedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservedReason::PickupApproval => "pickupApproval",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pickupApproval" => Some(ReservedReason::PickupApproval),
            _ => None,
        }
    }
}

/// 픽업 장소
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupLocation {
    pub label: String,
    pub city: String,
    #[serde(default)]
    pub area: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

/// 물품 모델
/// `id` 는 저장소 기본키가 아닌 10진수 문자열 (최대값 + 1)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: String,
    pub category: String,
    pub condition: String,
    pub description: String,
    pub price: f64,
    pub city: String,
    pub area: String,
    pub pickup_locations: Vec<PickupLocation>,
    pub owner_id: Option<String>,
    pub status: Option<ItemStatus>,
    pub reserved_by_user_id: Option<String>,
    pub reserved_until: Option<DateTime<Utc>>,
    pub reserved_reason: Option<ReservedReason>,
    pub pickup_approved_at: Option<DateTime<Utc>>,
    pub carousel_exit_notified: bool,
    pub sold_to: Option<String>,
    pub sold_at: Option<DateTime<Utc>>,
    pub date_added: DateTime<Utc>,
}

impl Item {
    /// 상태 필드가 없으면 available 로 취급
    pub fn effective_status(&self) -> ItemStatus {
        self.status.unwrap_or(ItemStatus::Available)
    }

    pub fn is_reserved_by(&self, user_id: &str) -> bool {
        self.effective_status() == ItemStatus::Reserved
            && self.reserved_by_user_id.as_deref() == Some(user_id)
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id.as_deref() == Some(user_id)
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.date_added
    }
}

/// 물품 등록 입력
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub pickup_locations: Vec<PickupLocationInput>,
}

/// 사용자가 보낸 픽업 장소 (정제 전)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PickupLocationInput {
    pub label: Option<String>,
    pub city: Option<String>,
    pub area: Option<String>,
    pub address: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

pub fn valid_latitude(value: f64) -> bool {
    value.is_finite() && (-90.0..=90.0).contains(&value)
}

pub fn valid_longitude(value: f64) -> bool {
    value.is_finite() && (-180.0..=180.0).contains(&value)
}

/// 픽업 장소 정제
/// label, city, address 가 모두 있어야 하고 좌표는 둘 다 유효할 때만 유지한다.
pub fn clean_pickup_locations(inputs: &[PickupLocationInput], max: usize) -> Vec<PickupLocation> {
    let trimmed = |value: &Option<String>| value.as_deref().unwrap_or("").trim().to_string();

    inputs
        .iter()
        .filter_map(|input| {
            let label = trimmed(&input.label);
            let city = trimmed(&input.city);
            let address = trimmed(&input.address);
            if label.is_empty() || city.is_empty() || address.is_empty() {
                return None;
            }
            let (lat, lng) = match (input.lat, input.lng) {
                (Some(lat), Some(lng)) if valid_latitude(lat) && valid_longitude(lng) => {
                    (Some(lat), Some(lng))
                }
                _ => (None, None),
            };
            Some(PickupLocation {
                label,
                city,
                area: trimmed(&input.area),
                address,
                lat,
                lng,
            })
        })
        .take(max)
        .collect()
}

/// 스윕으로 해제된 예약
#[derive(Debug, Clone, PartialEq)]
pub struct ExpiredHold {
    pub item_id: String,
    pub buyer_id: Option<String>,
    pub reason: Option<ReservedReason>,
}
// endregion: --- Item

// region:    --- Approval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(ApprovalStatus::Pending),
            "approved" => Some(ApprovalStatus::Approved),
            "rejected" => Some(ApprovalStatus::Rejected),
            _ => None,
        }
    }
}

/// 픽업 승인 요청 (item, buyer, seller 당 하나)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub id: i64,
    pub item_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// 승인 후 물품 예약까지 완료된 시각
    pub hold_placed_at: Option<DateTime<Utc>>,
}
// endregion: --- Approval

// region:    --- Chat
/// 채팅방 (item, buyer, seller 당 하나)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: i64,
    pub item_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }
}

/// 채팅 메시지 (작성 후 변경 불가)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
// endregion: --- Chat

// region:    --- User
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::User
        }
    }
}

/// 사용자 (노쇼 추적 필드 포함)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    pub pickup_timeout_count: i64,
    pub pickup_timeout_flagged: bool,
}

impl UserRecord {
    /// 표시 이름: 이름 -> 이메일 -> id 순
    pub fn display_name(&self) -> String {
        let full = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let full = full.trim();
        if !full.is_empty() {
            return full.to_string();
        }
        self.email.clone().unwrap_or_else(|| self.id.clone())
    }
}
// endregion: --- User
