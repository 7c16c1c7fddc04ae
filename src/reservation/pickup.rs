/// 픽업 장소 안내와 역할별 물품 접근 정보
// region:    --- Imports
use super::ReservationEngine;
use crate::error::MarketResult;
use crate::marketplace::model::{ApprovalStatus, Item, PickupLocation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// endregion: --- Imports

const EARTH_RADIUS_KM: f64 = 6371.0;

// region:    --- Types
/// 구매자 위치 힌트
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PickupQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub city: Option<String>,
    pub area: Option<String>,
}

impl PickupQuery {
    fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => Some((lat, lng)),
            _ => None,
        }
    }
}

/// 응답용 픽업 장소. address/좌표는 권한이 있을 때만 채운다.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupOption {
    pub label: String,
    pub city: String,
    pub area: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

impl PickupOption {
    fn from_location(location: &PickupLocation, full_details: bool, distance_km: Option<f64>) -> Self {
        Self {
            label: location.label.clone(),
            city: location.city.clone(),
            area: location.area.clone(),
            distance_km,
            address: full_details.then(|| location.address.clone()),
            lat: if full_details { location.lat } else { None },
            lng: if full_details { location.lng } else { None },
        }
    }
}

/// 판매자에게 보이는 승인 요청
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalView {
    pub buyer_id: String,
    pub buyer_name: String,
    pub status: ApprovalStatus,
    pub updated_at: DateTime<Utc>,
    pub chat_id: Option<i64>,
}

/// 역할별 물품 접근 정보
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemAccess {
    /// "seller" 또는 "viewer"
    pub role: &'static str,
    pub approval_status: Option<ApprovalStatus>,
    pub approvals: Vec<ApprovalView>,
    pub chat_id: Option<i64>,
    pub pickup_locations: Vec<PickupOption>,
}
// endregion: --- Types

// region:    --- Ranking
/// 두 좌표 사이 거리 (km)
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// 도시 일치 2점, 지역 일치 1점 (대소문자 무시)
fn city_match_score(location: &PickupLocation, city: Option<&str>, area: Option<&str>) -> u8 {
    let same = |want: Option<&str>, have: &str| {
        want.map_or(false, |want| {
            !want.is_empty() && !have.is_empty() && want.to_lowercase() == have.to_lowercase()
        })
    };

    let mut score = 0;
    if same(city, &location.city) {
        score += 2;
    }
    if same(area, &location.area) {
        score += 1;
    }
    score
}

/// 좌표가 있으면 거리순(좌표 없는 장소는 뒤로), 없으면 도시/지역 점수 내림차순
fn rank_locations(
    locations: &[PickupLocation],
    query: &PickupQuery,
    full_details: bool,
    max: usize,
) -> Vec<PickupOption> {
    let locations = &locations[..locations.len().min(max)];

    match query.coordinates() {
        Some((lat, lng)) => {
            let mut ranked: Vec<(Option<f64>, &PickupLocation)> = locations
                .iter()
                .map(|loc| {
                    let distance = match (loc.lat, loc.lng) {
                        (Some(loc_lat), Some(loc_lng)) => Some(haversine_km(lat, lng, loc_lat, loc_lng)),
                        _ => None,
                    };
                    (distance, loc)
                })
                .collect();
            ranked.sort_by(|(a, _), (b, _)| match (a, b) {
                (Some(a), Some(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            });
            ranked
                .into_iter()
                .map(|(distance, loc)| PickupOption::from_location(loc, full_details, distance.map(round2)))
                .collect()
        }
        None => {
            let mut ranked: Vec<(u8, &PickupLocation)> = locations
                .iter()
                .map(|loc| {
                    (
                        city_match_score(loc, query.city.as_deref(), query.area.as_deref()),
                        loc,
                    )
                })
                .collect();
            ranked.sort_by(|(a, _), (b, _)| b.cmp(a));
            ranked
                .into_iter()
                .map(|(_, loc)| PickupOption::from_location(loc, full_details, None))
                .collect()
        }
    }
}
// endregion: --- Ranking

// region:    --- Engine Views
impl ReservationEngine {
    /// 소유자이거나 승인된 구매자인지
    async fn can_view_full_pickup(&self, item: &Item, user_id: &str) -> MarketResult<bool> {
        if item.is_owned_by(user_id) {
            return Ok(true);
        }
        let approval = self.stores.approvals.find_by_buyer(&item.id, user_id).await?;
        Ok(approval.map_or(false, |a| a.status == ApprovalStatus::Approved))
    }

    /// 픽업 장소 안내 (읽기 전용)
    pub async fn request_pickup_options(
        &self,
        item_id: &str,
        user_id: &str,
        query: &PickupQuery,
    ) -> MarketResult<Vec<PickupOption>> {
        let item = self.load_item(item_id).await?;
        if item.pickup_locations.is_empty() {
            return Ok(Vec::new());
        }

        let full_details = self.can_view_full_pickup(&item, user_id).await?;
        Ok(rank_locations(
            &item.pickup_locations,
            query,
            full_details,
            self.policy.max_pickup_locations,
        ))
    }

    /// 역할별 물품 접근 정보
    /// 판매자: 모든 승인 요청과 채팅방 id. 구매자: 본인 승인 상태와 승인 시 채팅방 id.
    pub async fn item_access(&self, item_id: &str, user_id: &str) -> MarketResult<ItemAccess> {
        let item = self.load_item(item_id).await?;
        let stores = &self.stores;

        let mut access = ItemAccess {
            role: "viewer",
            approval_status: None,
            approvals: Vec::new(),
            chat_id: None,
            pickup_locations: Vec::new(),
        };

        if item.is_owned_by(user_id) {
            access.role = "seller";
            for approval in stores.approvals.list_by_seller(item_id, user_id).await? {
                let buyer_name = match stores.users.find_by_id(&approval.buyer_id).await? {
                    Some(buyer) => buyer.display_name(),
                    None => approval.buyer_id.clone(),
                };
                let chat_id = stores
                    .chats
                    .find_by_participants(item_id, &approval.buyer_id, &approval.seller_id)
                    .await?
                    .map(|chat| chat.id);
                access.approvals.push(ApprovalView {
                    buyer_id: approval.buyer_id,
                    buyer_name,
                    status: approval.status,
                    updated_at: approval.updated_at,
                    chat_id,
                });
            }
        } else if let Some(approval) = stores.approvals.find_by_buyer(item_id, user_id).await? {
            access.approval_status = Some(approval.status);
            if approval.status == ApprovalStatus::Approved {
                if let Some(seller_id) = item.owner_id.as_deref() {
                    access.chat_id = stores
                        .chats
                        .find_by_participants(item_id, user_id, seller_id)
                        .await?
                        .map(|chat| chat.id);
                }
            }
        }

        let full_details =
            access.role == "seller" || access.approval_status == Some(ApprovalStatus::Approved);
        access.pickup_locations = item
            .pickup_locations
            .iter()
            .map(|loc| PickupOption::from_location(loc, full_details, None))
            .collect();

        Ok(access)
    }
}
// endregion: --- Engine Views
