// region:    --- Imports
use crate::error::MarketResult;
use crate::marketplace::model::{Item, ItemStatus};
use crate::reservation::ReservationEngine;
use crate::store::ItemFilter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

// endregion: --- Imports

// region:    --- Query Types
/// 물품 검색 조건
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemSearch {
    pub name: Option<String>,
    pub category: Option<String>,
    pub condition: Option<String>,
    pub city: Option<String>,
    pub area: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl From<&ItemSearch> for ItemFilter {
    fn from(search: &ItemSearch) -> Self {
        ItemFilter {
            name_contains: non_empty(&search.name),
            category: non_empty(&search.category),
            condition: non_empty(&search.condition),
            city: non_empty(&search.city),
            area: non_empty(&search.area),
            ..ItemFilter::default()
        }
    }
}

/// 관리자 화면의 소유자 요약
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSummary {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminItemView {
    #[serde(flatten)]
    pub item: Item,
    pub owner: Option<OwnerSummary>,
}
// endregion: --- Query Types

// region:    --- Query Handlers
// 모든 읽기 경로는 만료 예약 스윕을 먼저 수행한다.

/// 물품 검색
pub async fn list_items(engine: &ReservationEngine, search: &ItemSearch) -> MarketResult<Vec<Item>> {
    info!("{:<12} --> 물품 검색 {:?}", "Query", search);
    engine.sweep_quietly().await;
    engine.stores().items.find_many(&ItemFilter::from(search)).await
}

/// 물품 조회
pub async fn get_item(engine: &ReservationEngine, item_id: &str) -> MarketResult<Item> {
    info!("{:<12} --> 물품 조회 id: {}", "Query", item_id);
    engine.sweep_quietly().await;
    engine.load_item(item_id).await
}

/// 최신 물품 캐러셀
pub async fn carousel(engine: &ReservationEngine) -> MarketResult<Vec<Item>> {
    info!("{:<12} --> 캐러셀 조회", "Query");
    engine.carousel().await
}

/// 내 물품
pub async fn my_items(engine: &ReservationEngine, owner_id: &str) -> MarketResult<Vec<Item>> {
    info!("{:<12} --> 내 물품 조회 owner: {}", "Query", owner_id);
    engine.sweep_quietly().await;
    let filter = ItemFilter {
        owner_id: Some(owner_id.to_string()),
        newest_first: true,
        limit: Some(engine.policy().my_items_limit),
        ..ItemFilter::default()
    };
    engine.stores().items.find_many(&filter).await
}

/// 내 예약
pub async fn my_reservations(engine: &ReservationEngine, user_id: &str) -> MarketResult<Vec<Item>> {
    info!("{:<12} --> 내 예약 조회 user: {}", "Query", user_id);
    engine.sweep_quietly().await;
    let filter = ItemFilter {
        reserved_by: Some(user_id.to_string()),
        status: Some(ItemStatus::Reserved),
        ..ItemFilter::default()
    };
    engine.stores().items.find_many(&filter).await
}

/// 관리자: 전체 물품과 소유자 정보
pub async fn admin_all_items(engine: &ReservationEngine) -> MarketResult<Vec<AdminItemView>> {
    info!("{:<12} --> 관리자 전체 물품 조회", "Query");
    engine.sweep_quietly().await;
    let items = engine.stores().items.find_many(&ItemFilter::default()).await?;

    let mut owners: HashMap<String, Option<OwnerSummary>> = HashMap::new();
    let mut views = Vec::with_capacity(items.len());
    for item in items {
        let owner = match item.owner_id.as_deref() {
            Some(owner_id) => {
                if !owners.contains_key(owner_id) {
                    let summary = engine
                        .stores()
                        .users
                        .find_by_id(owner_id)
                        .await?
                        .map(|user| OwnerSummary {
                            id: user.id,
                            email: user.email,
                            first_name: user.first_name,
                            last_name: user.last_name,
                        });
                    owners.insert(owner_id.to_string(), summary);
                }
                owners.get(owner_id).cloned().flatten()
            }
            None => None,
        };
        views.push(AdminItemView { item, owner });
    }
    Ok(views)
}
// endregion: --- Query Handlers
