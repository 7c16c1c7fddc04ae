// region:    --- Imports
use super::ReservationEngine;
use crate::error::MarketResult;
use crate::marketplace::model::Item;
use crate::store::ItemFilter;
use chrono::Duration;
use tracing::{error, info};

// endregion: --- Imports

/// 남은 노출 일수 (반올림, 최소 1일)
pub fn carousel_days_left(window: Duration, age: Duration) -> i64 {
    let seconds_left = (window - age).num_seconds().max(0);
    let days = (seconds_left as f64 / Duration::days(1).num_seconds() as f64).round() as i64;
    days.max(1)
}

// region:    --- Carousel
impl ReservationEngine {
    /// 최신 물품 캐러셀 (판매 완료 제외, 등록 시점 무관)
    /// 종료 임박 알림을 함께 처리한다.
    pub async fn carousel(&self) -> MarketResult<Vec<Item>> {
        self.sweep_quietly().await;

        let filter = ItemFilter {
            exclude_sold: true,
            newest_first: true,
            limit: Some(self.policy.carousel_size),
            ..ItemFilter::default()
        };
        let items = self.stores.items.find_many(&filter).await?;

        if let Err(e) = self.run_carousel_exit_notices().await {
            error!("{:<12} --> 캐러셀 종료 알림 실패: {}", "Carousel", e);
        }

        Ok(items)
    }

    /// 노출 기간 종료 임박 물품의 소유자에게 한 번만 알림
    /// 플래그를 먼저 세운 호출만 알림을 보낸다.
    pub async fn run_carousel_exit_notices(&self) -> MarketResult<usize> {
        let now = self.clock.now();
        let added_after = now - self.policy.carousel_window;
        let added_up_to = now - self.policy.carousel_notice_age();

        let candidates = self
            .stores
            .items
            .find_carousel_exit_candidates(added_after, added_up_to)
            .await?;

        let mut sent = 0;
        for item in candidates {
            let Some(owner_id) = item.owner_id.clone() else {
                continue;
            };
            if !self
                .stores
                .items
                .mark_carousel_exit_notified(&item.id, now)
                .await?
            {
                continue;
            }

            let days_left = carousel_days_left(self.policy.carousel_window, item.age(now));
            info!(
                "{:<12} --> 캐러셀 종료 알림 item: {}, 남은 일수: {}",
                "Carousel", item.id, days_left
            );
            self.notifier
                .carousel_exit_soon(&item, &owner_id, days_left)
                .await;
            sent += 1;
        }

        Ok(sent)
    }
}
// endregion: --- Carousel
