// region:    --- Imports
use super::ReservationEngine;
use crate::error::MarketResult;
use crate::marketplace::model::ReservedReason;
use chrono::Duration;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

// endregion: --- Imports

// region:    --- Reports
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// 이번 스윕이 해제한 예약 수
    pub released: usize,
    /// status 가 없어 정규화된 물품 수
    pub normalized: u64,
    /// 구매자별 노쇼 증가분
    pub timeouts: BTreeMap<String, i64>,
    /// 이번 스윕에서 플래그가 세워진 구매자
    pub flagged: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub retried: usize,
    pub reverted: usize,
}
// endregion: --- Reports

// region:    --- Sweep
impl ReservationEngine {
    /// 만료 예약 정리
    /// 해제는 저장소의 단일 조건부 업데이트로 수행되고, 해제된 행만 돌려받으므로
    /// 동시에 실행된 스윕이 같은 예약을 중복 집계하지 않는다.
    pub async fn sweep_expired_reservations(&self) -> MarketResult<SweepReport> {
        let now = self.clock.now();
        let released = self.stores.items.bulk_clear_expired(now).await?;
        if released.is_empty() {
            return Ok(SweepReport::default());
        }

        let mut report = SweepReport {
            released: released.len(),
            ..SweepReport::default()
        };

        // 구매자별 집계 후 구매자당 한 번만 증가
        for hold in &released {
            if hold.reason != Some(ReservedReason::PickupApproval) {
                continue;
            }
            if let Some(buyer_id) = &hold.buyer_id {
                *report.timeouts.entry(buyer_id.clone()).or_insert(0) += 1;
            }
        }

        // 해제는 이미 반영되었으므로 한 구매자의 실패가 다른 구매자의 집계를 막지 않는다
        for (buyer_id, misses) in &report.timeouts {
            let buyer = match self
                .stores
                .users
                .increment_timeout_count(buyer_id, *misses)
                .await
            {
                Ok(Some(buyer)) => buyer,
                Ok(None) => {
                    warn!("{:<12} --> 알 수 없는 구매자: {}", "Sweep", buyer_id);
                    continue;
                }
                Err(e) => {
                    error!(
                        "{:<12} --> 노쇼 카운트 실패 buyer: {}, 누락: {}건: {}",
                        "Sweep", buyer_id, misses, e
                    );
                    continue;
                }
            };
            debug!(
                "{:<12} --> 노쇼 카운트 buyer: {}, count: {}",
                "Sweep", buyer_id, buyer.pickup_timeout_count
            );

            if buyer.pickup_timeout_count < self.policy.no_show_threshold
                || buyer.pickup_timeout_flagged
            {
                continue;
            }
            // 플래그를 실제로 세운 호출만 관리자에게 알린다
            match self.stores.users.set_flagged(buyer_id).await {
                Ok(true) => {
                    warn!(
                        "{:<12} --> 노쇼 반복 구매자 플래그: {} ({}회)",
                        "Sweep", buyer_id, buyer.pickup_timeout_count
                    );
                    self.notifier.buyer_no_show(&buyer).await;
                    report.flagged.push(buyer_id.clone());
                }
                Ok(false) => {}
                Err(e) => {
                    error!("{:<12} --> 플래그 실패 buyer: {}: {}", "Sweep", buyer_id, e);
                }
            }
        }

        report.normalized = match self.stores.items.normalize_missing_status().await {
            Ok(normalized) => normalized,
            Err(e) => {
                error!("{:<12} --> status 정규화 실패: {}", "Sweep", e);
                0
            }
        };
        info!(
            "{:<12} --> 만료 예약 해제: {}건 (정규화: {}건)",
            "Sweep", report.released, report.normalized
        );

        Ok(report)
    }

    /// 읽기 경로용 스윕. 실패해도 읽기는 계속한다.
    pub async fn sweep_quietly(&self) {
        if let Err(e) = self.sweep_expired_reservations().await {
            error!("{:<12} --> 스윕 실패: {}", "Sweep", e);
        }
    }

    /// 승인되었으나 물품 예약이 확인되지 않은 요청 정리
    /// 승인 시각 + 24시간이 아직 남아 있으면 예약을 다시 시도하고, 아니면 pending 으로 되돌린다.
    pub async fn reconcile_approvals(&self, grace: Duration) -> MarketResult<ReconcileReport> {
        let now = self.clock.now();
        let unconfirmed = self.stores.approvals.list_unconfirmed(now - grace).await?;
        let mut report = ReconcileReport::default();

        for approval in unconfirmed {
            let until = approval.updated_at + self.policy.pickup_hold;
            let placed = if until > now {
                self.place_pickup_hold(&approval.item_id, &approval.buyer_id, until, approval.updated_at)
                    .await?
            } else {
                None
            };

            if placed.is_some() {
                self.stores.approvals.mark_hold_placed(approval.id, now).await?;
                info!(
                    "{:<12} --> 승인 예약 재시도 성공 item: {}, buyer: {}",
                    "Reconcile", approval.item_id, approval.buyer_id
                );
                report.retried += 1;
            } else if self
                .stores
                .approvals
                .revert_unconfirmed(approval.id, now)
                .await?
            {
                warn!(
                    "{:<12} --> 승인 되돌림 item: {}, buyer: {}",
                    "Reconcile", approval.item_id, approval.buyer_id
                );
                report.reverted += 1;
            }
        }

        Ok(report)
    }
}
// endregion: --- Sweep
