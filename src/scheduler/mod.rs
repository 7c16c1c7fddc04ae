/// 예약 만료 스케줄러
/// 읽기 요청이 없어도 만료된 예약이 일정 시간 안에 해제되도록 주기적으로 스윕한다.
/// 읽기 경로의 스윕과 동시에 실행되어도 조건부 업데이트로 중복 집계가 없다.
// region:    --- Imports
use crate::reservation::ReservationEngine;
use chrono::Duration as ChronoDuration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

// endregion: --- Imports

// region:    --- Reservation Scheduler
pub struct ReservationScheduler {
    engine: ReservationEngine,
    period: Duration,
    reconcile_grace: ChronoDuration,
}

impl ReservationScheduler {
    pub fn new(engine: ReservationEngine, period: Duration, reconcile_grace: ChronoDuration) -> Self {
        Self {
            engine,
            period,
            reconcile_grace,
        }
    }

    /// 스케줄러 시작
    pub fn start(self) -> JoinHandle<()> {
        info!(
            "{:<12} --> 예약 스케줄러 시작 (주기: {:?})",
            "Scheduler", self.period
        );
        tokio::spawn(async move {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }

    /// 스윕 + 승인 정리 1회
    pub async fn run_once(&self) {
        match self.engine.sweep_expired_reservations().await {
            Ok(report) if report.released > 0 => info!(
                "{:<12} --> 스윕 완료: 해제 {}건, 플래그 {}명",
                "Scheduler",
                report.released,
                report.flagged.len()
            ),
            Ok(_) => debug!("{:<12} --> 만료된 예약 없음", "Scheduler"),
            Err(e) => error!("{:<12} --> 스윕 중 오류 발생: {}", "Scheduler", e),
        }

        match self.engine.reconcile_approvals(self.reconcile_grace).await {
            Ok(report) if report.retried + report.reverted > 0 => info!(
                "{:<12} --> 승인 정리: 재시도 {}건, 되돌림 {}건",
                "Scheduler", report.retried, report.reverted
            ),
            Ok(_) => {}
            Err(e) => error!("{:<12} --> 승인 정리 중 오류 발생: {}", "Scheduler", e),
        }
    }
}
// endregion: --- Reservation Scheduler
