// region:    --- Imports
use secondhand_market::chat::{ChatGate, ChatHub};
use secondhand_market::clock::{Clock, SystemClock};
use secondhand_market::config::{AppConfig, StoreBackend};
use secondhand_market::database::DatabaseManager;
use secondhand_market::handlers::{build_router, AppState};
use secondhand_market::message_broker::KafkaManager;
use secondhand_market::notification::{
    KafkaNotificationSink, LogNotificationSink, NotificationSink, Notifier,
};
use secondhand_market::reservation::ReservationEngine;
use secondhand_market::scheduler::ReservationScheduler;
use secondhand_market::store::Stores;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
// endregion: --- Imports

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    let config = AppConfig::from_env()?;
    let policy = config.policy.clone();

    // 저장소 선택
    let stores = match config.store_backend {
        StoreBackend::Postgres => {
            let db_manager = DatabaseManager::new(&config).await?;

            // 스키마 초기화 (시작 시 한 번)
            if let Err(e) = db_manager.initialize_schema(config.db_init_attempts).await {
                error!("{:<12} --> 데이터베이스 초기화 실패: {:?}", "Main", e);
                return Err(e.into());
            }
            info!("{:<12} --> 데이터베이스 초기화 성공", "Main");
            Stores::postgres(db_manager.get_pool(), policy.max_pickup_locations)
        }
        StoreBackend::Memory => {
            warn!("{:<12} --> 메모리 저장소 사용 (재시작 시 데이터 유실)", "Main");
            Stores::in_memory(policy.max_pickup_locations)
        }
    };

    // 알림 싱크 선택
    let sink: Arc<dyn NotificationSink> = match &config.kafka_brokers {
        Some(brokers) => {
            let kafka_manager = KafkaManager::new(brokers)?;
            if let Err(e) = kafka_manager
                .create_topic(&config.notification_topic, 3, 1)
                .await
            {
                warn!("{:<12} --> 알림 토픽 생성 실패: {}", "Main", e);
            }
            info!("{:<12} --> Kafka 알림 싱크 사용", "Main");
            Arc::new(KafkaNotificationSink::new(
                kafka_manager.get_producer(),
                config.notification_topic.clone(),
            ))
        }
        None => {
            info!("{:<12} --> KAFKA_BROKERS 미설정: 로그 알림 싱크 사용", "Main");
            Arc::new(LogNotificationSink)
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let notifier = Notifier::new(sink, Arc::clone(&stores.users));
    let engine = ReservationEngine::new(
        stores.clone(),
        notifier.clone(),
        Arc::clone(&clock),
        policy.clone(),
    );
    let chat = ChatGate::new(stores, ChatHub::new(), clock, policy);

    // 주기적 만료 스윕 + 승인 정리
    let scheduler = ReservationScheduler::new(
        engine.clone(),
        std::time::Duration::from_secs(config.sweep_interval_secs),
        chrono::Duration::seconds(config.reconcile_grace_secs),
    );
    scheduler.start();

    let routes_all = build_router(AppState::new(engine, chat));

    // 리스너 생성
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    // 서버 실행
    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    notifier.flush().await;
    Ok(())
}
// endregion: --- Main
