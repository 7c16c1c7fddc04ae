/// 서비스 설정
/// 환경 변수 (및 .env) 에서 읽어온다.
// region:    --- Imports
use chrono::Duration;
use std::str::FromStr;
use tracing::warn;

// endregion: --- Imports

// region:    --- Reservation Policy
/// 예약/승인 정책 상수
#[derive(Debug, Clone)]
pub struct ReservationPolicy {
    /// 일반 예약(무료 물품) 보류 시간
    pub plain_hold: Duration,
    /// 픽업 승인 예약 보류 시간
    pub pickup_hold: Duration,
    /// 노쇼 플래그 임계값
    pub no_show_threshold: i64,
    /// 캐러셀 노출 기간
    pub carousel_window: Duration,
    /// 캐러셀 종료 알림 선행 시간
    pub carousel_notice_lead: Duration,
    /// 캐러셀 노출 개수
    pub carousel_size: i64,
    /// 픽업 장소 최대 개수
    pub max_pickup_locations: usize,
    /// 채팅 목록 최대 개수
    pub chat_list_limit: i64,
    /// 메시지 조회 최대 개수
    pub message_page_limit: i64,
    /// 내 물품 조회 최대 개수
    pub my_items_limit: i64,
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        Self {
            plain_hold: Duration::hours(10),
            pickup_hold: Duration::hours(24),
            no_show_threshold: 3,
            carousel_window: Duration::days(7),
            carousel_notice_lead: Duration::days(2),
            carousel_size: 15,
            max_pickup_locations: 1,
            chat_list_limit: 50,
            message_page_limit: 200,
            my_items_limit: 100,
        }
    }
}

impl ReservationPolicy {
    /// 알림 대상이 되는 최소 등록 경과 시간 (window - lead)
    pub fn carousel_notice_age(&self) -> Duration {
        self.carousel_window - self.carousel_notice_lead
    }
}
// endregion: --- Reservation Policy

// region:    --- App Config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_init_attempts: u32,
    pub kafka_brokers: Option<String>,
    pub notification_topic: String,
    pub sweep_interval_secs: u64,
    pub reconcile_grace_secs: i64,
    pub policy: ReservationPolicy,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("환경 변수 {0} 가 필요합니다")]
    Missing(&'static str),
    #[error("환경 변수 {0} 의 값이 올바르지 않습니다: {1}")]
    Invalid(&'static str, String),
}

impl AppConfig {
    /// 환경 변수에서 설정 로드
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("{:<12} --> .env 파일을 읽지 못했습니다: {}", "Config", e);
        }

        let store_backend = match std::env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => return Err(ConfigError::Invalid("STORE_BACKEND", other.to_string())),
        };

        let database_url = std::env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let sweep_interval_secs: u64 = parse_var("SWEEP_INTERVAL_SECS", 60)?;
        if sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid("SWEEP_INTERVAL_SECS", "0".to_string()));
        }

        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            store_backend,
            database_url,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 5)?,
            db_init_attempts: parse_var("DB_INIT_ATTEMPTS", 10)?,
            kafka_brokers: std::env::var("KAFKA_BROKERS").ok(),
            notification_topic: std::env::var("NOTIFICATION_TOPIC")
                .unwrap_or_else(|_| "notifications".to_string()),
            sweep_interval_secs,
            reconcile_grace_secs: parse_var("RECONCILE_GRACE_SECS", 120)?,
            policy: ReservationPolicy::default(),
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}
// endregion: --- App Config
