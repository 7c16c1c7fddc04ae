/// 채팅방별 실시간 메시지 팬아웃
// region:    --- Imports
use crate::marketplace::model::ChatMessage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::debug;

// endregion: --- Imports

const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Default)]
pub struct ChatHub {
    rooms: Arc<Mutex<HashMap<i64, broadcast::Sender<ChatMessage>>>>,
}

impl ChatHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn rooms(&self) -> MutexGuard<'_, HashMap<i64, broadcast::Sender<ChatMessage>>> {
        match self.rooms.lock() {
            Ok(rooms) => rooms,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 채팅방 구독 (권한 검사는 호출자가 먼저 수행)
    pub fn subscribe(&self, chat_id: i64) -> broadcast::Receiver<ChatMessage> {
        self.rooms()
            .entry(chat_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// 구독 중인 모든 연결에 전달. 전달된 수신자 수를 반환한다.
    pub fn publish(&self, message: &ChatMessage) -> usize {
        let mut rooms = self.rooms();
        let Some(sender) = rooms.get(&message.chat_id) else {
            return 0;
        };
        match sender.send(message.clone()) {
            Ok(receivers) => {
                debug!(
                    "{:<12} --> 메시지 팬아웃 chat: {}, 수신자: {}",
                    "Hub", message.chat_id, receivers
                );
                receivers
            }
            Err(_) => {
                // 남은 구독자가 없음
                rooms.remove(&message.chat_id);
                0
            }
        }
    }

    /// 구독자가 남지 않은 방을 정리. 정리했으면 true
    pub fn release(&self, chat_id: i64) -> bool {
        let mut rooms = self.rooms();
        match rooms.get(&chat_id) {
            Some(sender) if sender.receiver_count() == 0 => {
                rooms.remove(&chat_id);
                debug!("{:<12} --> 빈 채팅방 정리 chat: {}", "Hub", chat_id);
                true
            }
            _ => false,
        }
    }

    /// 채팅방 삭제 시 구독 정리
    pub fn close(&self, chat_id: i64) {
        self.rooms().remove(&chat_id);
    }
}
