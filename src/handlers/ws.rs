/// 실시간 채팅 WebSocket
/// 클라이언트 -> 서버: join_chat, send_message
/// 서버 -> 클라이언트: chat_joined, new_message, error
// region:    --- Imports
use super::AppState;
use crate::auth::Actor;
use crate::error::MarketError;
use crate::marketplace::model::ChatMessage;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// endregion: --- Imports

const OUTBOUND_CAPACITY: usize = 64;

// region:    --- Events
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinChat {
        #[serde(rename = "chatId")]
        chat_id: i64,
    },
    SendMessage {
        #[serde(rename = "chatId")]
        chat_id: i64,
        content: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    ChatJoined {
        #[serde(rename = "chatId")]
        chat_id: i64,
    },
    NewMessage {
        message: ChatMessage,
    },
    Error {
        message: String,
    },
}
// endregion: --- Events

// region:    --- Handlers
pub async fn handle_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    actor: Actor,
) -> Response {
    info!("{:<12} --> WebSocket 연결 요청 user: {}", "Socket", actor.user_id);
    ws.on_upgrade(move |socket| handle_socket(socket, actor, state))
}

async fn handle_socket(socket: WebSocket, actor: Actor, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerEvent>(OUTBOUND_CAPACITY);

    // 송신 전용 태스크
    let writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let Ok(json) = serde_json::to_string(&event) else {
                continue;
            };
            if sender.send(Message::Text(json)).await.is_err() {
                debug!("{:<12} --> 클라이언트 연결 종료", "Socket");
                break;
            }
        }
    });

    let mut rooms: HashMap<i64, JoinHandle<()>> = HashMap::new();

    while let Some(Ok(message)) = receiver.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let reply = match serde_json::from_str::<ClientEvent>(&text) {
            Ok(event) => handle_client_event(event, &actor, &state, &out_tx, &mut rooms).await,
            Err(_) => Some(ServerEvent::Error {
                message: "chatId and a known event type are required".to_string(),
            }),
        };
        if let Some(reply) = reply {
            if out_tx.send(reply).await.is_err() {
                break;
            }
        }
    }

    // 전달 태스크가 끝나야 수신자가 drop 된다
    for (chat_id, task) in rooms {
        task.abort();
        let _ = task.await;
        state.chat.hub().release(chat_id);
    }
    writer.abort();
    info!("{:<12} --> WebSocket 연결 종료 user: {}", "Socket", actor.user_id);
}

async fn handle_client_event(
    event: ClientEvent,
    actor: &Actor,
    state: &AppState,
    out_tx: &mpsc::Sender<ServerEvent>,
    rooms: &mut HashMap<i64, JoinHandle<()>>,
) -> Option<ServerEvent> {
    match event {
        ClientEvent::JoinChat { chat_id } => {
            if let Err(e) = state.chat.authorize_join(chat_id, &actor.user_id).await {
                return Some(error_frame(&e));
            }
            if !rooms.contains_key(&chat_id) {
                let receiver = state.chat.hub().subscribe(chat_id);
                rooms.insert(chat_id, forward_room(chat_id, receiver, out_tx.clone()));
            }
            Some(ServerEvent::ChatJoined { chat_id })
        }
        ClientEvent::SendMessage { chat_id, content } => {
            match state
                .chat
                .post_message(chat_id, &actor.user_id, &content)
                .await
            {
                // 구독 중인 연결(본인 포함)에는 허브를 통해 전달된다
                Ok(_) => None,
                Err(e) => Some(error_frame(&e)),
            }
        }
    }
}

fn error_frame(err: &MarketError) -> ServerEvent {
    ServerEvent::Error {
        message: err.client_message(),
    }
}

/// 채팅방 메시지를 이 연결의 송신 채널로 전달
fn forward_room(
    chat_id: i64,
    mut receiver: broadcast::Receiver<ChatMessage>,
    out_tx: mpsc::Sender<ServerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(message) => {
                    if out_tx.send(ServerEvent::NewMessage { message }).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "{:<12} --> 메시지 누락 chat: {}, 건너뜀: {}",
                        "Socket", chat_id, skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
// endregion: --- Handlers
