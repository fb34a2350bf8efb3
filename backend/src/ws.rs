use actix_web::{HttpRequest, HttpResponse, web};
use actix_ws::{AggregatedMessage, AggregatedMessageStream, CloseCode, ProtocolError, Session};
use futures_util::StreamExt;
use shared::{EmotionResult, FrameRequest};
use uuid::Uuid;

use crate::config::LimitsConfig;
use crate::decode::{DecodeError, decode_frame};
use crate::model::{ClassificationError, ModelAdapter};
use crate::response::{error_body, frame_reply};
use crate::state::Models;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Aucune image reçue (clé 'frame' manquante)")]
    MissingFrame,
    #[error("Message JSON invalide : {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Message binaire non UTF-8 : {0}")]
    NotUtf8(#[from] std::str::Utf8Error),
    #[error("Message trop volumineux (limite : {0} octets)")]
    TooLarge(usize),
    #[error("Message WebSocket invalide : {0}")]
    Protocol(ProtocolError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Classification(#[from] ClassificationError),
}

pub async fn emotion_socket(
    req: HttpRequest,
    body: web::Payload,
    models: web::Data<Models>,
    limits: web::Data<LimitsConfig>,
) -> Result<HttpResponse, actix_web::Error> {
    let (response, session, messages) = actix_ws::handle(&req, body)?;
    let max_bytes = limits.max_message_bytes;
    let messages = messages
        .max_frame_size(max_bytes)
        .aggregate_continuations()
        .max_continuation_size(max_bytes);
    actix_web::rt::spawn(run_session(
        models.stream.clone(),
        session,
        messages,
        max_bytes,
    ));
    Ok(response)
}

/// One message at a time, in arrival order. Errors are answered, never fatal to the connection,
/// except protocol violations which leave the stream unreadable.
async fn run_session(
    adapter: ModelAdapter,
    mut session: Session,
    mut messages: AggregatedMessageStream,
    max_bytes: usize,
) {
    let connection_id = Uuid::new_v4();
    log::info!("[{}] emotion stream opened", connection_id);

    while let Some(message) = messages.next().await {
        let reply = match message {
            Ok(AggregatedMessage::Text(text)) => handle_frame(connection_id, &adapter, &text).await,
            Ok(AggregatedMessage::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => handle_frame(connection_id, &adapter, text).await,
                Err(e) => {
                    let err = FrameError::from(e);
                    log::warn!("[{}] rejected frame: {}", connection_id, err);
                    error_body(&err.to_string())
                }
            },
            Ok(AggregatedMessage::Ping(bytes)) => {
                if session.pong(&bytes).await.is_err() {
                    return;
                }
                continue;
            }
            Ok(AggregatedMessage::Pong(_)) => continue,
            Ok(AggregatedMessage::Close(reason)) => {
                log::info!("[{}] emotion stream closed by client", connection_id);
                let _ = session.close(reason).await;
                return;
            }
            Err(e) => {
                let (err, code) = match e {
                    ProtocolError::Overflow => (FrameError::TooLarge(max_bytes), CloseCode::Size),
                    other => (FrameError::Protocol(other), CloseCode::Protocol),
                };
                log::warn!("[{}] websocket protocol error: {}", connection_id, err);
                let _ = session.text(error_body(&err.to_string())).await;
                let _ = session.close(Some(code.into())).await;
                return;
            }
        };

        if session.text(reply).await.is_err() {
            log::info!("[{}] emotion stream ended", connection_id);
            return;
        }
    }

    log::info!("[{}] emotion stream ended", connection_id);
    let _ = session.close(None).await;
}

/// Analyzes one `{"frame": ...}` message and returns the reply text.
pub async fn handle_frame(connection_id: Uuid, adapter: &ModelAdapter, text: &str) -> String {
    let outcome = analyze_frame(adapter, text).await;
    match &outcome {
        Ok(result) => log::debug!("[{}] frame -> {}", connection_id, result.dominant_emotion),
        Err(FrameError::Classification(e)) => {
            log::error!("[{}] {} backend failed: {}", connection_id, adapter.backend_name(), e)
        }
        Err(e) => log::warn!("[{}] rejected frame: {}", connection_id, e),
    }
    frame_reply(&outcome)
}

async fn analyze_frame(adapter: &ModelAdapter, text: &str) -> Result<EmotionResult, FrameError> {
    let request: FrameRequest = serde_json::from_str(text)?;
    let frame = request
        .frame
        .filter(|f| !f.is_empty())
        .ok_or(FrameError::MissingFrame)?;
    let image = decode_frame(&frame)?;
    Ok(adapter.classify(&image).await?)
}
