//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{debug, error, info, instrument};

use crate::error::ApiError;
use crate::logic::*;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!(target: "course_wizard", "WebSocket upgrade requested");
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    info!(target: "course_wizard", "WebSocket connected");
    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(txt) => {
                let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
                    Ok(incoming) => {
                        debug!(target: "course_wizard", "WS received: {:?}", &incoming);
                        handle_client_ws(incoming, &state).await
                    }
                    Err(e) => ServerWsMessage::Error {
                        kind: "invalid_input".into(),
                        message: format!("Invalid JSON: {}", e),
                    },
                };

                let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
                    serde_json::json!({ "type": "error", "kind": "internal", "message": format!("Serialization error: {}", e) })
                        .to_string()
                });

                if let Err(e) = socket.send(Message::Text(out)).await {
                    error!(target: "course_wizard", error = %e, "WS send error");
                    break;
                }
            }
            Message::Ping(payload) => {
                let _ = socket.send(Message::Pong(payload)).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    info!(target: "course_wizard", "WebSocket disconnected");
}

fn reply<T>(result: Result<T, ApiError>, ok: impl FnOnce(T) -> ServerWsMessage) -> ServerWsMessage {
    match result {
        Ok(v) => ok(v),
        Err(e) => ServerWsMessage::from(&e),
    }
}

#[instrument(level = "info", skip(state))]
pub(crate) async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
    let wizard = |wizard| ServerWsMessage::Wizard { wizard };
    let view = |view| ServerWsMessage::ModuleView { view };

    match msg {
        ClientWsMessage::Ping => ServerWsMessage::Pong,
        ClientWsMessage::GetWizard => wizard(wizard_snapshot(state).await),
        ClientWsMessage::GetUsage => ServerWsMessage::Usage { usage: usage_snapshot(state) },

        ClientWsMessage::SubmitTopic { topic } => reply(submit_topic(state, &topic).await, wizard),
        ClientWsMessage::SelectPillar { pillar_id } => reply(select_pillar(state, &pillar_id).await, wizard),
        ClientWsMessage::SelectVariation { variation_id } => {
            reply(select_variation(state, &variation_id).await, wizard)
        }
        ClientWsMessage::Back => reply(go_back(state).await, wizard),
        ClientWsMessage::Restart => reply(restart(state).await, wizard),

        ClientWsMessage::GetModuleView => reply(course_view(state).await, view),
        ClientWsMessage::OpenModule { index } => reply(open_module(state, index).await, view),
        ClientWsMessage::SelectAnswer { question, option } => {
            reply(select_answer(state, question, option).await, view)
        }
        ClientWsMessage::CheckAnswer { question } => reply(check_answer(state, question).await, view),

        ClientWsMessage::ExportCourse => reply(export_course(state).await, |bundle| {
            info!(target: "export", file_name = %bundle.file_name, bytes = bundle.bytes.len(), "WS export served");
            ServerWsMessage::Export { file_name: bundle.file_name, archive_base64: STANDARD.encode(&bundle.bytes) }
        }),
    }
}
