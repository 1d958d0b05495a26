//! Gateway server: REST chat endpoints plus a WebSocket with live trace events

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use bizdesk_core::{ChatError, ChatOutcome, ChatPipeline};

use crate::auth::BearerAuth;
use crate::events::{self, EventBus, Outbox};
use crate::protocol::{
    self, ERR_INTERNAL, ERR_INVALID_METHOD, ERR_INVALID_PARAMS, GatewayEvent, GatewayRequest,
    GatewayResponse,
};
use crate::session::{DEFAULT_SESSION, SessionManager};

#[derive(Clone)]
pub struct GatewayState {
    pub pipeline: Arc<ChatPipeline>,
    pub sessions: Arc<SessionManager>,
    pub events: EventBus,
    pub auth: Arc<BearerAuth>,
    pub start_time: Instant,
}

impl GatewayState {
    /// Sessions are capped at the pipeline's thread-memory `max_threads`
    pub fn new(pipeline: Arc<ChatPipeline>, auth_token: &str) -> Self {
        let max_sessions = pipeline.memory().config().max_threads;
        Self {
            pipeline,
            sessions: Arc::new(SessionManager::with_capacity(max_sessions)),
            events: EventBus::new(256),
            auth: Arc::new(BearerAuth::new(auth_token)),
            start_time: Instant::now(),
        }
    }

    async fn status(&self) -> Value {
        let app = self.pipeline.app();
        json!({
            "status": "ok",
            "app": app.title,
            "routing": app.mode.as_str(),
            "specialists": app.specialist_ids(),
            "sessions": self.sessions.count().await,
            "connected_clients": self.events.subscriber_count(),
            "uptime_secs": self.start_time.elapsed().as_secs(),
        })
    }

    /// Count the message on its session and announce sessions seen for the first time
    async fn note_message(&self, session_id: &str, content: &str) {
        let (session, created) = self.sessions.record_message(session_id, content).await;
        if created {
            self.events.publish(GatewayEvent::new(
                protocol::events::SESSION_CREATED,
                serde_json::to_value(&session).unwrap_or_default(),
            ));
        }
    }
}

pub struct GatewayServer {
    state: GatewayState,
    bind: SocketAddr,
}

impl GatewayServer {
    pub fn new(bind: SocketAddr, pipeline: Arc<ChatPipeline>, auth_token: &str) -> Self {
        Self {
            state: GatewayState::new(pipeline, auth_token),
            bind,
        }
    }

    pub fn state(&self) -> &GatewayState {
        &self.state
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Bind and serve until `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind).await?;
        serve(listener, self.state, shutdown).await
    }
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/status", get(status_handler))
        .route("/api/sessions", get(sessions_handler))
        .route("/api/chat", post(chat_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(
    listener: TcpListener,
    state: GatewayState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!(
        "{} gateway listening on {}",
        state.pipeline.app().title,
        listener.local_addr()?
    );
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    info!("Gateway stopped");
    Ok(())
}

fn status_code(err: &ChatError) -> StatusCode {
    match err {
        ChatError::EmptyMessage => StatusCode::BAD_REQUEST,
        ChatError::SpecialistUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ChatError::SupervisorTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        ChatError::Supervisor(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn chat_error_response(err: &ChatError) -> Response {
    (
        status_code(err),
        Json(json!({
            "error": err.kind(),
            "detail": err.to_string(),
            "final_reply": err.user_reply(),
            "trace": [],
        })),
    )
        .into_response()
}

// ── HTTP handlers ──

async fn status_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(state.status().await)
}

async fn sessions_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, StatusCode> {
    if !state.auth.allows(&headers, None) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(json!({ "sessions": state.sessions.list().await })))
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

async fn chat_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(body): Json<ChatBody>,
) -> Response {
    if !state.auth.allows(&headers, None) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if body.message.trim().is_empty() {
        return chat_error_response(&ChatError::EmptyMessage);
    }
    let thread_id = body
        .thread_id
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    state.note_message(&thread_id, &body.message).await;
    match state.pipeline.chat(&thread_id, &body.message).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => chat_error_response(&e),
    }
}

// ── WebSocket ──

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    if !state.auth.allows(&headers, query.get("token").map(String::as_str)) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    info!("WebSocket connection from {}", addr);
    ws.on_upgrade(move |socket| handle_ws(socket, state, addr))
}

async fn handle_ws(socket: WebSocket, state: GatewayState, addr: SocketAddr) {
    let (mut sink, mut stream) = socket.split();
    let (out, mut outbox) = mpsc::unbounded_channel::<String>();
    let mut bus = state.events.subscribe();

    // Single writer. Bus events first, so a session.created precedes the frames it caused.
    let writer = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                biased;
                event = bus.recv() => match event {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(_) => continue,
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client {} lagged by {} events", addr, n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                frame = outbox.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.as_str().to_string(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("WebSocket error from {}: {}", addr, e);
                break;
            }
        };

        // Requests run concurrently; a slow chat must not block status.get
        let state = state.clone();
        let out = out.clone();
        tokio::spawn(async move {
            let response = handle_request(&state, &text, &out).await;
            match serde_json::to_string(&response) {
                Ok(json) => {
                    let _ = out.send(json);
                }
                Err(e) => warn!("Failed to serialize response: {}", e),
            }
        });
    }

    drop(out);
    writer.abort();
    info!("Client {} disconnected", addr);
}

/// Answer one WebSocket request. Events for it go to `out` before the response.
pub async fn handle_request(state: &GatewayState, raw: &str, out: &Outbox) -> GatewayResponse {
    let req: GatewayRequest = match serde_json::from_str(raw) {
        Ok(r) => r,
        Err(e) => {
            return GatewayResponse::err(None, ERR_INVALID_PARAMS, format!("Invalid JSON: {}", e));
        }
    };
    let id = req.id.clone();
    let param = |key: &str| req.params.get(key).and_then(|v| v.as_str());
    debug!("Gateway request {}", req.method);

    match req.method.as_str() {
        protocol::methods::STATUS_GET => GatewayResponse::ok(id, state.status().await),

        protocol::methods::SESSION_LIST => GatewayResponse::ok(
            id,
            serde_json::to_value(state.sessions.list().await).unwrap_or_default(),
        ),

        protocol::methods::SESSION_NEW => {
            let session = state.sessions.create(param("name")).await;
            let value = serde_json::to_value(&session).unwrap_or_default();
            state.events.publish(GatewayEvent::new(
                protocol::events::SESSION_CREATED,
                value.clone(),
            ));
            GatewayResponse::ok(id, value)
        }

        protocol::methods::SESSION_HISTORY => {
            let session_id = param("session_id").unwrap_or(DEFAULT_SESSION);
            if state.sessions.get(session_id).await.is_none() {
                return GatewayResponse::err(
                    id,
                    ERR_INVALID_PARAMS,
                    format!("Session '{}' not found", session_id),
                );
            }
            match state.pipeline.memory().load(session_id).await {
                Ok(thread) => GatewayResponse::ok(
                    id,
                    json!({
                        "session_id": session_id,
                        "summary": thread.summary,
                        "messages": thread.messages,
                    }),
                ),
                Err(e) => GatewayResponse::err(id, ERR_INTERNAL, e.to_string()),
            }
        }

        protocol::methods::MESSAGE_SEND => {
            let session_id = param("session_id").unwrap_or(DEFAULT_SESSION).to_string();
            let content = match param("content") {
                Some(c) if !c.trim().is_empty() => c.to_string(),
                _ => {
                    return GatewayResponse::err(
                        id,
                        ERR_INVALID_PARAMS,
                        "Missing or empty 'content' parameter",
                    );
                }
            };
            match send_message(state, &session_id, &content, out).await {
                Ok(outcome) => {
                    GatewayResponse::ok(id, serde_json::to_value(&outcome).unwrap_or_default())
                }
                Err(e) => GatewayResponse::chat_failed(id, e.kind(), e.user_reply()),
            }
        }

        other => GatewayResponse::err(id, ERR_INVALID_METHOD, format!("Unknown method: {}", other)),
    }
}

async fn send_message(
    state: &GatewayState,
    session_id: &str,
    content: &str,
    out: &Outbox,
) -> Result<ChatOutcome, ChatError> {
    state.note_message(session_id, content).await;
    let session = json!({ "session_id": session_id });
    events::emit(out, &GatewayEvent::new(protocol::events::TYPING_START, session.clone()));

    let (live, trace) = mpsc::unbounded_channel();
    let relay = events::forward_trace(session_id.to_string(), trace, out.clone());
    let result = state
        .pipeline
        .chat_with_events(session_id, content, Some(live))
        .await;
    // The pipeline has dropped its sender, so the relay drains and ends
    let _ = relay.await;

    events::emit(out, &GatewayEvent::new(protocol::events::TYPING_STOP, session));
    if let Ok(outcome) = &result {
        events::emit(
            out,
            &GatewayEvent::new(
                protocol::events::MESSAGE_RECEIVED,
                json!({
                    "session_id": session_id,
                    "role": "assistant",
                    "content": outcome.final_reply,
                    "route": outcome.route,
                }),
            ),
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizdesk_core::apps::finance;
    use bizdesk_core::providers::Step;
    use bizdesk_core::{MemoryConfig, ScriptedProvider, ThreadMemory};
    use bizdesk_store::Store;

    fn state_with(steps: Vec<Step>, token: &str) -> GatewayState {
        state_with_memory(steps, token, MemoryConfig::default())
    }

    fn state_with_memory(steps: Vec<Step>, token: &str, config: MemoryConfig) -> GatewayState {
        let store = Store::open_in_memory().unwrap();
        let memory = Arc::new(ThreadMemory::in_memory(config));
        let pipeline = ChatPipeline::local(
            &finance::APP,
            Arc::new(ScriptedProvider::new(steps)),
            &store,
            memory,
        );
        GatewayState::new(Arc::new(pipeline), token)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<GatewayEvent> {
        let mut events = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            events.push(serde_json::from_str(&frame).unwrap());
        }
        events
    }

    #[tokio::test]
    async fn test_status_and_unknown_method() {
        let state = state_with(vec![], "");
        let (out, _rx) = mpsc::unbounded_channel();

        let resp = handle_request(&state, r#"{"method":"status.get","id":"1"}"#, &out).await;
        let result = resp.result.unwrap();
        assert_eq!(result["app"], "FinReport");
        assert_eq!(result["routing"], "keyword");
        assert_eq!(result["specialists"].as_array().unwrap().len(), 3);

        let resp = handle_request(&state, r#"{"method":"nope"}"#, &out).await;
        assert_eq!(resp.error.unwrap().code, ERR_INVALID_METHOD);

        let resp = handle_request(&state, "not json", &out).await;
        assert_eq!(resp.error.unwrap().code, ERR_INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_message_send_streams_events() {
        let state = state_with(vec![Step::text("Cash on hand is 120,000.")], "");
        let (out, mut rx) = mpsc::unbounded_channel();

        let resp = handle_request(
            &state,
            r#"{"method":"message.send","params":{"content":"What is our cash position?","session_id":"t1"},"id":"m1"}"#,
            &out,
        )
        .await;
        let result = resp.result.unwrap();
        assert_eq!(result["final_reply"], "Cash on hand is 120,000.");
        assert_eq!(result["route"]["to"], "cash_agent");

        let names: Vec<String> = drain(&mut rx).into_iter().map(|e| e.event).collect();
        assert_eq!(
            names,
            vec![
                protocol::events::TYPING_START,
                protocol::events::ROUTE_DECIDED,
                protocol::events::TYPING_STOP,
                protocol::events::MESSAGE_RECEIVED,
            ]
        );

        let resp = handle_request(
            &state,
            r#"{"method":"session.history","params":{"session_id":"t1"}}"#,
            &out,
        )
        .await;
        let history = resp.result.unwrap();
        assert_eq!(history["messages"].as_array().unwrap().len(), 2);
        assert_eq!(history["messages"][1]["content"], "Cash on hand is 120,000.");
    }

    #[tokio::test]
    async fn test_message_send_validation() {
        let state = state_with(vec![], "");
        let (out, _rx) = mpsc::unbounded_channel();
        let resp = handle_request(
            &state,
            r#"{"method":"message.send","params":{"content":"   "}}"#,
            &out,
        )
        .await;
        assert_eq!(resp.error.unwrap().code, ERR_INVALID_PARAMS);

        let resp = handle_request(
            &state,
            r#"{"method":"session.history","params":{"session_id":"ghost"}}"#,
            &out,
        )
        .await;
        assert!(resp.error.unwrap().message.contains("ghost"));
    }

    #[tokio::test]
    async fn test_chat_failure_carries_final_reply() {
        // Specialist LLM fails, so the whole turn errors out
        let state = state_with(vec![Step::fail("model down")], "");
        let (out, _rx) = mpsc::unbounded_channel();
        let resp = handle_request(
            &state,
            r#"{"method":"message.send","params":{"content":"show the cash flow"}}"#,
            &out,
        )
        .await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, protocol::ERR_CHAT_FAILED);
        assert_eq!(err.message, "SupervisorGraphError");
        assert!(err.final_reply.unwrap().contains("internal processing error"));
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_rest_chat() {
        let state = state_with(vec![Step::text("Budget is on track.")], "");
        let resp = chat_handler(
            State(state.clone()),
            HeaderMap::new(),
            Json(ChatBody {
                message: "budget variance for marketing".into(),
                thread_id: Some("rest-1".into()),
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["thread_id"], "rest-1");
        assert_eq!(body["route"]["label"], "Budget");
        assert!(state.sessions.get("rest-1").await.is_some());

        let resp = chat_handler(
            State(state),
            HeaderMap::new(),
            Json(ChatBody {
                message: " ".into(),
                thread_id: None,
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "InvalidInput");
        assert_eq!(body["trace"], json!([]));
    }

    #[tokio::test]
    async fn test_rest_sessions_bounded_by_thread_memory() {
        let config = MemoryConfig {
            max_threads: 4,
            ..MemoryConfig::default()
        };
        let steps = (0..8).map(|i| Step::text(format!("Variance report {}", i))).collect();
        let state = state_with_memory(steps, "", config);
        assert_eq!(state.sessions.capacity().await, 4);

        for _ in 0..8 {
            let resp = chat_handler(
                State(state.clone()),
                HeaderMap::new(),
                Json(ChatBody {
                    message: "budget variance for marketing".into(),
                    thread_id: None,
                }),
            )
            .await;
            assert_eq!(resp.status(), StatusCode::OK);
            assert!(state.sessions.count().await <= 4);
        }
        assert_eq!(state.sessions.count().await, 4);
    }

    #[tokio::test]
    async fn test_rest_requires_token() {
        let state = state_with(vec![], "tok");
        let resp = chat_handler(
            State(state.clone()),
            HeaderMap::new(),
            Json(ChatBody {
                message: "hi there".into(),
                thread_id: None,
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(sessions_handler(State(state), HeaderMap::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_websocket_roundtrip() {
        use tokio_tungstenite::tungstenite::Message as WsMessage;

        let state = state_with(vec![Step::text("Runway is 14 months.")], "");
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, state, async {
            let _ = stop_rx.await;
        }));

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .unwrap();
        ws.send(WsMessage::Text(
            r#"{"method":"message.send","params":{"content":"How long is our cash runway?","session_id":"w1"},"id":"x"}"#.into(),
        ))
        .await
        .unwrap();

        let mut seen = Vec::new();
        let response = loop {
            let frame = ws.next().await.unwrap().unwrap();
            let value: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
            if let Some(event) = value.get("event").and_then(|e| e.as_str()) {
                seen.push(event.to_string());
                continue;
            }
            break value;
        };
        assert_eq!(response["id"], "x");
        assert_eq!(response["result"]["final_reply"], "Runway is 14 months.");
        assert!(seen.contains(&protocol::events::SESSION_CREATED.to_string()));
        assert!(seen.contains(&protocol::events::ROUTE_DECIDED.to_string()));
        assert_eq!(seen.last().map(String::as_str), Some(protocol::events::MESSAGE_RECEIVED));

        let _ = stop_tx.send(());
        drop(ws);
        let _ = server.await;
    }
}
