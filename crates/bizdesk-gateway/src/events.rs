//! Event delivery: a broadcast bus for all clients and a per-socket outbox

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use bizdesk_core::TraceEvent;

use crate::protocol::GatewayEvent;

/// Serialized frames queued for one socket
pub type Outbox = mpsc::UnboundedSender<String>;

/// Queue `event` on one socket; a closed socket drops it
pub fn emit(out: &Outbox, event: &GatewayEvent) {
    match serde_json::to_string(event) {
        Ok(json) => {
            let _ = out.send(json);
        }
        Err(e) => error!("Failed to serialize event {}: {}", event.event, e),
    }
}

/// Relay live trace events of one chat turn to the socket that asked.
/// Ends when the pipeline drops its sender.
pub fn forward_trace(
    session_id: String,
    mut trace: mpsc::UnboundedReceiver<TraceEvent>,
    out: Outbox,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(step) = trace.recv().await {
            if let Some(event) = GatewayEvent::from_trace(&session_id, &step) {
                emit(&out, &event);
            }
        }
    })
}

/// Events every connected client sees, such as new sessions
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GatewayEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: GatewayEvent) {
        let receivers = self.sender.receiver_count();
        if receivers > 0 {
            debug!("Publishing '{}' to {} client(s)", event.event, receivers);
            let _ = self.sender.send(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::events;
    use serde_json::json;

    #[tokio::test]
    async fn test_forward_trace_skips_replies() {
        let (out, mut frames) = mpsc::unbounded_channel();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = forward_trace("s1".into(), rx, out);

        tx.send(TraceEvent::route("Cash Flow", "keyword")).unwrap();
        tx.send(TraceEvent::tool_result("cash_agent", "get_cash_position", "{}")).unwrap();
        tx.send(TraceEvent::reply("cash_agent", "done")).unwrap();
        drop(tx);
        task.await.unwrap();

        let first: GatewayEvent = serde_json::from_str(&frames.recv().await.unwrap()).unwrap();
        assert_eq!(first.event, events::ROUTE_DECIDED);
        assert_eq!(first.data["to"], "Cash Flow");
        let second: GatewayEvent = serde_json::from_str(&frames.recv().await.unwrap()).unwrap();
        assert_eq!(second.event, events::TOOL_RESULT);
        assert!(frames.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_bus() {
        let bus = EventBus::new(8);
        bus.publish(GatewayEvent::new("nobody.listens", json!({})));
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        bus.publish(GatewayEvent::new(events::SESSION_CREATED, json!({"id": "x"})));
        assert_eq!(rx.recv().await.unwrap().data["id"], "x");
    }
}
