//
// queue.rs
//
// C9: single-producer, single-consumer publish queue. One task drains
// it; handlers only ever call `start`/`stop`/`enqueue` on a cloneable
// handle (spec §4.9, §9).
//

use std::sync::Arc;

use tokio::sync::mpsc;
use tower_lsp::lsp_types::{Diagnostic, Url};
use tower_lsp::{async_trait, Client};

#[derive(Debug, Clone)]
pub struct Publish {
    pub uri: Url,
    pub diagnostics: Vec<Diagnostic>,
}

/// Abstracts "send this publish to the client" so the consumer task is
/// testable without a live LSP connection.
#[async_trait]
pub trait DiagnosticsSink: Send + Sync + 'static {
    async fn publish(&self, publish: Publish);
}

#[async_trait]
impl DiagnosticsSink for Client {
    async fn publish(&self, publish: Publish) {
        self.publish_diagnostics(publish.uri, publish.diagnostics, None)
            .await;
    }
}

enum Message {
    Start,
    Stop,
    Enqueue(Publish),
}

#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl QueueHandle {
    pub fn start(&self) {
        let _ = self.tx.send(Message::Start);
    }

    pub fn stop(&self) {
        let _ = self.tx.send(Message::Stop);
    }

    pub fn enqueue(&self, publish: Publish) {
        let _ = self.tx.send(Message::Enqueue(publish));
    }

    /// A handle with no running consumer. Useful in tests that only care
    /// about what gets enqueued (via `update_state`'s return value) and
    /// never need a message actually delivered anywhere.
    pub fn noop() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }
}

pub struct PublishQueue;

impl PublishQueue {
    /// Spawns the single consumer task, which buffers `Enqueue` messages
    /// until `Start` arrives (flushing them in order), forwards each
    /// subsequent `Enqueue` straight to `sink`, and exits on `Stop`.
    pub fn spawn(sink: Arc<dyn DiagnosticsSink>) -> QueueHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            let mut started = false;
            let mut pending: Vec<Publish> = Vec::new();

            while let Some(message) = rx.recv().await {
                match message {
                    Message::Start => {
                        started = true;
                        for publish in pending.drain(..) {
                            sink.publish(publish).await;
                        }
                    }
                    Message::Stop => break,
                    Message::Enqueue(publish) => {
                        if started {
                            sink.publish(publish).await;
                        } else {
                            pending.push(publish);
                        }
                    }
                }
            }
        });

        QueueHandle { tx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tower_lsp::lsp_types::Url;

    struct RecordingSink {
        received: Mutex<Vec<Publish>>,
    }

    #[async_trait]
    impl DiagnosticsSink for RecordingSink {
        async fn publish(&self, publish: Publish) {
            self.received.lock().unwrap().push(publish);
        }
    }

    fn publish(name: &str) -> Publish {
        Publish {
            uri: Url::parse(&format!("file:///tmp/wiki/{name}")).unwrap(),
            diagnostics: Vec::new(),
        }
    }

    #[tokio::test]
    async fn messages_before_start_are_buffered_then_flushed_in_order() {
        let sink = Arc::new(RecordingSink {
            received: Mutex::new(Vec::new()),
        });
        let handle = PublishQueue::spawn(sink.clone());

        handle.enqueue(publish("a.md"));
        handle.enqueue(publish("b.md"));
        handle.start();
        handle.enqueue(publish("c.md"));
        handle.stop();

        // Give the consumer task a turn to drain the channel.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let received = sink.received.lock().unwrap();
        let names: Vec<String> = received
            .iter()
            .map(|p| p.uri.path().to_string())
            .collect();
        assert_eq!(names, vec!["/tmp/wiki/a.md", "/tmp/wiki/b.md", "/tmp/wiki/c.md"]);
    }

    #[tokio::test]
    async fn stop_drains_nothing_further() {
        let sink = Arc::new(RecordingSink {
            received: Mutex::new(Vec::new()),
        });
        let handle = PublishQueue::spawn(sink.clone());
        handle.start();
        handle.stop();
        handle.enqueue(publish("late.md"));

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(sink.received.lock().unwrap().is_empty());
    }
}
