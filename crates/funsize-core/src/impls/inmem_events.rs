//! InMemoryEventSource - 開発・テスト用のイベントキュー
//!
//! # 実装詳細
//! - tokio の unbounded mpsc で FIFO を表現
//! - close() で送信側を落とすと、残りを流し切った後に `None` を返す
//! - ack 数を数える（「必ず ack される」ことのテスト用）

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::ports::{Delivery, EventSource, SourceError};

struct Message {
    routing_key: String,
    body: Vec<u8>,
}

pub struct InMemoryDelivery {
    message: Message,
    acked: Arc<AtomicUsize>,
}

impl Delivery for InMemoryDelivery {
    fn routing_key(&self) -> &str {
        &self.message.routing_key
    }

    fn body(&self) -> &[u8] {
        &self.message.body
    }

    fn ack(self: Box<Self>) -> Result<(), SourceError> {
        self.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct InMemoryEventSource {
    tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>,
    acked: Arc<AtomicUsize>,
}

impl InMemoryEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
            acked: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Enqueues a message. Messages pushed after `close()` are dropped.
    pub fn push(&self, routing_key: &str, body: Vec<u8>) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = tx.as_ref() {
            // receiver lives as long as self
            let _ = tx.send(Message {
                routing_key: routing_key.to_string(),
                body,
            });
        }
    }

    /// No more messages will arrive; consumers see `None` once drained.
    pub fn close(&self) {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn acked(&self) -> usize {
        self.acked.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryEventSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl EventSource for InMemoryEventSource {
    async fn next_delivery(&self) -> Result<Option<Box<dyn Delivery>>, SourceError> {
        let message = self.rx.lock().await.recv().await;
        Ok(message.map(|message| {
            Box::new(InMemoryDelivery {
                message,
                acked: self.acked.clone(),
            }) as Box<dyn Delivery>
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fifo_then_none_after_close() {
        let source = InMemoryEventSource::new();
        source.push("a", b"1".to_vec());
        source.push("b", b"2".to_vec());
        source.close();
        source.push("c", b"3".to_vec());

        let first = source.next_delivery().await.unwrap().unwrap();
        assert_eq!(first.routing_key(), "a");
        assert_eq!(first.body(), b"1");
        first.ack().unwrap();

        let second = source.next_delivery().await.unwrap().unwrap();
        assert_eq!(second.routing_key(), "b");
        assert!(source.next_delivery().await.unwrap().is_none());
        assert_eq!(source.acked(), 1);
    }

    #[tokio::test]
    async fn open_source_waits_for_messages() {
        let source = InMemoryEventSource::new();
        let waited = tokio::time::timeout(Duration::from_millis(50), source.next_delivery()).await;
        assert!(waited.is_err());
    }
}
