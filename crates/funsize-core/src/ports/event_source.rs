//! EventSource port - トピック型メッセージキューからの受信
//!
//! トランスポート（AMQP など）はこのクレートの外側。ここでは
//! 「1 件ずつ受け取り、処理後に ack する」契約だけを定義する。

/// One message taken from the queue.
///
/// `ack` consumes the delivery so it cannot be acknowledged twice.
pub trait Delivery: Send + Sync {
    fn routing_key(&self) -> &str;

    fn body(&self) -> &[u8];

    fn ack(self: Box<Self>) -> Result<(), SourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("event source failure: {0}")]
    Transport(String),
}

/// EventSource は topic/wildcard 購読済みのキュー
///
/// `next_delivery` returns `Ok(None)` once the source is exhausted.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    async fn next_delivery(&self) -> Result<Option<Box<dyn Delivery>>, SourceError>;
}
