//! Implementations - ポートの実装
//!
//! - **UpdateMetadataClient**: reqwest ベースの本番クライアント
//! - **InMemory\***: 開発・テスト・デモ用

pub mod inmem_catalog;
pub mod inmem_events;
pub mod recording_submitter;
pub mod retry;
pub mod update_client;

pub use self::inmem_catalog::InMemoryReleaseCatalog;
pub use self::inmem_events::{InMemoryDelivery, InMemoryEventSource};
pub use self::recording_submitter::RecordingSubmitter;
pub use self::retry::RetryPolicy;
pub use self::update_client::UpdateMetadataClient;
