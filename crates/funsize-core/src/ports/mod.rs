//! Ports - 抽象化レイヤー
//!
//! 外部システム（Update-Metadata サービス、メッセージキュー、スケジューラ）
//! への境界をここで trait として定義し、実装の詳細を隠蔽します。

pub mod clock;
pub mod event_source;
pub mod graph_submitter;
pub mod id_generator;
pub mod release_catalog;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_source::{Delivery, EventSource, SourceError};
pub use self::graph_submitter::{GraphSubmitter, SubmissionReceipt, SubmitError};
pub use self::id_generator::{IdGenerator, StableIdGenerator, UlidGenerator};
pub use self::release_catalog::{BuildDescriptor, CatalogError, CompleteUpdate, ReleaseCatalog};
