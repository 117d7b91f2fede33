//! ReleaseCatalog port - Update-Metadata サービスへの読み取り専用インターフェース
//!
//! # 実装
//! - **UpdateMetadataClient**: reqwest + retry/backoff（本番用）
//! - **InMemoryReleaseCatalog**: テスト・デモ用

use serde::Deserialize;

use crate::domain::errors::ErrorKind;
use crate::domain::event::Locale;

/// Per-platform/per-locale build record of one release.
///
/// Only the complete-update URL is consumed; the rest of the upstream
/// document is ignored on decode.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BuildDescriptor {
    #[serde(default)]
    pub completes: Vec<CompleteUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompleteUpdate {
    #[serde(rename = "fileUrl")]
    pub file_url: Option<String>,
}

impl BuildDescriptor {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            completes: vec![CompleteUpdate {
                file_url: Some(url.into()),
            }],
        }
    }

    /// `completes[0].fileUrl`, if present and non-empty.
    pub fn complete_url(&self) -> Option<&str> {
        self.completes
            .first()
            .and_then(|c| c.file_url.as_deref())
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{url} unavailable after {attempts} attempt(s): {last_error}")]
    Unavailable {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("{url} rejected the request with status {status}")]
    Rejected { url: String, status: u16 },

    #[error("malformed response from {url}: {message}")]
    Malformed { url: String, message: String },

    #[error("catalog client error: {0}")]
    Client(String),
}

impl CatalogError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CatalogError::Unavailable { .. } => ErrorKind::Transient,
            CatalogError::Rejected { .. } | CatalogError::Malformed { .. } => ErrorKind::Malformed,
            CatalogError::Client(_) => ErrorKind::Infrastructure,
        }
    }
}

/// ReleaseCatalog は Update-Metadata サービスの契約
///
/// # 設計原則
/// - 読み取り専用・冪等
/// - 「存在しない」は `Ok(None)`（エラーではない）
/// - 5xx のリトライは実装側の責務
#[async_trait::async_trait]
pub trait ReleaseCatalog: Send + Sync {
    /// Historical nightly release names for `product`/`branch`, most recent
    /// first. `-latest` aliases are never returned.
    async fn list_releases(&self, product: &str, branch: &str)
    -> Result<Vec<String>, CatalogError>;

    /// Build descriptor of `release` for an update platform and locale, or
    /// `None` when that combination was never published.
    async fn get_build(
        &self,
        release: &str,
        update_platform: &str,
        locale: &Locale,
    ) -> Result<Option<BuildDescriptor>, CatalogError>;
}
