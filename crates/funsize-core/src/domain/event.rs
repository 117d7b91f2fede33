//! Upstream "build finished" events and the canonical `ReleaseEvent`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A locale code such as `en-US` or `de`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locale(String);

impl Locale {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The locale of every non-repack build.
    pub fn en_us() -> Self {
        Self::new("en-US")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Locale {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Fields shared by every upstream job message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHeader {
    pub builder_name: String,
    /// Upstream result code; `0` is success.
    pub result: i64,
}

/// Product/branch/platform triple describing what was built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    pub product: String,
    pub branch: String,
    pub platform: String,
    pub revision: Option<String>,
}

/// Primary (en-US) build of a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleBuildEvent {
    pub header: JobHeader,
    pub target: BuildTarget,
    pub complete_mar_url: Option<String>,
}

/// One-locale repack, the shape older localization jobs report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyRepackEvent {
    pub header: JobHeader,
    pub target: BuildTarget,
    pub locale: Locale,
    pub complete_mar_url: Option<String>,
}

/// Per-locale outcome reported by a batched repack job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleResult {
    pub locale: Locale,
    pub result: String,
}

impl LocaleResult {
    pub fn is_success(&self) -> bool {
        self.result.eq_ignore_ascii_case("success")
    }
}

/// Batched localization repack listing many locales and their results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRepackEvent {
    pub header: JobHeader,
    pub target: BuildTarget,
    /// In upstream order.
    pub locales: Vec<LocaleResult>,
    pub complete_mar_urls: BTreeMap<Locale, String>,
}

/// Upstream event classified by structural shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    SingleBuild(SingleBuildEvent),
    LegacyRepack(LegacyRepackEvent),
    BatchRepack(BatchRepackEvent),
}

impl UpstreamEvent {
    pub fn header(&self) -> &JobHeader {
        match self {
            UpstreamEvent::SingleBuild(e) => &e.header,
            UpstreamEvent::LegacyRepack(e) => &e.header,
            UpstreamEvent::BatchRepack(e) => &e.header,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamEvent::SingleBuild(_) => "single_build",
            UpstreamEvent::LegacyRepack(_) => "legacy_repack",
            UpstreamEvent::BatchRepack(_) => "batch_repack",
        }
    }
}

/// Revision recorded when the upstream job did not report one.
pub const UNKNOWN_REVISION: &str = "unknown";

/// Canonical release event consumed by the resolver.
///
/// Invariant: every locale in `locales` has an entry in `new_artifact_urls`.
/// Construction goes through [`ReleaseEvent::new`], which drops (and reports)
/// locales without one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseEvent {
    product: String,
    branch: String,
    platform: String,
    revision: String,
    locales: Vec<Locale>,
    new_artifact_urls: BTreeMap<Locale, String>,
    chunk_label: String,
}

impl ReleaseEvent {
    /// Build the event, returning it along with the locales that were dropped
    /// for lacking an artifact URL. Duplicate locales keep their first position.
    pub fn new(
        target: BuildTarget,
        locales: Vec<Locale>,
        mut new_artifact_urls: BTreeMap<Locale, String>,
        chunk_label: String,
    ) -> (Self, Vec<Locale>) {
        let mut kept: Vec<Locale> = Vec::with_capacity(locales.len());
        let mut dropped = Vec::new();
        for locale in locales {
            if kept.contains(&locale) {
                continue;
            }
            if new_artifact_urls.contains_key(&locale) {
                kept.push(locale);
            } else {
                dropped.push(locale);
            }
        }
        new_artifact_urls.retain(|locale, _| kept.contains(locale));

        let event = Self {
            product: target.product,
            branch: target.branch,
            platform: target.platform,
            revision: target
                .revision
                .unwrap_or_else(|| UNKNOWN_REVISION.to_string()),
            locales: kept,
            new_artifact_urls,
            chunk_label,
        };
        (event, dropped)
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    pub fn locales(&self) -> &[Locale] {
        &self.locales
    }

    pub fn new_artifact_url(&self, locale: &Locale) -> Option<&str> {
        self.new_artifact_urls.get(locale).map(String::as_str)
    }

    pub fn chunk_label(&self) -> &str {
        &self.chunk_label
    }
}
