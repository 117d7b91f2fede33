//! Event Normalizer: raw "build finished" messages → `ReleaseEvent`.
//!
//! Checks run in a fixed order: job-name filter, result code, then shape
//! classification. Anything that fails one of them is a `Skip`, never an
//! error. No I/O happens here.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{ConfigError, FunsizeConfig};
use crate::domain::event::{
    BatchRepackEvent, BuildTarget, JobHeader, LegacyRepackEvent, Locale, LocaleResult,
    ReleaseEvent, SingleBuildEvent, UpstreamEvent,
};

#[derive(Deserialize)]
struct RawMessage {
    payload: RawPayload,
}

#[derive(Deserialize)]
struct RawPayload {
    build: RawBuild,
    results: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBuild {
    builder_name: String,
    #[serde(default)]
    properties: Vec<Vec<Value>>,
}

/// `funsize_info` property of batched repacks.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunsizeInfo {
    app_name: String,
    branch: String,
    platform: String,
    #[serde(default)]
    revision: Option<String>,
    #[serde(default)]
    complete_mar_urls: BTreeMap<String, String>,
}

/// Why an event could not be classified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("message is not a build-finished event: {0}")]
    Envelope(String),

    #[error("missing property '{0}'")]
    MissingProperty(&'static str),

    #[error("property '{name}' is malformed: {message}")]
    InvalidProperty { name: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    UninterestingJob { builder: String },
    JobFailed { builder: String, result: i64 },
    Unclassifiable(NormalizeError),
    NoLocales { builder: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UninterestingJob { builder } => write!(f, "not interested in {builder}"),
            SkipReason::JobFailed { builder, result } => {
                write!(f, "{builder} finished with result {result}")
            }
            SkipReason::Unclassifiable(e) => write!(f, "unclassifiable event: {e}"),
            SkipReason::NoLocales { builder } => write!(f, "{builder} left no usable locales"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalization {
    Event(ReleaseEvent),
    Skip(SkipReason),
}

/// Build properties folded into `name → value`. Entries shorter than two
/// elements or with a non-string name are ignored.
struct Properties(BTreeMap<String, Value>);

impl Properties {
    fn fold(raw: Vec<Vec<Value>>) -> Self {
        let mut map = BTreeMap::new();
        for entry in raw {
            let mut it = entry.into_iter();
            if let (Some(Value::String(name)), Some(value)) = (it.next(), it.next()) {
                map.insert(name, value);
            }
        }
        Self(map)
    }

    fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    fn string(&self, name: &'static str) -> Result<Option<String>, NormalizeError> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(NormalizeError::InvalidProperty {
                name,
                message: format!("expected a string, got {other}"),
            }),
        }
    }

    fn required_string(&self, name: &'static str) -> Result<String, NormalizeError> {
        self.string(name)?
            .ok_or(NormalizeError::MissingProperty(name))
    }

    /// JSON object property, accepted either inline or as a JSON-encoded string.
    fn json<T: DeserializeOwned>(&self, name: &'static str) -> Result<T, NormalizeError> {
        let invalid = |e: serde_json::Error| NormalizeError::InvalidProperty {
            name,
            message: e.to_string(),
        };
        match self.0.get(name) {
            None => Err(NormalizeError::MissingProperty(name)),
            Some(Value::String(s)) => serde_json::from_str(s).map_err(invalid),
            Some(value) => serde_json::from_value(value.clone()).map_err(invalid),
        }
    }

    fn revision(&self) -> Result<Option<String>, NormalizeError> {
        match self.string("revision")? {
            Some(rev) => Ok(Some(rev)),
            None => self.string("got_revision"),
        }
    }
}

/// Chunk label of a batched repack: `l10n-{n}` for builders ending in
/// `nightly-{n}`, `l10n` otherwise.
fn batch_chunk_label(builder_name: &str) -> String {
    builder_name
        .rsplit_once("nightly-")
        .and_then(|(_, n)| n.parse::<u32>().ok())
        .map_or_else(|| "l10n".to_string(), |n| format!("l10n-{n}"))
}

pub struct Normalizer {
    interesting: Vec<Regex>,
}

impl Normalizer {
    pub fn new(config: &FunsizeConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            interesting: config.builder_regexes()?,
        })
    }

    pub fn is_interesting(&self, builder_name: &str) -> bool {
        self.interesting.iter().any(|re| re.is_match(builder_name))
    }

    pub fn normalize(&self, body: &[u8]) -> Normalization {
        let raw: RawMessage = match serde_json::from_slice(body) {
            Ok(raw) => raw,
            Err(e) => {
                return Normalization::Skip(SkipReason::Unclassifiable(NormalizeError::Envelope(
                    e.to_string(),
                )));
            }
        };
        let builder = raw.payload.build.builder_name;
        if !self.is_interesting(&builder) {
            return Normalization::Skip(SkipReason::UninterestingJob { builder });
        }
        let result = raw.payload.results;
        if result != 0 {
            return Normalization::Skip(SkipReason::JobFailed { builder, result });
        }

        let header = JobHeader {
            builder_name: builder,
            result,
        };
        let properties = Properties::fold(raw.payload.build.properties);
        match classify(header, &properties) {
            Ok(upstream) => into_release_event(upstream),
            Err(e) => Normalization::Skip(SkipReason::Unclassifiable(e)),
        }
    }
}

/// Picks the upstream variant from the properties present.
fn classify(header: JobHeader, props: &Properties) -> Result<UpstreamEvent, NormalizeError> {
    if props.contains("locales") {
        debug!(builder = %header.builder_name, "batched l10n repack detected");
        let info: FunsizeInfo = props.json("funsize_info")?;
        let results: serde_json::Map<String, Value> = props.json("locales")?;
        let mut locales = Vec::with_capacity(results.len());
        for (locale, result) in results {
            let result = match result {
                Value::String(s) => s,
                other => other.to_string(),
            };
            locales.push(LocaleResult {
                locale: Locale::new(locale),
                result,
            });
        }
        let revision = match info.revision {
            Some(rev) => Some(rev),
            None => props.revision()?,
        };
        return Ok(UpstreamEvent::BatchRepack(BatchRepackEvent {
            header,
            target: BuildTarget {
                product: info.app_name,
                branch: info.branch,
                platform: info.platform,
                revision,
            },
            locales,
            complete_mar_urls: info
                .complete_mar_urls
                .into_iter()
                .map(|(locale, url)| (Locale::new(locale), url))
                .collect(),
        }));
    }

    let target = BuildTarget {
        product: props.required_string("appName")?,
        branch: props.required_string("branch")?,
        platform: props.required_string("platform")?,
        revision: props.revision()?,
    };
    let complete_mar_url = props.string("completeMarUrl")?;

    if let Some(locale) = props.string("locale")? {
        debug!(builder = %header.builder_name, %locale, "single-locale repack detected");
        return Ok(UpstreamEvent::LegacyRepack(LegacyRepackEvent {
            header,
            target,
            locale: Locale::new(locale),
            complete_mar_url,
        }));
    }

    debug!(builder = %header.builder_name, "en-US build detected");
    Ok(UpstreamEvent::SingleBuild(SingleBuildEvent {
        header,
        target,
        complete_mar_url,
    }))
}

fn into_release_event(upstream: UpstreamEvent) -> Normalization {
    let builder = upstream.header().builder_name.clone();
    let kind = upstream.kind();

    let (target, locales, urls, chunk_label) = match upstream {
        UpstreamEvent::SingleBuild(e) => {
            let urls = e
                .complete_mar_url
                .map(|url| BTreeMap::from([(Locale::en_us(), url)]))
                .unwrap_or_default();
            (e.target, vec![Locale::en_us()], urls, Locale::en_us().to_string())
        }
        UpstreamEvent::LegacyRepack(e) => {
            let urls = e
                .complete_mar_url
                .map(|url| BTreeMap::from([(e.locale.clone(), url)]))
                .unwrap_or_default();
            let label = e.locale.to_string();
            (e.target, vec![e.locale], urls, label)
        }
        UpstreamEvent::BatchRepack(e) => {
            let mut succeeded = Vec::with_capacity(e.locales.len());
            for result in e.locales {
                if result.is_success() {
                    succeeded.push(result.locale);
                } else {
                    warn!(
                        builder = %builder,
                        locale = %result.locale,
                        result = %result.result,
                        "ignoring failed locale"
                    );
                }
            }
            let label = batch_chunk_label(&e.header.builder_name);
            (e.target, succeeded, e.complete_mar_urls, label)
        }
    };

    if target.revision.is_none() {
        debug!(builder = %builder, "no revision reported, using placeholder");
    }

    let (event, dropped) = ReleaseEvent::new(target, locales, urls, chunk_label);
    for locale in &dropped {
        warn!(builder = %builder, %locale, "no complete update URL, dropping locale");
    }
    if event.locales().is_empty() {
        return Normalization::Skip(SkipReason::NoLocales { builder });
    }
    debug!(
        builder = %builder,
        kind,
        locales = event.locales().len(),
        "normalized event"
    );
    Normalization::Event(event)
}
