//! Build-Pair Resolver: which historical builds need a delta to the new one.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, error, info, warn};

use crate::config::FunsizeConfig;
use crate::domain::errors::{ErrorKind, FunsizeError};
use crate::domain::event::{Locale, ReleaseEvent};
use crate::domain::pair::BuildPair;
use crate::ports::ReleaseCatalog;

/// Per-locale pairs, in the event's locale order.
pub type PairsByLocale = IndexMap<Locale, Vec<BuildPair>>;

pub struct BuildPairResolver {
    catalog: Arc<dyn ReleaseCatalog>,
    config: Arc<FunsizeConfig>,
}

impl BuildPairResolver {
    pub fn new(catalog: Arc<dyn ReleaseCatalog>, config: Arc<FunsizeConfig>) -> Self {
        Self { catalog, config }
    }

    /// Walks the candidate window (most recent release first, history index
    /// 1, 2, ...) independently for every locale and stops a locale once it
    /// has `partial_limit` pairs.
    ///
    /// Lookup failures skip one (release, locale) combination only. Errors
    /// returned here concern the whole event: an unmapped platform or a
    /// release listing that could not be fetched.
    pub async fn resolve(&self, event: &ReleaseEvent) -> Result<PairsByLocale, FunsizeError> {
        let update_platform = self
            .config
            .update_platform(event.platform())
            .ok_or_else(|| FunsizeError::UnknownPlatform(event.platform().to_string()))?;

        let releases = self
            .catalog
            .list_releases(event.product(), event.branch())
            .await?;
        let candidates: Vec<String> = releases
            .into_iter()
            .take(self.config.candidate_window())
            .collect();
        debug!(
            product = event.product(),
            branch = event.branch(),
            candidates = candidates.len(),
            "historical releases"
        );

        let mut out = PairsByLocale::with_capacity(event.locales().len());
        for locale in event.locales() {
            let Some(to_url) = event.new_artifact_url(locale) else {
                continue;
            };
            let pairs = self
                .resolve_locale(&candidates, update_platform, locale, to_url)
                .await;
            out.insert(locale.clone(), pairs);
        }
        Ok(out)
    }

    async fn resolve_locale(
        &self,
        candidates: &[String],
        update_platform: &str,
        locale: &Locale,
        to_url: &str,
    ) -> Vec<BuildPair> {
        let limit = self.config.partial_limit;
        let mut pairs = Vec::with_capacity(limit);

        for (position, release) in candidates.iter().enumerate() {
            if pairs.len() >= limit {
                break;
            }
            let history_index = (position + 1) as u32;

            let descriptor = match self.catalog.get_build(release, update_platform, locale).await {
                Ok(Some(descriptor)) => descriptor,
                Ok(None) => {
                    info!(%locale, %release, update_platform, "build not found, skipping");
                    continue;
                }
                Err(e) if e.kind() == ErrorKind::Transient => {
                    warn!(%locale, %release, error = %e, "build lookup unavailable, skipping");
                    continue;
                }
                Err(e) => {
                    error!(%locale, %release, error = %e, "build lookup failed, skipping");
                    continue;
                }
            };

            let Some(from_url) = descriptor.complete_url() else {
                error!(%locale, %release, "build has no complete update URL, skipping");
                continue;
            };

            match BuildPair::new(locale.clone(), from_url, to_url, history_index) {
                Some(pair) => pairs.push(pair),
                None => debug!(%locale, %release, history_index, "from == to, skipping self-pair"),
            }
        }
        pairs
    }
}
