//! InMemoryReleaseCatalog - テスト・デモ用の Update-Metadata カタログ
//!
//! HTTP クライアントと同じ規則（`-latest` 除外、降順ソート）で
//! リリース一覧を返す。

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::event::Locale;
use crate::ports::{BuildDescriptor, CatalogError, ReleaseCatalog};

type BuildKey = (String, String, String);

#[derive(Default)]
struct State {
    releases: BTreeMap<(String, String), Vec<String>>,
    builds: HashMap<BuildKey, BuildDescriptor>,
    unavailable: HashSet<BuildKey>,
    get_build_calls: usize,
}

#[derive(Default)]
pub struct InMemoryReleaseCatalog {
    state: Mutex<State>,
}

fn key(release: &str, platform: &str, locale: &str) -> BuildKey {
    (release.to_string(), platform.to_string(), locale.to_string())
}

impl InMemoryReleaseCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_release(&self, product: &str, branch: &str, name: &str) {
        self.state()
            .releases
            .entry((product.to_string(), branch.to_string()))
            .or_default()
            .push(name.to_string());
    }

    /// Registers a build whose first complete points at `complete_url`.
    pub fn add_build(&self, release: &str, update_platform: &str, locale: &str, complete_url: &str) {
        self.add_descriptor(
            release,
            update_platform,
            locale,
            BuildDescriptor::from_url(complete_url),
        );
    }

    pub fn add_descriptor(
        &self,
        release: &str,
        update_platform: &str,
        locale: &str,
        descriptor: BuildDescriptor,
    ) {
        self.state()
            .builds
            .insert(key(release, update_platform, locale), descriptor);
    }

    /// Makes `get_build` for this combination fail as if retries ran out.
    pub fn make_unavailable(&self, release: &str, update_platform: &str, locale: &str) {
        self.state()
            .unavailable
            .insert(key(release, update_platform, locale));
    }

    pub fn get_build_calls(&self) -> usize {
        self.state().get_build_calls
    }
}

#[async_trait::async_trait]
impl ReleaseCatalog for InMemoryReleaseCatalog {
    async fn list_releases(
        &self,
        product: &str,
        branch: &str,
    ) -> Result<Vec<String>, CatalogError> {
        let state = self.state();
        let mut names: Vec<String> = state
            .releases
            .get(&(product.to_string(), branch.to_string()))
            .map(|names| {
                names
                    .iter()
                    .filter(|n| !n.ends_with("-latest"))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        names.sort_unstable_by(|a, b| b.cmp(a));
        Ok(names)
    }

    async fn get_build(
        &self,
        release: &str,
        update_platform: &str,
        locale: &Locale,
    ) -> Result<Option<BuildDescriptor>, CatalogError> {
        let mut state = self.state();
        state.get_build_calls += 1;
        let k = key(release, update_platform, locale.as_str());
        if state.unavailable.contains(&k) {
            return Err(CatalogError::Unavailable {
                url: format!("memory://releases/{release}/builds/{update_platform}/{locale}"),
                attempts: 1,
                last_error: "503 Service Unavailable".to_string(),
            });
        }
        Ok(state.builds.get(&k).cloned())
    }
}
