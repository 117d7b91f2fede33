//! Runtime configuration.
//!
//! Loaded once (YAML), validated, then shared read-only with every component
//! that needs it. Every field has a default, so an empty document is a valid
//! configuration for the nightly branches.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("builder pattern '{pattern}' does not compile: {message}")]
    InvalidPattern { pattern: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchConfig {
    pub name: String,
    /// Staging branches publish with `--dummy`.
    #[serde(default)]
    pub staging: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            multiplier: 2.0,
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateApiConfig {
    pub api_root: String,
    pub username: String,
    pub password: String,
    pub timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for UpdateApiConfig {
    fn default() -> Self {
        Self {
            api_root: "https://aus4-admin.mozilla.org/api".to_string(),
            username: String::new(),
            password: String::new(),
            timeout_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

impl std::fmt::Debug for UpdateApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateApiConfig")
            .field("api_root", &self.api_root)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .field("retry", &self.retry)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Base64 X25519 public key of the task-execution environment.
    pub worker_public_key: String,
    pub ttl_hours: i64,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            worker_public_key: String::new(),
            ttl_hours: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphTemplateConfig {
    pub provisioner_id: String,
    pub worker_type: String,
    pub generator_image: String,
    pub signing_image: String,
    pub publisher_image: String,
    pub max_run_time_secs: u64,
    pub deadline_hours: i64,
    pub artifact_expiry_days: i64,
    /// Task artifacts are reachable under `{artifact_url_root}/{task_id}/artifacts/`.
    pub artifact_url_root: String,
    pub owner: String,
    pub source: String,
}

impl Default for GraphTemplateConfig {
    fn default() -> Self {
        Self {
            provisioner_id: "aws-provisioner-v1".to_string(),
            worker_type: "funsize-mar-generator".to_string(),
            generator_image: "mozillareleases/funsize-update-generator".to_string(),
            signing_image: "mozillareleases/funsize-signing".to_string(),
            publisher_image: "mozillareleases/funsize-balrog-submitter".to_string(),
            max_run_time_secs: 3600,
            deadline_hours: 24,
            artifact_expiry_days: 7,
            artifact_url_root: "https://queue.taskcluster.net/v1/task".to_string(),
            owner: "release+funsize@mozilla.com".to_string(),
            source: "https://github.com/mozilla/funsize".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunsizeConfig {
    pub branches: Vec<BranchConfig>,
    pub platforms: Vec<String>,
    /// Regex templates; `{branch}` is replaced by the escaped branch name.
    pub builder_patterns: Vec<String>,
    pub l10n_chunks: u32,
    pub partial_limit: usize,
    pub release_overfetch: usize,
    pub max_chunk_size: usize,
    /// Build platform → update platform aliases; the first alias is canonical.
    pub platform_map: BTreeMap<String, Vec<String>>,
    pub update_api: UpdateApiConfig,
    pub credentials: CredentialConfig,
    pub graph: GraphTemplateConfig,
}

impl Default for FunsizeConfig {
    fn default() -> Self {
        let platform_map = [
            ("linux", "Linux_x86-gcc3"),
            ("linux64", "Linux_x86_64-gcc3"),
            ("win32", "WINNT_x86-msvc"),
            ("win64", "WINNT_x86_64-msvc"),
            ("macosx64", "Darwin_x86_64-gcc3-u-i386-x86_64"),
        ]
        .into_iter()
        .map(|(build, update)| (build.to_string(), vec![update.to_string()]))
        .collect();

        Self {
            branches: vec![
                BranchConfig {
                    name: "mozilla-central".to_string(),
                    staging: false,
                },
                BranchConfig {
                    name: "mozilla-aurora".to_string(),
                    staging: false,
                },
            ],
            platforms: ["linux", "linux64", "win32", "win64", "macosx64"]
                .into_iter()
                .map(String::from)
                .collect(),
            builder_patterns: vec![
                r"WINNT \d+\.\d+ (x86-64 )?{branch} nightly".to_string(),
                r"Linux (x86-64 )?{branch} nightly".to_string(),
                r"OS X \d+\.\d+ {branch} nightly".to_string(),
                r"Firefox {branch} (linux|linux64|win32|win64|macosx64) l10n nightly-\d+"
                    .to_string(),
            ],
            l10n_chunks: 10,
            partial_limit: 4,
            release_overfetch: 2,
            max_chunk_size: 5,
            platform_map,
            update_api: UpdateApiConfig::default(),
            credentials: CredentialConfig::default(),
            graph: GraphTemplateConfig::default(),
        }
    }
}

impl FunsizeConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.branches.is_empty() {
            return Err(ConfigError::Invalid("no branches configured".into()));
        }
        if self.platforms.is_empty() {
            return Err(ConfigError::Invalid("no platforms configured".into()));
        }
        if self.partial_limit == 0 {
            return Err(ConfigError::Invalid("partial_limit must be > 0".into()));
        }
        if self.max_chunk_size == 0 {
            return Err(ConfigError::Invalid("max_chunk_size must be > 0".into()));
        }
        if self.update_api.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "update_api.retry.max_attempts must be > 0".into(),
            ));
        }
        let multiplier = self.update_api.retry.multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "update_api.retry.multiplier must be a finite number >= 1.0, got {multiplier}"
            )));
        }
        if self.update_api.api_root.is_empty() {
            return Err(ConfigError::Invalid("update_api.api_root is empty".into()));
        }
        if self.credentials.ttl_hours <= 0 {
            return Err(ConfigError::Invalid(
                "credentials.ttl_hours must be > 0".into(),
            ));
        }
        for platform in &self.platforms {
            if self.update_platform(platform).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "platform '{platform}' has no platform_map entry"
                )));
            }
        }
        self.builder_regexes().map(|_| ())
    }

    /// Builder-name patterns expanded for every branch, anchored at both ends.
    pub fn builder_regexes(&self) -> Result<Vec<Regex>, ConfigError> {
        let mut out = Vec::with_capacity(self.branches.len() * self.builder_patterns.len());
        for branch in &self.branches {
            let escaped = regex::escape(&branch.name);
            for template in &self.builder_patterns {
                let pattern = format!("^(?:{})$", template.replace("{branch}", &escaped));
                let re = Regex::new(&pattern).map_err(|e| ConfigError::InvalidPattern {
                    pattern: template.clone(),
                    message: e.to_string(),
                })?;
                out.push(re);
            }
        }
        Ok(out)
    }

    /// Topic bindings over the `{branch}×{platform}` cross product.
    pub fn routing_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for branch in &self.branches {
            for platform in &self.platforms {
                keys.push(format!("build.{}-{platform}-nightly.*.finished", branch.name));
                for n in 1..=self.l10n_chunks {
                    keys.push(format!(
                        "build.{}-{platform}-l10n-nightly-{n}.*.finished",
                        branch.name
                    ));
                }
            }
        }
        keys
    }

    /// Unknown branches are treated as production.
    pub fn is_staging(&self, branch: &str) -> bool {
        self.branches
            .iter()
            .any(|b| b.name == branch && b.staging)
    }

    pub fn update_platform(&self, build_platform: &str) -> Option<&str> {
        self.platform_map
            .get(build_platform)
            .and_then(|aliases| aliases.first())
            .map(String::as_str)
    }

    /// Releases the resolver asks the catalog about per locale.
    pub fn candidate_window(&self) -> usize {
        self.partial_limit + self.release_overfetch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn empty_document_yields_defaults() {
        let config = FunsizeConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, FunsizeConfig::default());
        assert_eq!(config.partial_limit, 4);
        assert_eq!(config.credentials.ttl_hours, 24);
        config.validate().unwrap();
    }

    #[test]
    fn partial_documents_keep_remaining_defaults() {
        let yaml = r#"
branches:
  - name: staging-x
    staging: true
  - name: release-main
max_chunk_size: 2
update_api:
  api_root: http://localhost:9000/api
  retry:
    max_attempts: 3
"#;
        let config = FunsizeConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.max_chunk_size, 2);
        assert_eq!(config.update_api.retry.max_attempts, 3);
        assert_eq!(config.update_api.retry.multiplier, 2.0);
        assert!(config.is_staging("staging-x"));
        assert!(!config.is_staging("release-main"));
        assert!(!config.is_staging("unknown-branch"));
    }

    #[test]
    fn routing_keys_cover_branch_platform_product() {
        let config = FunsizeConfig {
            branches: vec![BranchConfig {
                name: "mozilla-central".into(),
                staging: false,
            }],
            platforms: vec!["linux64".into(), "win32".into()],
            l10n_chunks: 2,
            ..Default::default()
        };
        let keys = config.routing_keys();
        assert_eq!(keys.len(), 2 * (1 + 2));
        assert_eq!(keys[0], "build.mozilla-central-linux64-nightly.*.finished");
        assert_eq!(
            keys[2],
            "build.mozilla-central-linux64-l10n-nightly-2.*.finished"
        );
        assert!(keys.contains(&"build.mozilla-central-win32-l10n-nightly-1.*.finished".to_string()));
    }

    #[rstest]
    #[case("WINNT 6.1 x86-64 mozilla-central nightly", true)]
    #[case("Linux mozilla-central nightly", true)]
    #[case("OS X 10.7 mozilla-aurora nightly", true)]
    #[case("Firefox mozilla-central linux64 l10n nightly-3", true)]
    #[case("Linux mozilla-central nightly (extra)", false)]
    #[case("Linux mozilla-centralXnightly", false)]
    #[case("Linux try nightly", false)]
    fn builder_patterns_are_anchored(#[case] builder: &str, #[case] expected: bool) {
        let regexes = FunsizeConfig::default().builder_regexes().unwrap();
        assert_eq!(regexes.iter().any(|re| re.is_match(builder)), expected);
    }

    #[test]
    fn branch_names_are_escaped() {
        let config = FunsizeConfig {
            branches: vec![BranchConfig {
                name: "comm.central".into(),
                staging: false,
            }],
            ..Default::default()
        };
        let regexes = config.builder_regexes().unwrap();
        assert!(regexes.iter().any(|re| re.is_match("Linux comm.central nightly")));
        assert!(!regexes.iter().any(|re| re.is_match("Linux commXcentral nightly")));
    }

    #[rstest]
    #[case::no_branches(FunsizeConfig { branches: vec![], ..Default::default() })]
    #[case::zero_limit(FunsizeConfig { partial_limit: 0, ..Default::default() })]
    #[case::zero_chunk(FunsizeConfig { max_chunk_size: 0, ..Default::default() })]
    #[case::bad_pattern(FunsizeConfig { builder_patterns: vec!["(unclosed".into()], ..Default::default() })]
    #[case::unmapped_platform(FunsizeConfig { platforms: vec!["beos".into()], ..Default::default() })]
    #[case::negative_multiplier(retry_multiplier(-2.0))]
    #[case::shrinking_multiplier(retry_multiplier(0.5))]
    #[case::nan_multiplier(retry_multiplier(f64::NAN))]
    #[case::infinite_multiplier(retry_multiplier(f64::INFINITY))]
    fn invalid_configs_are_rejected(#[case] config: FunsizeConfig) {
        assert!(config.validate().is_err());
    }

    fn retry_multiplier(multiplier: f64) -> FunsizeConfig {
        let mut config = FunsizeConfig::default();
        config.update_api.retry.multiplier = multiplier;
        config
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let mut config = FunsizeConfig::default();
        config.update_api.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn password_is_not_debug_printed() {
        let mut config = FunsizeConfig::default();
        config.update_api.password = "s3cret".into();
        assert!(!format!("{config:?}").contains("s3cret"));
    }
}
