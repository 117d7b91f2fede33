//! OrchestratorBuilder - 依存関係のワイヤリング
//!
//! # 方針
//! - 起動時検証（Fail-fast）: 設定・鍵・必須ポートは build() で確認する
//! - Clock / IdGenerator は省略時に SystemClock / UlidGenerator

use std::sync::Arc;

use crate::app::credentials::CredentialEncryptor;
use crate::app::graph_builder::GraphBuilder;
use crate::app::normalizer::Normalizer;
use crate::app::orchestrator::Orchestrator;
use crate::app::resolver::BuildPairResolver;
use crate::config::{ConfigError, FunsizeConfig};
use crate::domain::credential::{CredentialError, SubmissionCredentials};
use crate::ports::{Clock, GraphSubmitter, IdGenerator, ReleaseCatalog, SystemClock, UlidGenerator};

/// BuildError は Orchestrator 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no release catalog configured")]
    MissingCatalog,

    #[error("no graph submitter configured")]
    MissingSubmitter,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("worker public key: {0}")]
    Credential(#[from] CredentialError),
}

/// # 使用例
/// ```ignore
/// let orchestrator = OrchestratorBuilder::new(config)
///     .catalog(Arc::new(client))
///     .submitter(Arc::new(scheduler))
///     .build()?;
/// ```
pub struct OrchestratorBuilder {
    config: FunsizeConfig,
    catalog: Option<Arc<dyn ReleaseCatalog>>,
    submitter: Option<Arc<dyn GraphSubmitter>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl OrchestratorBuilder {
    pub fn new(config: FunsizeConfig) -> Self {
        Self {
            config,
            catalog: None,
            submitter: None,
            clock: None,
            ids: None,
        }
    }

    pub fn catalog(mut self, catalog: Arc<dyn ReleaseCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn submitter(mut self, submitter: Arc<dyn GraphSubmitter>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Validates the configuration and the worker key, then wires everything.
    pub fn build(self) -> Result<Orchestrator, BuildError> {
        self.config.validate()?;
        let catalog = self.catalog.ok_or(BuildError::MissingCatalog)?;
        let submitter = self.submitter.ok_or(BuildError::MissingSubmitter)?;
        let encryptor =
            CredentialEncryptor::from_base64(&self.config.credentials.worker_public_key)?;

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids: Arc<dyn IdGenerator> = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(SystemClock)));
        let credentials = SubmissionCredentials::new(
            self.config.update_api.username.clone(),
            self.config.update_api.password.clone(),
        );

        let config = Arc::new(self.config);
        let normalizer = Normalizer::new(&config)?;
        let resolver = BuildPairResolver::new(catalog, config.clone());
        let graphs = GraphBuilder::new(config.clone(), ids, clock, encryptor);

        Ok(Orchestrator::new(
            config,
            normalizer,
            resolver,
            graphs,
            submitter,
            credentials,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryReleaseCatalog, RecordingSubmitter};
    use base64::Engine;

    fn config_with_key() -> FunsizeConfig {
        let mut config = FunsizeConfig::default();
        config.credentials.worker_public_key =
            base64::engine::general_purpose::STANDARD.encode([9u8; 32]);
        config
    }

    #[test]
    fn build_success() {
        let result = OrchestratorBuilder::new(config_with_key())
            .catalog(Arc::new(InMemoryReleaseCatalog::new()))
            .submitter(Arc::new(RecordingSubmitter::new()))
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn missing_ports_fail_fast() {
        let result = OrchestratorBuilder::new(config_with_key())
            .submitter(Arc::new(RecordingSubmitter::new()))
            .build();
        assert!(matches!(result, Err(BuildError::MissingCatalog)));

        let result = OrchestratorBuilder::new(config_with_key())
            .catalog(Arc::new(InMemoryReleaseCatalog::new()))
            .build();
        assert!(matches!(result, Err(BuildError::MissingSubmitter)));
    }

    #[test]
    fn missing_worker_key_fails_fast() {
        let result = OrchestratorBuilder::new(FunsizeConfig::default())
            .catalog(Arc::new(InMemoryReleaseCatalog::new()))
            .submitter(Arc::new(RecordingSubmitter::new()))
            .build();
        assert!(matches!(
            result,
            Err(BuildError::Credential(CredentialError::KeyMaterial(_)))
        ));
    }

    #[test]
    fn invalid_config_fails_fast() {
        let mut config = config_with_key();
        config.max_chunk_size = 0;
        let result = OrchestratorBuilder::new(config)
            .catalog(Arc::new(InMemoryReleaseCatalog::new()))
            .submitter(Arc::new(RecordingSubmitter::new()))
            .build();
        assert!(matches!(result, Err(BuildError::Config(_))));
    }
}
