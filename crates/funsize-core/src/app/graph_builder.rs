//! Task-Graph Builder: one chunk → generate → sign → publish.
//!
//! Every build gets a fresh `StableIdGenerator`, so references to a node
//! inside one graph agree while two builds of the same chunk never share
//! ids. The graph is assembled in one pass and returned immutable.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::app::credentials::CredentialEncryptor;
use crate::config::FunsizeConfig;
use crate::domain::credential::{CredentialEnvelope, SubmissionCredentials};
use crate::domain::errors::FunsizeError;
use crate::domain::event::ReleaseEvent;
use crate::domain::graph::{
    ArtifactSpec, GraphMetadata, PartialSpec, Stage, TaskGraph, TaskNode, TaskPayload,
};
use crate::domain::ids::TaskId;
use crate::domain::pair::Chunk;
use crate::ports::{Clock, IdGenerator, StableIdGenerator};

const ENV_ARTIFACTS: &str = "public/env";
const ARTIFACTS_PATH: &str = "/home/worker/artifacts/";
const ENTRYPOINT: &str = "/runme.sh";
const DRY_RUN_FLAG: &str = "--dummy";

pub struct GraphBuilder {
    config: Arc<FunsizeConfig>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    encryptor: CredentialEncryptor,
}

impl GraphBuilder {
    pub fn new(
        config: Arc<FunsizeConfig>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        encryptor: CredentialEncryptor,
    ) -> Self {
        Self {
            config,
            ids,
            clock,
            encryptor,
        }
    }

    /// Builds the graph for `chunk`, or `None` when the chunk has no pairs.
    ///
    /// Fails when a credential cannot be sealed; no graph with a publish
    /// node lacking credentials is ever returned.
    pub fn build(
        &self,
        chunk: &Chunk,
        event: &ReleaseEvent,
        credentials: &SubmissionCredentials,
    ) -> Result<Option<TaskGraph>, FunsizeError> {
        if chunk.is_empty() {
            info!(
                history_index = chunk.history_index(),
                "no build pairs resolved, not building a graph"
            );
            return Ok(None);
        }

        let graph = &self.config.graph;
        let created = self.clock.now();
        let mut ids = StableIdGenerator::new(self.ids.as_ref());
        let generate_id = ids.get(Stage::Generate.as_str());
        let sign_id = ids.get(Stage::Sign.as_str());

        let expires = created + Duration::days(graph.artifact_expiry_days);
        let env_artifacts = || {
            Some(ArtifactSpec {
                name: ENV_ARTIFACTS.to_string(),
                path: ARTIFACTS_PATH.to_string(),
                expires,
            })
        };

        let locales: Vec<&str> = chunk.locales().map(|l| l.as_str()).collect();
        let generate = TaskNode::new(
            ids.get(Stage::Generate.as_str()),
            Stage::Generate,
            vec![],
            graph.provisioner_id.clone(),
            graph.worker_type.clone(),
            TaskPayload {
                image: graph.generator_image.clone(),
                command: vec![ENTRYPOINT.to_string()],
                max_run_time: graph.max_run_time_secs,
                env: BTreeMap::from([
                    ("PLATFORM".to_string(), event.platform().to_string()),
                    ("BRANCH".to_string(), event.branch().to_string()),
                    ("REVISION".to_string(), event.revision().to_string()),
                    ("LOCALES".to_string(), locales.join(" ")),
                ]),
                parameters: vec![],
                encrypted_env: vec![],
                artifacts: env_artifacts(),
                partials: chunk
                    .pairs()
                    .iter()
                    .map(|p| PartialSpec {
                        locale: p.locale().to_string(),
                        from_mar: p.from_artifact_url().to_string(),
                        to_mar: p.to_artifact_url().to_string(),
                        history_index: p.history_index(),
                    })
                    .collect(),
            },
        );

        let sign = TaskNode::new(
            ids.get(Stage::Sign.as_str()),
            Stage::Sign,
            vec![ids.get(Stage::Generate.as_str())],
            graph.provisioner_id.clone(),
            graph.worker_type.clone(),
            TaskPayload {
                image: graph.signing_image.clone(),
                command: vec![ENTRYPOINT.to_string()],
                max_run_time: graph.max_run_time_secs,
                env: BTreeMap::from([(
                    "PARENT_TASK_ARTIFACTS_URL_PREFIX".to_string(),
                    self.artifacts_prefix(generate_id),
                )]),
                parameters: vec![],
                encrypted_env: vec![],
                artifacts: env_artifacts(),
                partials: vec![],
            },
        );

        let signed_prefix = self.artifacts_prefix(sign_id);
        let api_root = self.config.update_api.api_root.clone();
        let mut parameters = vec![
            "--artifacts-url-prefix".to_string(),
            signed_prefix.clone(),
            "--api-root".to_string(),
            api_root.clone(),
        ];
        if self.config.is_staging(event.branch()) {
            parameters.push(DRY_RUN_FLAG.to_string());
        }

        let encrypted_env =
            self.seal_credentials(ids.get(Stage::Publish.as_str()), created, credentials)?;
        let publish = TaskNode::new(
            ids.get(Stage::Publish.as_str()),
            Stage::Publish,
            vec![ids.get(Stage::Sign.as_str())],
            graph.provisioner_id.clone(),
            graph.worker_type.clone(),
            TaskPayload {
                image: graph.publisher_image.clone(),
                command: vec![ENTRYPOINT.to_string()],
                max_run_time: graph.max_run_time_secs,
                env: BTreeMap::from([
                    ("PARENT_TASK_ARTIFACTS_URL_PREFIX".to_string(), signed_prefix),
                    ("UPDATE_API_ROOT".to_string(), api_root),
                ]),
                parameters,
                encrypted_env,
                artifacts: None,
                partials: vec![],
            },
        );

        let metadata = GraphMetadata {
            name: metadata_name(event, chunk),
            description: format!(
                "Partial updates for {} {} {} ({})",
                event.product(),
                event.platform(),
                locales.join(", "),
                event.revision()
            ),
            owner: graph.owner.clone(),
            source: graph.source.clone(),
        };

        let task_graph = TaskGraph::new(
            self.ids.generate_graph_id(),
            created,
            created + Duration::hours(graph.deadline_hours),
            metadata,
            vec![generate, sign, publish],
        );
        debug!(
            graph_id = %task_graph.graph_id(),
            history_index = chunk.history_index(),
            tasks = ids.len(),
            "task graph built"
        );
        Ok(Some(task_graph))
    }

    fn artifacts_prefix(&self, task_id: TaskId) -> String {
        format!(
            "{}/{task_id}/artifacts/{ENV_ARTIFACTS}",
            self.config.graph.artifact_url_root.trim_end_matches('/')
        )
    }

    /// One envelope per secret, addressed to `recipient` and valid from
    /// `created` for `credentials.ttl_hours`.
    fn seal_credentials(
        &self,
        recipient: TaskId,
        created: DateTime<Utc>,
        credentials: &SubmissionCredentials,
    ) -> Result<Vec<CredentialEnvelope>, FunsizeError> {
        let not_before = created.timestamp_millis();
        let not_after = not_before + self.config.credentials.ttl_hours * 3600 * 1000;
        let recipient = recipient.to_string();
        credentials
            .secrets()
            .iter()
            .map(|(name, value)| {
                self.encryptor
                    .encrypt(&recipient, not_before, not_after, name, value)
                    .map_err(FunsizeError::from)
            })
            .collect()
    }
}

fn metadata_name(event: &ReleaseEvent, chunk: &Chunk) -> String {
    let mut name = format!(
        "Funsize {} {} {} {} partials (history {}",
        event.product(),
        event.branch(),
        event.platform(),
        event.chunk_label(),
        chunk.history_index()
    );
    if let Some(sub) = chunk.subchunk_index() {
        name.push_str(&format!(", chunk {sub}"));
    }
    name.push(')');
    name
}
