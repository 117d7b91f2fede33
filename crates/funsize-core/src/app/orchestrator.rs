//! Orchestrator - 1 メッセージ分のパイプライン
//!
//! normalize → resolve → group by history → chunk → build → submit.
//! A failing chunk is logged and counted; its siblings still go out.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::app::chunker;
use crate::app::graph_builder::GraphBuilder;
use crate::app::normalizer::{Normalization, Normalizer, SkipReason};
use crate::app::resolver::BuildPairResolver;
use crate::config::FunsizeConfig;
use crate::domain::credential::SubmissionCredentials;
use crate::domain::errors::FunsizeError;
use crate::ports::{GraphSubmitter, SubmissionReceipt};

/// What happened to one message.
#[derive(Debug, Default)]
pub struct ProcessReport {
    pub skipped: Option<SkipReason>,
    pub submitted: Vec<SubmissionReceipt>,
    pub chunks_failed: usize,
}

impl ProcessReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Default::default()
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }
}

pub struct Orchestrator {
    config: Arc<FunsizeConfig>,
    normalizer: Normalizer,
    resolver: BuildPairResolver,
    graphs: GraphBuilder,
    submitter: Arc<dyn GraphSubmitter>,
    credentials: SubmissionCredentials,
}

impl Orchestrator {
    /// Wiring goes through `OrchestratorBuilder`, which validates first.
    pub(crate) fn new(
        config: Arc<FunsizeConfig>,
        normalizer: Normalizer,
        resolver: BuildPairResolver,
        graphs: GraphBuilder,
        submitter: Arc<dyn GraphSubmitter>,
        credentials: SubmissionCredentials,
    ) -> Self {
        Self {
            config,
            normalizer,
            resolver,
            graphs,
            submitter,
            credentials,
        }
    }

    /// Runs one raw message through the pipeline.
    ///
    /// `Err` means the event as a whole could not be processed (unmapped
    /// platform, release listing unavailable). Per-locale and per-chunk
    /// problems are contained and only show up in the report.
    pub async fn process(&self, body: &[u8]) -> Result<ProcessReport, FunsizeError> {
        let event = match self.normalizer.normalize(body) {
            Normalization::Event(event) => event,
            Normalization::Skip(reason) => {
                debug!(%reason, "skipping event");
                return Ok(ProcessReport::skipped(reason));
            }
        };
        info!(
            product = event.product(),
            branch = event.branch(),
            platform = event.platform(),
            locales = event.locales().len(),
            chunk_label = event.chunk_label(),
            "processing release event"
        );

        let pairs = self.resolver.resolve(&event).await?;
        let groups = chunker::group_by_history(&pairs, self.config.partial_limit);
        let chunks = chunker::chunk(groups, self.config.max_chunk_size);

        let mut report = ProcessReport::default();
        for chunk in &chunks {
            let graph = match self.graphs.build(chunk, &event, &self.credentials) {
                Ok(Some(graph)) => graph,
                Ok(None) => continue,
                Err(e) => {
                    error!(
                        history_index = chunk.history_index(),
                        subchunk_index = ?chunk.subchunk_index(),
                        error = %e,
                        "failed to build task graph"
                    );
                    report.chunks_failed += 1;
                    continue;
                }
            };
            match self.submitter.submit(&graph).await {
                Ok(receipt) => {
                    info!(
                        graph_id = %receipt.graph_id,
                        name = %graph.metadata().name,
                        "submitted task graph"
                    );
                    report.submitted.push(receipt);
                }
                Err(e) => {
                    error!(graph_id = %graph.graph_id(), error = %e, "graph submission failed");
                    report.chunks_failed += 1;
                }
            }
        }
        Ok(report)
    }
}
