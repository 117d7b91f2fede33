//! GraphSubmitter port - 外部スケジューラへのグラフ投入

use serde::Serialize;

use crate::domain::graph::TaskGraph;
use crate::domain::ids::GraphId;

/// Scheduler acknowledgement of a submitted graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub graph_id: GraphId,
    pub task_count: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("scheduler rejected graph {graph_id}: {reason}")]
    Rejected { graph_id: GraphId, reason: String },

    #[error("scheduler unreachable: {0}")]
    Unavailable(String),
}

/// GraphSubmitter はタスクグラフを受け取るスケジューラ
///
/// The graph is handed over by reference and never modified.
#[async_trait::async_trait]
pub trait GraphSubmitter: Send + Sync {
    async fn submit(&self, graph: &TaskGraph) -> Result<SubmissionReceipt, SubmitError>;
}
