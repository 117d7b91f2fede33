//! RecordingSubmitter - 投入されたグラフを記録するだけのスケジューラ
//!
//! デモとテスト用。`fail_next(n)` で次の n 件を失敗させられる。

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::graph::TaskGraph;
use crate::ports::{GraphSubmitter, SubmissionReceipt, SubmitError};

#[derive(Default)]
struct State {
    graphs: Vec<TaskGraph>,
    fail_next: usize,
}

#[derive(Default)]
pub struct RecordingSubmitter {
    state: Mutex<State>,
}

impl RecordingSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accepted graphs, in submission order.
    pub fn graphs(&self) -> Vec<TaskGraph> {
        self.state().graphs.clone()
    }

    pub fn fail_next(&self, n: usize) {
        self.state().fail_next = n;
    }
}

#[async_trait::async_trait]
impl GraphSubmitter for RecordingSubmitter {
    async fn submit(&self, graph: &TaskGraph) -> Result<SubmissionReceipt, SubmitError> {
        let mut state = self.state();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(SubmitError::Rejected {
                graph_id: graph.graph_id(),
                reason: "rejected by test scheduler".to_string(),
            });
        }
        state.graphs.push(graph.clone());
        Ok(SubmissionReceipt {
            graph_id: graph.graph_id(),
            task_count: graph.nodes().len(),
        })
    }
}
