//! Task graph value objects handed to the scheduler.
//!
//! A graph is built in one pass by the graph builder and never mutated after
//! construction; fields are private and only readable through accessors.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::credential::CredentialEnvelope;
use super::ids::{GraphId, TaskId};

/// Pipeline stage of a node. The chain is always generate → sign → publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Generate,
    Sign,
    Publish,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Generate, Stage::Sign, Stage::Publish];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Generate => "generate",
            Stage::Sign => "sign",
            Stage::Publish => "publish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One delta the generate stage produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialSpec {
    pub locale: String,
    pub from_mar: String,
    pub to_mar: String,
    pub history_index: u32,
}

/// Directory artifact a stage exposes to the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSpec {
    pub name: String,
    pub path: String,
    pub expires: DateTime<Utc>,
}

/// Execution payload of a node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    pub image: String,
    pub command: Vec<String>,
    pub max_run_time: u64,
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub encrypted_env: Vec<CredentialEnvelope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<ArtifactSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub partials: Vec<PartialSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskNode {
    id: TaskId,
    stage: Stage,
    requires: Vec<TaskId>,
    provisioner_id: String,
    worker_type: String,
    payload: TaskPayload,
}

impl TaskNode {
    pub(crate) fn new(
        id: TaskId,
        stage: Stage,
        requires: Vec<TaskId>,
        provisioner_id: String,
        worker_type: String,
        payload: TaskPayload,
    ) -> Self {
        Self {
            id,
            stage,
            requires,
            provisioner_id,
            worker_type,
            payload,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn requires(&self) -> &[TaskId] {
        &self.requires
    }

    pub fn provisioner_id(&self) -> &str {
        &self.provisioner_id
    }

    pub fn worker_type(&self) -> &str {
        &self.worker_type
    }

    pub fn payload(&self) -> &TaskPayload {
        &self.payload
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphMetadata {
    pub name: String,
    pub description: String,
    pub owner: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskGraph {
    graph_id: GraphId,
    created: DateTime<Utc>,
    deadline: DateTime<Utc>,
    metadata: GraphMetadata,
    nodes: Vec<TaskNode>,
}

impl TaskGraph {
    pub(crate) fn new(
        graph_id: GraphId,
        created: DateTime<Utc>,
        deadline: DateTime<Utc>,
        metadata: GraphMetadata,
        nodes: Vec<TaskNode>,
    ) -> Self {
        Self {
            graph_id,
            created,
            deadline,
            metadata,
            nodes,
        }
    }

    pub fn graph_id(&self) -> GraphId {
        self.graph_id
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn metadata(&self) -> &GraphMetadata {
        &self.metadata
    }

    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    pub fn node(&self, stage: Stage) -> Option<&TaskNode> {
        self.nodes.iter().find(|n| n.stage == stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_serializes_snake_case() {
        assert_eq!(serde_json::to_value(Stage::Publish).unwrap(), "publish");
        assert_eq!(Stage::Sign.to_string(), "sign");
    }

    #[test]
    fn empty_payload_sections_are_omitted() {
        let payload = TaskPayload {
            image: "img".into(),
            command: vec!["/runme.sh".into()],
            max_run_time: 300,
            env: BTreeMap::new(),
            parameters: vec![],
            encrypted_env: vec![],
            artifacts: None,
            partials: vec![],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("parameters").is_none());
        assert!(json.get("encryptedEnv").is_none());
        assert!(json.get("artifacts").is_none());
        assert_eq!(json["maxRunTime"], 300);
    }
}
