//! Domain model (ids, upstream events, build pairs, task graphs, credentials).

pub mod credential;
pub mod errors;
pub mod event;
pub mod graph;
pub mod ids;
pub mod pair;

pub use self::credential::{
    CredentialClaims, CredentialEnvelope, CredentialError, SubmissionCredentials,
};
pub use self::errors::{ErrorKind, FunsizeError};
pub use self::event::{
    BatchRepackEvent, BuildTarget, JobHeader, LegacyRepackEvent, Locale, LocaleResult,
    ReleaseEvent, SingleBuildEvent, UpstreamEvent, UNKNOWN_REVISION,
};
pub use self::graph::{
    ArtifactSpec, GraphMetadata, PartialSpec, Stage, TaskGraph, TaskNode, TaskPayload,
};
pub use self::ids::{GraphId, TaskId};
pub use self::pair::{BuildPair, Chunk};
