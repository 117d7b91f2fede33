//! Application layer: the pipeline from raw message to submitted graphs.

pub mod builder;
pub mod chunker;
pub mod consumer_loop;
pub mod credentials;
pub mod graph_builder;
pub mod normalizer;
pub mod orchestrator;
pub mod resolver;

pub use self::builder::{BuildError, OrchestratorBuilder};
pub use self::consumer_loop::{ConsumerHandle, ConsumerLoop};
pub use self::credentials::{CredentialEncryptor, CredentialOpener, OpenedCredential};
pub use self::graph_builder::GraphBuilder;
pub use self::normalizer::{NormalizeError, Normalization, Normalizer, SkipReason};
pub use self::orchestrator::{Orchestrator, ProcessReport};
pub use self::resolver::{BuildPairResolver, PairsByLocale};
