//! funsize-core
//!
//! Turns "build finished" events into task graphs that generate, sign and
//! publish partial (delta) updates.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, event, pair, graph, credential, errors）
//! - **ports**: 抽象化レイヤー（ReleaseCatalog, EventSource, GraphSubmitter, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（normalizer, resolver, chunker, graph_builder, orchestrator, consumer_loop）
//! - **impls**: 実装（UpdateMetadataClient, InMemory 系）
//! - **config**: 設定（YAML）
//! - **observability**: tracing 初期化とカウンタ

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
