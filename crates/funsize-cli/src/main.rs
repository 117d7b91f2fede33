use std::sync::Arc;

use anyhow::Context;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use x25519_dalek::StaticSecret;

use funsize_core::app::{ConsumerLoop, CredentialOpener, OrchestratorBuilder};
use funsize_core::config::{BranchConfig, FunsizeConfig};
use funsize_core::domain::Stage;
use funsize_core::impls::{InMemoryEventSource, InMemoryReleaseCatalog, RecordingSubmitter};
use funsize_core::observability::init_tracing;
use funsize_core::ports::{Clock, SystemClock};

const LOCALES: [&str; 3] = ["de", "fr", "ja"];
const UPDATE_PLATFORM: &str = "Linux_x86_64-gcc3";

/// 過去の nightly リリースをカタログに積む
fn seed_catalog(catalog: &InMemoryReleaseCatalog) {
    for day in 1..=5 {
        let release = format!("Firefox-mozilla-central-nightly-202401{day:02}030201");
        catalog.add_release("Firefox", "mozilla-central", &release);
        for locale in LOCALES {
            // ja は 2 日目のビルドが存在しない
            if locale == "ja" && day == 2 {
                continue;
            }
            let url = format!("https://archive.example/{release}/{locale}.complete.mar");
            catalog.add_build(&release, UPDATE_PLATFORM, locale, &url);
        }
    }
    catalog.add_release("Firefox", "mozilla-central", "Firefox-mozilla-central-nightly-latest");
}

fn sample_event() -> anyhow::Result<Vec<u8>> {
    let results: serde_json::Map<String, serde_json::Value> = LOCALES
        .iter()
        .map(|l| (l.to_string(), serde_json::json!("success")))
        .collect();
    let urls: serde_json::Map<String, serde_json::Value> = LOCALES
        .iter()
        .map(|l| {
            (
                l.to_string(),
                serde_json::json!(format!("https://archive.example/new/{l}.complete.mar")),
            )
        })
        .collect();
    let body = serde_json::json!({
        "payload": {
            "build": {
                "builderName": "Firefox mozilla-central linux64 l10n nightly-1",
                "properties": [
                    ["locales", results, "demo"],
                    ["funsize_info", {
                        "appName": "Firefox",
                        "branch": "mozilla-central",
                        "platform": "linux64",
                        "revision": "0123456789ab",
                        "completeMarUrls": urls
                    }, "demo"]
                ]
            },
            "results": 0
        }
    });
    Ok(serde_json::to_vec(&body)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    // (A) 実行環境側の鍵ペア（本番では公開鍵だけが設定に入る）
    let worker_secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
    let opener = CredentialOpener::new(worker_secret);

    let mut config = FunsizeConfig {
        branches: vec![BranchConfig {
            name: "mozilla-central".to_string(),
            staging: true,
        }],
        partial_limit: 3,
        release_overfetch: 1,
        max_chunk_size: 2,
        ..Default::default()
    };
    config.update_api.username = "demo".to_string();
    config.update_api.password = "demo-password".to_string();
    config.credentials.worker_public_key = STANDARD.encode(opener.public_key().as_bytes());
    println!("routing keys: {}", config.routing_keys().len());

    // (B) ポートはすべて in-memory
    let catalog = Arc::new(InMemoryReleaseCatalog::new());
    seed_catalog(&catalog);
    let submitter = Arc::new(RecordingSubmitter::new());

    let orchestrator = OrchestratorBuilder::new(config)
        .catalog(catalog.clone())
        .submitter(submitter.clone())
        .build()
        .context("wiring orchestrator")?;

    // (C) イベントを 1 件投入して閉じる
    let source = Arc::new(InMemoryEventSource::new());
    source.push(
        "build.mozilla-central-linux64-l10n-nightly-1.demo.finished",
        sample_event()?,
    );
    source.close();

    // (D) source が尽きるまで consume
    let consumer = ConsumerLoop::spawn(source.clone(), Arc::new(orchestrator));
    let counts = consumer.join().await;

    // (E) 結果を表示
    let graphs = submitter.graphs();
    for graph in &graphs {
        println!("{}", serde_json::to_string_pretty(graph)?);
    }
    if let Some(publish) = graphs.first().and_then(|g| g.node(Stage::Publish)) {
        let task_id = publish.id().to_string();
        for envelope in &publish.payload().encrypted_env {
            let opened = opener
                .open(envelope, &task_id, SystemClock.now_millis())
                .with_context(|| format!("opening {}", envelope.name))?;
            println!("{} opens for {task_id} ({} bytes)", opened.claims.name, opened.value.len());
        }
    }
    tracing::info!(graphs = graphs.len(), "demo finished");
    println!("counts: {}", serde_json::to_string(&counts)?);
    println!("acked: {}", source.acked());
    Ok(())
}
