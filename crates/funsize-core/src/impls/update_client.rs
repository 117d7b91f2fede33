//! HTTP client for the update-metadata service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::UpdateApiConfig;
use crate::domain::event::Locale;
use crate::impls::retry::RetryPolicy;
use crate::ports::{BuildDescriptor, CatalogError, ReleaseCatalog};

#[derive(Deserialize)]
struct ReleaseEntry {
    name: String,
}

/// `GET /releases` answers with either full records or bare names.
#[derive(Deserialize)]
struct ReleasesResponse {
    #[serde(default)]
    releases: Option<Vec<ReleaseEntry>>,
    #[serde(default)]
    names: Option<Vec<String>>,
}

/// Read-only update-metadata client with basic auth and 5xx retry.
#[derive(Clone)]
pub struct UpdateMetadataClient {
    api_root: String,
    username: String,
    password: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl UpdateMetadataClient {
    pub fn new(config: &UpdateApiConfig) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CatalogError::Client(e.to_string()))?;
        Ok(Self {
            api_root: config.api_root.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            client,
            retry: RetryPolicy::from(&config.retry),
        })
    }

    fn releases_url(&self) -> String {
        format!("{}/releases", self.api_root)
    }

    fn build_url(&self, release: &str, update_platform: &str, locale: &Locale) -> String {
        format!(
            "{}/releases/{release}/builds/{update_platform}/{locale}",
            self.api_root
        )
    }

    /// GET with retry on 5xx and transport failures.
    ///
    /// `Ok(None)` only when `not_found_is_none` and the server answered 404.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        not_found_is_none: bool,
    ) -> Result<Option<T>, CatalogError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let last_error = match self.try_get(url, query).await {
                Ok((status, _)) if status == StatusCode::NOT_FOUND && not_found_is_none => {
                    return Ok(None);
                }
                Ok((status, body)) if status.is_success() => {
                    return serde_json::from_slice(&body).map(Some).map_err(|e| {
                        CatalogError::Malformed {
                            url: url.to_string(),
                            message: e.to_string(),
                        }
                    });
                }
                Ok((status, _)) if status.is_server_error() => status.to_string(),
                Ok((status, _)) => {
                    return Err(CatalogError::Rejected {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                Err(e) => e.to_string(),
            };

            if !self.retry.should_retry(attempts) {
                return Err(CatalogError::Unavailable {
                    url: url.to_string(),
                    attempts,
                    last_error,
                });
            }
            let delay = self.retry.next_delay(attempts);
            warn!(url, attempts, error = %last_error, ?delay, "update-metadata request failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }

    async fn try_get(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<(StatusCode, Vec<u8>), reqwest::Error> {
        let response = self
            .client
            .get(url)
            .query(query)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok((status, body.to_vec()))
    }
}

#[async_trait]
impl ReleaseCatalog for UpdateMetadataClient {
    async fn list_releases(
        &self,
        product: &str,
        branch: &str,
    ) -> Result<Vec<String>, CatalogError> {
        let url = self.releases_url();
        let name_prefix = format!("{product}-{branch}-nightly-2");
        let response: ReleasesResponse = self
            .get_json(&url, &[("product", product), ("name_prefix", name_prefix.as_str())], false)
            .await?
            .ok_or_else(|| CatalogError::Malformed {
                url: url.clone(),
                message: "empty response".to_string(),
            })?;

        let names: Vec<String> = match (response.releases, response.names) {
            (Some(releases), _) => releases.into_iter().map(|r| r.name).collect(),
            (None, Some(names)) => names,
            (None, None) => {
                return Err(CatalogError::Malformed {
                    url,
                    message: "neither 'releases' nor 'names' in response".to_string(),
                });
            }
        };

        let mut names: Vec<String> = names
            .into_iter()
            .filter(|name| !name.ends_with("-latest"))
            .collect();
        // names end in a build timestamp, so lexicographic order is recency order
        names.sort_unstable_by(|a, b| b.cmp(a));
        debug!(product, branch, count = names.len(), "listed releases");
        Ok(names)
    }

    async fn get_build(
        &self,
        release: &str,
        update_platform: &str,
        locale: &Locale,
    ) -> Result<Option<BuildDescriptor>, CatalogError> {
        let url = self.build_url(release, update_platform, locale);
        self.get_json(&url, &[], true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use axum::Router;
    use axum::extract::{Path, Query};
    use axum::http::HeaderMap;
    use axum::routing::get;
    use base64::Engine;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}/api")
    }

    fn client(api_root: String, max_attempts: u32) -> UpdateMetadataClient {
        UpdateMetadataClient::new(&UpdateApiConfig {
            api_root,
            username: "ffxbld".into(),
            password: "hunter2".into(),
            timeout_secs: 5,
            retry: RetryConfig {
                max_attempts,
                base_delay_ms: 1,
                multiplier: 2.0,
            },
        })
        .unwrap()
    }

    /// Serves `status` with `body` on every path and counts hits.
    async fn fixed_server(
        status: StatusCode,
        body: &'static str,
    ) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().fallback(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                (status, body)
            }
        });
        (serve(app).await, hits)
    }

    #[tokio::test]
    async fn list_releases_filters_latest_and_sorts_descending() {
        let app = Router::new().route(
            "/api/releases",
            get(
                |Query(q): Query<HashMap<String, String>>, headers: HeaderMap| async move {
                    let expected = format!(
                        "Basic {}",
                        base64::engine::general_purpose::STANDARD.encode("ffxbld:hunter2")
                    );
                    let authorized = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        == Some(expected.as_str());
                    if !authorized {
                        return (StatusCode::UNAUTHORIZED, axum::Json(json!({})));
                    }
                    assert_eq!(q["product"], "Firefox");
                    assert_eq!(q["name_prefix"], "Firefox-mozilla-central-nightly-2");
                    (
                        StatusCode::OK,
                        axum::Json(json!({"releases": [
                            {"name": "Firefox-mozilla-central-nightly-20240101030201"},
                            {"name": "Firefox-mozilla-central-nightly-latest"},
                            {"name": "Firefox-mozilla-central-nightly-20240103030201"},
                            {"name": "Firefox-mozilla-central-nightly-20240102030201"}
                        ]})),
                    )
                },
            ),
        );
        let client = client(serve(app).await, 1);

        let names = client
            .list_releases("Firefox", "mozilla-central")
            .await
            .unwrap();
        assert_eq!(
            names,
            vec![
                "Firefox-mozilla-central-nightly-20240103030201",
                "Firefox-mozilla-central-nightly-20240102030201",
                "Firefox-mozilla-central-nightly-20240101030201",
            ]
        );
    }

    #[tokio::test]
    async fn list_releases_accepts_bare_names() {
        let (root, _) = fixed_server(
            StatusCode::OK,
            r#"{"names": ["Firefox-b-nightly-20240101", "Firefox-b-nightly-latest"]}"#,
        )
        .await;
        let names = client(root, 1).list_releases("Firefox", "b").await.unwrap();
        assert_eq!(names, vec!["Firefox-b-nightly-20240101"]);
    }

    #[tokio::test]
    async fn get_build_reads_descriptor_and_maps_404_to_none() {
        let app = Router::new().route(
            "/api/releases/:release/builds/:platform/:locale",
            get(|Path((release, platform, locale)): Path<(String, String, String)>| async move {
                if locale == "de" {
                    return (StatusCode::NOT_FOUND, axum::Json(json!({})));
                }
                (
                    StatusCode::OK,
                    axum::Json(json!({"completes": [{
                        "fileUrl": format!("https://example/{release}/{platform}/{locale}.mar")
                    }]})),
                )
            }),
        );
        let client = client(serve(app).await, 1);

        let found = client
            .get_build("R1", "Linux_x86_64-gcc3", &Locale::en_us())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            found.complete_url(),
            Some("https://example/R1/Linux_x86_64-gcc3/en-US.mar")
        );

        let missing = client
            .get_build("R1", "Linux_x86_64-gcc3", &Locale::from("de"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn server_errors_are_retried_until_success() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().fallback(move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    (StatusCode::SERVICE_UNAVAILABLE, "busy")
                } else {
                    (StatusCode::OK, r#"{"completes": [{"fileUrl": "https://example/x.mar"}]}"#)
                }
            }
        });
        let client = client(serve(app).await, 5);

        let build = client
            .get_build("R1", "WINNT_x86-msvc", &Locale::en_us())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(build.complete_url(), Some("https://example/x.mar"));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn persistent_server_errors_become_unavailable() {
        let (root, hits) = fixed_server(StatusCode::BAD_GATEWAY, "down").await;

        let err = client(root, 3)
            .get_build("R1", "WINNT_x86-msvc", &Locale::en_us())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Unavailable { attempts: 3, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (root, hits) = fixed_server(StatusCode::FORBIDDEN, "no").await;

        let err = client(root, 5)
            .list_releases("Firefox", "mozilla-central")
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Rejected { status: 403, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_json_is_not_retried() {
        let (root, hits) = fixed_server(StatusCode::OK, "{not json").await;

        let err = client(root, 5)
            .get_build("R1", "WINNT_x86-msvc", &Locale::en_us())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Malformed { .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn releases_without_a_known_shape_are_malformed() {
        let (root, _) = fixed_server(StatusCode::OK, r#"{"count": 0}"#).await;
        let err = client(root, 1)
            .list_releases("Firefox", "mozilla-central")
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Malformed { .. }));
    }

    #[tokio::test]
    async fn connection_failures_are_retried_then_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(format!("http://{addr}/api"), 2)
            .list_releases("Firefox", "mozilla-central")
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Unavailable { attempts: 2, .. }));
        assert_eq!(err.kind(), crate::domain::errors::ErrorKind::Transient);
    }
}
