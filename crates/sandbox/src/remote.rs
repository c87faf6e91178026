//! HTTP client for the remote sandbox service.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use codegate_core::config::ProviderConfig;
use codegate_core::{Error, Language, Result};

use crate::provider::{Execution, FileEntry, SandboxId, SandboxProvider};

const API_KEY_HEADER: &str = "X-API-Key";

// Slack on top of the execution timeout so the remote side times out first
// and reports a structured error.
const EXECUTE_GRACE: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct CreateRequest<'a> {
    template: &'a str,
}

#[derive(Deserialize)]
struct CreateResponse {
    sandbox_id: String,
}

#[derive(Serialize)]
struct ExecuteRequest<'a> {
    language: Language,
    code: &'a str,
    timeout_ms: u64,
}

#[derive(Serialize)]
struct WriteFileRequest<'a> {
    path: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ReadFileResponse {
    content: String,
}

#[derive(Deserialize)]
struct ListDirectoryResponse {
    #[serde(default)]
    entries: Vec<FileEntry>,
}

/// [`SandboxProvider`] backed by the remote sandbox HTTP API.
pub struct RemoteSandbox {
    client: reqwest::Client,
    base_url: String,
    api_key: Secret<String>,
}

impl RemoteSandbox {
    pub fn new(config: &ProviderConfig, api_key: Secret<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header(API_KEY_HEADER, self.api_key.expose_secret())
    }

    async fn send(&self, op: &str, builder: RequestBuilder) -> Result<Response> {
        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::timeout(format!("{} timed out", op))
            } else {
                Error::remote(format!("{} failed: {}", op, e))
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::remote(format!(
                "{} failed with HTTP {}: {}",
                op,
                status.as_u16(),
                body.trim()
            )));
        }
        Ok(resp)
    }

    async fn json<T: DeserializeOwned>(op: &str, resp: Response) -> Result<T> {
        resp.json::<T>()
            .await
            .map_err(|e| Error::remote(format!("{} returned an invalid body: {}", op, e)))
    }
}

#[async_trait]
impl SandboxProvider for RemoteSandbox {
    async fn create(&self, language: Language) -> Result<SandboxId> {
        let resp = self
            .send(
                "create sandbox",
                self.request(Method::POST, "/sandboxes").json(&CreateRequest {
                    template: language.as_str(),
                }),
            )
            .await
            .map_err(|e| Error::provisioning(e.to_string()))?;
        let created: CreateResponse = Self::json("create sandbox", resp)
            .await
            .map_err(|e| Error::provisioning(e.to_string()))?;

        tracing::debug!(sandbox_id = %created.sandbox_id, %language, "Remote sandbox provisioned");
        Ok(SandboxId(created.sandbox_id))
    }

    async fn destroy(&self, id: &SandboxId) -> Result<()> {
        self.send(
            "destroy sandbox",
            self.request(Method::DELETE, &format!("/sandboxes/{}", id)),
        )
        .await?;
        Ok(())
    }

    async fn run_code(
        &self,
        id: &SandboxId,
        language: Language,
        code: &str,
        timeout: Duration,
    ) -> Result<Execution> {
        let body = ExecuteRequest {
            language,
            code,
            timeout_ms: timeout.as_millis() as u64,
        };
        let resp = self
            .send(
                "execute",
                self.request(Method::POST, &format!("/sandboxes/{}/execute", id))
                    .timeout(timeout + EXECUTE_GRACE)
                    .json(&body),
            )
            .await?;
        Self::json("execute", resp).await
    }

    async fn write_file(&self, id: &SandboxId, path: &str, content: &str) -> Result<()> {
        self.send(
            "write file",
            self.request(Method::PUT, &format!("/sandboxes/{}/files", id))
                .json(&WriteFileRequest { path, content }),
        )
        .await?;
        Ok(())
    }

    async fn read_file(&self, id: &SandboxId, path: &str) -> Result<String> {
        let resp = self
            .send(
                "read file",
                self.request(Method::GET, &format!("/sandboxes/{}/files", id))
                    .query(&[("path", path)]),
            )
            .await?;
        let file: ReadFileResponse = Self::json("read file", resp).await?;
        Ok(file.content)
    }

    async fn list_directory(&self, id: &SandboxId, path: &str) -> Result<Vec<FileEntry>> {
        let resp = self
            .send(
                "list directory",
                self.request(Method::GET, &format!("/sandboxes/{}/directories", id))
                    .query(&[("path", path)]),
            )
            .await?;
        let listing: ListDirectoryResponse = Self::json("list directory", resp).await?;
        Ok(listing.entries)
    }

    async fn is_available(&self) -> bool {
        match self.request(Method::GET, "/health").send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "Sandbox provider health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> RemoteSandbox {
        let config = ProviderConfig {
            base_url: format!("{}/", server.uri()),
            ..ProviderConfig::default()
        };
        RemoteSandbox::new(&config, Secret::new("test-key".to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_create_sends_template_and_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sandboxes"))
            .and(header("X-API-Key", "test-key"))
            .and(body_json(json!({"template": "python"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"sandbox_id": "sbx-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = provider(&server).create(Language::Python).await.unwrap();
        assert_eq!(id, SandboxId("sbx-1".into()));
    }

    #[tokio::test]
    async fn test_create_failure_is_provisioning_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sandboxes"))
            .respond_with(ResponseTemplate::new(503).set_body_string("capacity exhausted"))
            .mount(&server)
            .await;

        let err = provider(&server).create(Language::JavaScript).await.unwrap_err();
        assert!(matches!(err, Error::ProvisioningFailed(_)));
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("capacity exhausted"));
    }

    #[tokio::test]
    async fn test_run_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sandboxes/sbx-1/execute"))
            .and(body_json(json!({
                "language": "python",
                "code": "print(1)",
                "timeout_ms": 30000
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "stdout": ["1\n"],
                "stderr": [],
                "results": [],
                "error": null
            })))
            .mount(&server)
            .await;

        let execution = provider(&server)
            .run_code(
                &SandboxId("sbx-1".into()),
                Language::Python,
                "print(1)",
                Duration::from_secs(30),
            )
            .await
            .unwrap();
        assert_eq!(execution.combined_output(), "1");
    }

    #[tokio::test]
    async fn test_files_and_directories() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/sandboxes/sbx-1/files"))
            .and(body_json(json!({"path": "data.txt", "content": "abc"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sandboxes/sbx-1/files"))
            .and(query_param("path", "data.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": "abc"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sandboxes/sbx-1/directories"))
            .and(query_param("path", "."))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entries": [
                    {"name": "data.txt", "path": "/home/user/data.txt", "is_dir": false},
                    {"name": "src", "path": "/home/user/src", "is_dir": true}
                ]
            })))
            .mount(&server)
            .await;

        let remote = provider(&server);
        let id = SandboxId("sbx-1".into());
        remote.write_file(&id, "data.txt", "abc").await.unwrap();
        assert_eq!(remote.read_file(&id, "data.txt").await.unwrap(), "abc");

        let entries = remote.list_directory(&id, ".").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[1].is_dir);
    }

    #[tokio::test]
    async fn test_missing_file_is_remote_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sandboxes/sbx-1/files"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such file"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .read_file(&SandboxId("sbx-1".into()), "missing.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Remote(_)));
        assert!(err.to_string().contains("no such file"));
    }

    #[tokio::test]
    async fn test_is_available() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        assert!(provider(&server).is_available().await);

        let down = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&down)
            .await;
        assert!(!provider(&down).is_available().await);
    }
}
