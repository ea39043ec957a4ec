//! Client for the remote code-indexing service.
//!
//! Four endpoints: search, per-file upsert, branch manifest and file deletion.
//! The base URL comes from the auth token (or config) on every call, and every
//! call goes through [`retry::with_retry`].

pub mod retry;

use crate::auth::AuthToken;
use crate::config::ApiConfig;
use crate::error::{ApiError, Result};
use crate::types::{DeleteFilesRequest, SearchRequest, SearchResult, ServerManifest, UpsertFileParams};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

pub use retry::{RetryPolicy, with_retry};

pub const SEARCH_PATH: &str = "/api/code-indexing/search";
pub const UPSERT_PATH: &str = "/api/code-indexing/upsert-by-file";
pub const MANIFEST_PATH: &str = "/api/code-indexing/manifest";
pub const DELETE_FILES_PATH: &str = "/api/code-indexing/delete-files";

/// Operations the indexer needs from the remote service
#[async_trait]
pub trait IndexApi: Send + Sync {
    /// Branch-preferenced search
    async fn search_code(
        &self,
        request: &SearchRequest,
        token: &AuthToken,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<SearchResult>>;

    /// Replace every chunk of one file on one branch
    async fn upsert_file(
        &self,
        params: &UpsertFileParams,
        token: &AuthToken,
        cancel: Option<&CancellationToken>,
    ) -> Result<()>;

    /// What the server already holds for a branch
    async fn get_server_manifest(
        &self,
        organization_id: &str,
        project_id: &str,
        git_branch: &str,
        token: &AuthToken,
        cancel: Option<&CancellationToken>,
    ) -> Result<ServerManifest>;

    /// Drop files from a branch's index
    async fn delete_files(
        &self,
        request: &DeleteFilesRequest,
        token: &AuthToken,
        cancel: Option<&CancellationToken>,
    ) -> Result<()>;
}

/// HTTP implementation of [`IndexApi`]
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    fallback_base_url: Option<String>,
    policy: RetryPolicy,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("delta-indexer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            fallback_base_url: config.base_url.clone(),
            policy: RetryPolicy::from_config(config),
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Full URL for `path` against the token's service
    pub fn endpoint(&self, token: &AuthToken, path: &str) -> Result<String> {
        let base = token.base_url(self.fallback_base_url.as_deref())?;
        Ok(format!("{}{}", base, path))
    }

    fn authorized(&self, builder: RequestBuilder, token: &AuthToken) -> RequestBuilder {
        builder.bearer_auth(&token.token)
    }
}

#[async_trait]
impl IndexApi for ApiClient {
    async fn search_code(
        &self,
        request: &SearchRequest,
        token: &AuthToken,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<SearchResult>> {
        let url = self.endpoint(token, SEARCH_PATH)?;
        tracing::debug!(
            "Searching '{}' on branch {} (fallback {:?})",
            request.query,
            request.prefer_branch,
            request.fallback_branch
        );

        let results = with_retry(&self.policy, cancel, || {
            let builder = self.authorized(self.http.post(&url), token).json(request);
            async move { decode_json(send(builder).await?).await }
        })
        .await?;
        Ok(results)
    }

    async fn upsert_file(
        &self,
        params: &UpsertFileParams,
        token: &AuthToken,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        let url = self.endpoint(token, UPSERT_PATH)?;
        let chunks_json =
            serde_json::to_string(&params.chunks).map_err(|e| ApiError::Decode(e.to_string()))?;

        with_retry(&self.policy, cancel, || {
            // Multipart bodies are consumed by `send`, so each attempt builds its own
            let form = upsert_form(params, &chunks_json);
            let url = url.as_str();
            async move {
                let builder = self.authorized(self.http.put(url), token).multipart(form?);
                send(builder).await.map(|_| ())
            }
        })
        .await?;

        tracing::debug!(
            "Upserted {} ({} chunks) on {}",
            params.file_path,
            params.chunks.len(),
            params.git_branch
        );
        Ok(())
    }

    async fn get_server_manifest(
        &self,
        organization_id: &str,
        project_id: &str,
        git_branch: &str,
        token: &AuthToken,
        cancel: Option<&CancellationToken>,
    ) -> Result<ServerManifest> {
        let url = self.endpoint(token, MANIFEST_PATH)?;
        let query = [
            ("organizationId", organization_id),
            ("projectId", project_id),
            ("gitBranch", git_branch),
        ];

        let manifest = with_retry(&self.policy, cancel, || {
            let builder = self.authorized(self.http.get(&url), token).query(&query);
            async move { decode_json(send(builder).await?).await }
        })
        .await?;
        Ok(manifest)
    }

    async fn delete_files(
        &self,
        request: &DeleteFilesRequest,
        token: &AuthToken,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        if request.file_paths.is_empty() {
            return Ok(());
        }
        let url = self.endpoint(token, DELETE_FILES_PATH)?;

        with_retry(&self.policy, cancel, || {
            let builder = self.authorized(self.http.post(&url), token).json(request);
            async move { send(builder).await.map(|_| ()) }
        })
        .await?;
        Ok(())
    }
}

fn upsert_form(params: &UpsertFileParams, chunks_json: &str) -> std::result::Result<Form, ApiError> {
    let file_name = params
        .file_path
        .rsplit('/')
        .next()
        .unwrap_or(params.file_path.as_str())
        .to_string();

    let file = Part::bytes(params.content.clone().into_bytes())
        .file_name(file_name)
        .mime_str("text/plain; charset=utf-8")
        .map_err(|e| ApiError::Transport(e.to_string()))?;
    let chunks = Part::text(chunks_json.to_string())
        .mime_str("application/json")
        .map_err(|e| ApiError::Transport(e.to_string()))?;

    Ok(Form::new()
        .part("file", file)
        .text("organizationId", params.organization_id.clone())
        .text("projectId", params.project_id.clone())
        .text("filePath", params.file_path.clone())
        .text("fileHash", params.file_hash.clone())
        .text("gitBranch", params.git_branch.clone())
        .text("isBaseBranch", params.is_base_branch.to_string())
        .part("chunks", chunks))
}

/// Send and turn non-2xx statuses into typed errors
async fn send(builder: RequestBuilder) -> std::result::Result<Response, ApiError> {
    let response = builder
        .send()
        .await
        .map_err(|e| ApiError::Transport(e.to_string()))?;
    check_status(response).await
}

async fn check_status(response: Response) -> std::result::Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, body))
}

fn status_error(status: StatusCode, body: String) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ApiError::Auth(format!("{}: {}", status.as_u16(), body))
        }
        _ => ApiError::Http {
            status: status.as_u16(),
            body,
        },
    }
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> std::result::Result<T, ApiError> {
    response
        .json::<T>()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))
}
