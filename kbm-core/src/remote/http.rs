//! HTTP binding of the knowledge base API
//!
//! | Operation          | Request                                  |
//! |--------------------|------------------------------------------|
//! | list_files         | `GET /files?limit&offset&category&tags&file_type&query` |
//! | upload_file        | `POST /files` (multipart)                |
//! | delete_file        | `DELETE /files/{id}`                     |
//! | bulk_delete_files  | `POST /files/bulk-delete`                |
//! | update_file        | `PATCH /files/{id}`                      |
//! | bulk_update_files  | `POST /files/bulk-update`                |
//! | list_categories    | `GET /categories`                        |
//! | list_tags          | `GET /tags`                              |
//! | search             | `POST /search`                           |

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use kbm_common::config::KbmConfig;
use kbm_common::models::{
    BulkDeleteReport, Category, FileId, FilePatch, KnowledgeFile, ListFilesRequest,
    ListFilesResponse, SearchOptions, SearchResult, Tag,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::{KnowledgeApi, RemoteError, RemoteResult, TransferProgress};
use crate::validator::Candidate;

const USER_AGENT: &str = concat!("kbm/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct IdsBody<'a> {
    ids: &'a [FileId],
}

#[derive(Debug, Serialize)]
struct BulkUpdateBody<'a> {
    ids: &'a [FileId],
    patch: &'a FilePatch,
}

#[derive(Debug, Serialize)]
struct SearchBody<'a> {
    query: &'a str,
    #[serde(flatten)]
    options: &'a SearchOptions,
}

/// Knowledge base API client over HTTP
pub struct HttpKnowledgeApi {
    http_client: reqwest::Client,
    base_url: Url,
}

impl HttpKnowledgeApi {
    pub fn new(base_url: &str, timeout: Duration) -> RemoteResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| RemoteError::Transport(format!("invalid server url {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::Transport(format!(
                "server url {} cannot be used as a base",
                base_url
            )));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn from_config(config: &KbmConfig) -> RemoteResult<Self> {
        Self::new(
            &config.server_url,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Base URL with `segments` appended as escaped path segments
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments);
        }
        url
    }

    /// Map status codes onto `RemoteError`
    async fn check(response: Response, what: &str) -> RemoteResult<Response> {
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound(what.to_string()));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status(status.as_u16(), error_text));
        }

        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> RemoteResult<T> {
        let response = Self::check(response, what).await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

fn send_error(err: reqwest::Error) -> RemoteError {
    RemoteError::Transport(err.to_string())
}

/// Query pairs for `GET /files`
///
/// Tags are sent comma-joined; empty filters are omitted.
pub fn list_query(request: &ListFilesRequest) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("limit", request.limit.to_string()),
        ("offset", request.offset.to_string()),
    ];
    if let Some(category) = &request.category {
        query.push(("category", category.clone()));
    }
    if !request.tags.is_empty() {
        query.push(("tags", join_tags(&request.tags)));
    }
    if let Some(kind) = request.file_type {
        query.push(("file_type", kind.as_str().to_string()));
    }
    if let Some(q) = &request.query {
        query.push(("query", q.clone()));
    }
    query
}

fn join_tags(tags: &BTreeSet<String>) -> String {
    tags.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

#[async_trait]
impl KnowledgeApi for HttpKnowledgeApi {
    async fn list_files(&self, request: &ListFilesRequest) -> RemoteResult<ListFilesResponse> {
        let url = self.endpoint(&["files"]);
        debug!(url = %url, offset = request.offset, limit = request.limit, "Listing files");

        let response = self
            .http_client
            .get(url)
            .query(&list_query(request))
            .send()
            .await
            .map_err(send_error)?;

        Self::decode(response, "files").await
    }

    async fn upload_file(
        &self,
        candidate: &Candidate,
        category: Option<&str>,
        tags: &BTreeSet<String>,
        progress: Option<TransferProgress>,
    ) -> RemoteResult<KnowledgeFile> {
        let body = candidate
            .read_body()
            .await
            .map_err(|e| RemoteError::Transport(format!("reading {}: {}", candidate.name, e)))?;
        let total = body.len() as u64;

        let part = Part::bytes(body)
            .file_name(candidate.name.clone())
            .mime_str(&candidate.effective_content_type())
            .map_err(send_error)?;

        let mut form = Form::new().part("file", part);
        if let Some(category) = category {
            form = form.text("category", category.to_string());
        }
        if !tags.is_empty() {
            form = form.text("tags", join_tags(tags));
        }

        if let Some(p) = &progress {
            p.report(0, total);
        }

        let url = self.endpoint(&["files"]);
        debug!(url = %url, file = %candidate.name, bytes = total, "Uploading file");

        let response = self
            .http_client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(send_error)?;

        let file: KnowledgeFile = Self::decode(response, &candidate.name).await?;

        if let Some(p) = &progress {
            p.report(total, total);
        }

        Ok(file)
    }

    async fn delete_file(&self, id: &FileId) -> RemoteResult<()> {
        let response = self
            .http_client
            .delete(self.endpoint(&["files", id.as_str()]))
            .send()
            .await
            .map_err(send_error)?;

        Self::check(response, &format!("file {}", id)).await?;
        Ok(())
    }

    async fn bulk_delete_files(&self, ids: &[FileId]) -> RemoteResult<BulkDeleteReport> {
        let response = self
            .http_client
            .post(self.endpoint(&["files", "bulk-delete"]))
            .json(&IdsBody { ids })
            .send()
            .await
            .map_err(send_error)?;

        let response = Self::check(response, "files").await?;
        let text = response.text().await.map_err(send_error)?;
        if text.trim().is_empty() {
            return Ok(BulkDeleteReport::default());
        }
        serde_json::from_str(&text).map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn update_file(&self, id: &FileId, patch: &FilePatch) -> RemoteResult<KnowledgeFile> {
        let response = self
            .http_client
            .patch(self.endpoint(&["files", id.as_str()]))
            .json(patch)
            .send()
            .await
            .map_err(send_error)?;

        Self::decode(response, &format!("file {}", id)).await
    }

    async fn bulk_update_files(
        &self,
        ids: &[FileId],
        patch: &FilePatch,
    ) -> RemoteResult<Vec<KnowledgeFile>> {
        let response = self
            .http_client
            .post(self.endpoint(&["files", "bulk-update"]))
            .json(&BulkUpdateBody { ids, patch })
            .send()
            .await
            .map_err(send_error)?;

        Self::decode(response, "files").await
    }

    async fn list_categories(&self) -> RemoteResult<Vec<Category>> {
        let response = self
            .http_client
            .get(self.endpoint(&["categories"]))
            .send()
            .await
            .map_err(send_error)?;

        Self::decode(response, "categories").await
    }

    async fn list_tags(&self) -> RemoteResult<Vec<Tag>> {
        let response = self
            .http_client
            .get(self.endpoint(&["tags"]))
            .send()
            .await
            .map_err(send_error)?;

        Self::decode(response, "tags").await
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> RemoteResult<Vec<SearchResult>> {
        debug!(query = %query, "Searching knowledge base");

        let response = self
            .http_client
            .post(self.endpoint(&["search"]))
            .json(&SearchBody { query, options })
            .send()
            .await
            .map_err(send_error)?;

        Self::decode(response, "search").await
    }
}
