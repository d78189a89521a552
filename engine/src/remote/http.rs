//! HTTP client for the FarmaSync document server.

use super::{Document, DocumentPath, DocumentStore, RemoteResult, DOCUMENT_NOT_FOUND};
use crate::auth::sign_user_token;
use crate::error::{Error, RemoteError, Result};
use crate::record::EntityType;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;

/// Document store reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    client: Client,
    base_url: Url,
    signing_secret: Option<String>,
}

impl HttpDocumentStore {
    /// Create a client for the server at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid remote url {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("remote url {base_url} cannot be a base")));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            signing_secret: None,
        })
    }

    /// Sign every request with a bearer token for the user it addresses.
    ///
    /// The secret must match the server's `AUTH_SECRET`.
    pub fn with_signing_secret(mut self, secret: impl Into<String>) -> Self {
        self.signing_secret = Some(secret.into());
        self
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn document_url(&self, path: &DocumentPath) -> Url {
        self.url(&[
            "users",
            path.user_id.as_str(),
            path.entity_type.as_str(),
            path.entity_id.as_str(),
        ])
    }

    fn authorize(&self, request: RequestBuilder, user_id: &str) -> RemoteResult<RequestBuilder> {
        let Some(secret) = &self.signing_secret else {
            return Ok(request);
        };
        let token = sign_user_token(secret, user_id)
            .map_err(|e| RemoteError::PermissionDenied(e.to_string()))?;
        Ok(request.bearer_auth(token))
    }

    async fn send(
        &self,
        request: RequestBuilder,
        user_id: &str,
        entity_id: &str,
    ) -> RemoteResult<reqwest::Response> {
        let response = self
            .authorize(request, user_id)?
            .send()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify(status, entity_id, body))
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

fn is_missing_document(body: &str) -> bool {
    serde_json::from_str::<ErrorBody>(body).is_ok_and(|b| b.error == DOCUMENT_NOT_FOUND)
}

/// Map a non-success HTTP status onto a [`RemoteError`].
///
/// Only the server's own missing-document answer is [`RemoteError::NotFound`];
/// any other 404 means the request never reached a document route.
pub(crate) fn classify(status: StatusCode, entity_id: &str, body: String) -> RemoteError {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    };

    match status {
        StatusCode::NOT_FOUND if is_missing_document(&body) => {
            RemoteError::NotFound(entity_id.to_string())
        }
        StatusCode::NOT_FOUND => RemoteError::Unavailable(format!("no document route: {detail}")),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::PermissionDenied(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            RemoteError::Unavailable(detail)
        }
        s if s.is_server_error() => RemoteError::Unavailable(detail),
        _ => RemoteError::Rejected(detail),
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn set(&self, path: &DocumentPath, data: &serde_json::Value) -> RemoteResult<()> {
        let request = self.client.put(self.document_url(path)).json(data);
        self.send(request, &path.user_id, &path.entity_id).await?;
        Ok(())
    }

    async fn update(&self, path: &DocumentPath, fields: &serde_json::Value) -> RemoteResult<()> {
        let request = self.client.patch(self.document_url(path)).json(fields);
        self.send(request, &path.user_id, &path.entity_id).await?;
        Ok(())
    }

    async fn delete(&self, path: &DocumentPath) -> RemoteResult<()> {
        let request = self.client.delete(self.document_url(path));
        self.send(request, &path.user_id, &path.entity_id).await?;
        Ok(())
    }

    async fn list(&self, user_id: &str, entity_type: EntityType) -> RemoteResult<Vec<Document>> {
        let url = self.url(&["users", user_id, entity_type.as_str()]);
        let response = self.send(self.client.get(url), user_id, "").await?;
        response
            .json::<Vec<Document>>()
            .await
            .map_err(|e| RemoteError::Unavailable(format!("malformed listing: {e}")))
    }
}
