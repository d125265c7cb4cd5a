//! HTTP client for the ClaimIt API

use async_trait::async_trait;
use claimit_core::store::{
    CollectionPath, DocPath, Document, DocumentStore, FieldUpdate, Query, StoreError, StoreResult,
    WriteBatch,
};
use claimit_core::{SessionIdentity, User};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct CreatedBody {
    path: DocPath,
}

#[derive(Serialize)]
struct UpdateBody<'a> {
    updates: &'a [FieldUpdate],
}

/// Document store reached through the API service
pub struct HttpStore {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl HttpStore {
    pub fn new(mut base: Url, token: Option<String>) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self {
            client: reqwest::Client::new(),
            base,
            token,
        }
    }

    fn endpoint(&self, path: &str) -> StoreResult<Url> {
        self.base
            .join(path)
            .map_err(|e| StoreError::InvalidPath(format!("{}: {}", path, e)))
    }

    fn request(&self, method: Method, path: &str) -> StoreResult<RequestBuilder> {
        let builder = self.client.request(method, self.endpoint(path)?);
        Ok(match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn send(&self, builder: RequestBuilder) -> StoreResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };
        debug!(%status, "API refused request: {}", message);
        Err(status_error(status, message))
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> StoreResult<T> {
        response
            .json()
            .await
            .map_err(|e| StoreError::Backend(format!("malformed response: {}", e)))
    }

    /// The user behind the configured token
    pub async fn whoami(&self) -> StoreResult<User> {
        if self.token.is_none() {
            return Err(StoreError::Unauthenticated);
        }
        let response = self.send(self.request(Method::GET, "api/auth/me")?).await?;
        Self::decode(response).await
    }
}

fn status_error(status: StatusCode, message: String) -> StoreError {
    match status {
        StatusCode::UNAUTHORIZED => StoreError::Unauthenticated,
        StatusCode::FORBIDDEN => StoreError::PermissionDenied(message),
        StatusCode::NOT_FOUND => StoreError::NotFound(message),
        StatusCode::BAD_REQUEST => StoreError::InvalidDocument(message),
        StatusCode::CONFLICT => StoreError::FailedPrecondition(message),
        s if s.is_server_error() => StoreError::Unavailable(message),
        _ => StoreError::Backend(message),
    }
}

fn documents(path: &impl ToString) -> String {
    format!("api/documents/{}", path.to_string())
}

#[async_trait]
impl DocumentStore for HttpStore {
    fn backend_tag(&self) -> &'static str {
        "http"
    }

    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>> {
        let request = self.request(Method::GET, &documents(path))?;
        match self.send(request).await {
            Ok(response) => Ok(Some(Self::decode(response).await?)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, query: &Query) -> StoreResult<Vec<Document>> {
        let request = self.request(Method::POST, "api/query")?.json(query);
        Self::decode(self.send(request).await?).await
    }

    async fn add(
        &self,
        collection: &CollectionPath,
        data: Map<String, Value>,
    ) -> StoreResult<DocPath> {
        let request = self.request(Method::POST, &documents(collection))?.json(&data);
        let created: CreatedBody = Self::decode(self.send(request).await?).await?;
        Ok(created.path)
    }

    async fn update(&self, path: &DocPath, updates: &[FieldUpdate]) -> StoreResult<()> {
        let request = self
            .request(Method::PATCH, &documents(path))?
            .json(&UpdateBody { updates });
        self.send(request).await?;
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> StoreResult<()> {
        self.send(self.request(Method::DELETE, &documents(path))?)
            .await?;
        Ok(())
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let request = self.request(Method::POST, "api/batch")?.json(&batch);
        self.send(request).await?;
        Ok(())
    }
}

/// Identity that starts out loading and resolves once the API answers
pub fn remote_identity(store: Arc<HttpStore>) -> Arc<SessionIdentity> {
    let identity = Arc::new(SessionIdentity::loading());
    let session = identity.clone();
    tokio::spawn(async move {
        let user = match store.whoami().await {
            Ok(user) => Some(user),
            Err(StoreError::Unauthenticated) => None,
            Err(e) => {
                warn!("Could not resolve the signed-in user: {}", e);
                None
            }
        };
        session.set_user(user);
    });
    identity
}
