//! Appwrite REST adapter.
//!
//! Implements [`DocumentStore`] over the Databases API and [`TeamDirectory`]
//! over the Users and Teams APIs. Every request carries the project id and
//! the server API key.

use std::time::Duration;

use async_trait::async_trait;
use blueprint_core::error::AppError;
use blueprint_core::models::{Document, DocumentPage, Membership, UserPage};
use blueprint_core::store::{DocumentStore, Query, TeamDirectory};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;
use url::Url;

/// Error body Appwrite returns with every non-success status.
#[derive(Deserialize, Debug, Default)]
struct AppwriteErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize, Debug)]
struct CountResponse {
    total: u64,
}

#[derive(Deserialize, Debug)]
struct MembershipList {
    #[serde(default)]
    memberships: Vec<Membership>,
}

/// Low-level Appwrite HTTP client.
///
/// # Examples
///
/// ```no_run
/// use blueprint_db::{AppwriteClient, AppwriteDatabase};
///
/// # fn example() -> Result<(), blueprint_core::AppError> {
/// let client = AppwriteClient::new("https://cloud.appwrite.io/v1", "project", "secret")?;
/// let db = AppwriteDatabase::new(client, "main");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AppwriteClient {
    client: Client,
    base_url: Url,
    project_id: String,
    api_key: String,
    timeout: Duration,
}

impl AppwriteClient {
    /// Creates a client for `endpoint` (for example `https://cloud.appwrite.io/v1`).
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidUrl` if the endpoint is malformed.
    pub fn new(endpoint: &str, project_id: &str, api_key: &str) -> Result<Self, AppError> {
        let normalized = if endpoint.ends_with('/') {
            endpoint.to_string()
        } else {
            format!("{endpoint}/")
        };
        let base_url =
            Url::parse(&normalized).map_err(|_| AppError::InvalidUrl(endpoint.to_string()))?;

        let timeout = Duration::from_secs(30);
        let client = Client::builder()
            .user_agent("Blueprint/0.1 (functions)")
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            project_id: project_id.to_string(),
            api_key: api_key.to_string(),
            timeout,
        })
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        queries: &[Query],
    ) -> Result<RequestBuilder, AppError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| AppError::InvalidUrl(format!("{path}: {e}")))?;
        if !queries.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for query in queries {
                pairs.append_pair("queries[]", &query.to_query_string());
            }
        }
        Ok(self
            .client
            .request(method, url)
            .header("X-Appwrite-Project", &self.project_id)
            .header("X-Appwrite-Key", &self.api_key))
    }

    /// Sends a request and maps Appwrite error statuses.
    async fn send(&self, request: RequestBuilder) -> Result<Response, AppError> {
        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout.as_secs())
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {}", e))
            } else {
                AppError::ClientError(e.to_string())
            }
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body: AppwriteErrorBody = resp.json().await.unwrap_or_default();
        let message = if body.message.is_empty() {
            status.canonical_reason().unwrap_or("unknown error").to_string()
        } else {
            body.message
        };
        Err(match status {
            StatusCode::NOT_FOUND => AppError::NotFound(message),
            StatusCode::CONFLICT => AppError::Conflict(message),
            StatusCode::TOO_MANY_REQUESTS => AppError::RateLimitExceeded,
            _ => AppError::AppwriteError {
                status: status.as_u16(),
                message,
            },
        })
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, AppError> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| AppError::ClientError(e.to_string()))
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        queries: &[Query],
    ) -> Result<T, AppError> {
        self.json(self.request(Method::GET, path, queries)?).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, AppError> {
        self.json(self.request(Method::POST, path, &[])?.json(body))
            .await
    }

    pub async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, AppError> {
        self.json(self.request(Method::PATCH, path, &[])?.json(body))
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<(), AppError> {
        self.send(self.request(Method::DELETE, path, &[])?).await?;
        Ok(())
    }
}

/// Documents of one Appwrite database.
#[derive(Clone)]
pub struct AppwriteDatabase {
    client: AppwriteClient,
    database_id: String,
}

impl AppwriteDatabase {
    pub fn new(client: AppwriteClient, database_id: &str) -> Self {
        Self {
            client,
            database_id: database_id.to_string(),
        }
    }

    fn documents_path(&self, collection: &str) -> String {
        format!(
            "databases/{}/collections/{}/documents",
            self.database_id, collection
        )
    }
}

#[async_trait]
impl DocumentStore for AppwriteDatabase {
    async fn list_documents(
        &self,
        collection: &str,
        queries: &[Query],
    ) -> Result<DocumentPage, AppError> {
        debug!(collection, queries = queries.len(), "Listing documents");
        self.client
            .get(&self.documents_path(collection), queries)
            .await
    }

    async fn create_document(
        &self,
        collection: &str,
        data: &Map<String, Value>,
    ) -> Result<Document, AppError> {
        let body = json!({ "documentId": "unique()", "data": data });
        self.client
            .post(&self.documents_path(collection), &body)
            .await
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        data: &Map<String, Value>,
    ) -> Result<Document, AppError> {
        let path = format!("{}/{}", self.documents_path(collection), id);
        self.client.patch(&path, &json!({ "data": data })).await
    }

    async fn ping(&self) -> Result<u64, AppError> {
        let resp: CountResponse = self.client.get("databases", &[]).await?;
        Ok(resp.total)
    }
}

/// Users and team memberships.
#[derive(Clone)]
pub struct AppwriteTeams {
    client: AppwriteClient,
}

impl AppwriteTeams {
    pub fn new(client: AppwriteClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TeamDirectory for AppwriteTeams {
    async fn list_users(
        &self,
        search: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<UserPage, AppError> {
        let mut request = self.client.request(
            Method::GET,
            "users",
            &[Query::Limit(limit), Query::Offset(offset)],
        )?;
        if let Some(term) = search.filter(|s| !s.is_empty()) {
            request = request.query(&[("search", term)]);
        }
        self.client.json(request).await
    }

    async fn user_team_ids(&self, user_id: &str) -> Result<Vec<String>, AppError> {
        let list: MembershipList = self
            .client
            .get(&format!("users/{}/memberships", user_id), &[])
            .await?;
        Ok(list.memberships.into_iter().map(|m| m.team_id).collect())
    }

    async fn add_membership(
        &self,
        team_id: &str,
        user_id: &str,
        roles: &[String],
        redirect_url: &str,
    ) -> Result<String, AppError> {
        let body = json!({ "userId": user_id, "roles": roles, "url": redirect_url });
        let membership: Membership = self
            .client
            .post(&format!("teams/{}/memberships", team_id), &body)
            .await?;
        Ok(membership.id)
    }

    async fn find_membership(
        &self,
        team_id: &str,
        user_id: &str,
    ) -> Result<Option<String>, AppError> {
        let list: MembershipList = self
            .client
            .get(
                &format!("teams/{}/memberships", team_id),
                &[Query::equal("userId", user_id)],
            )
            .await?;
        Ok(list
            .memberships
            .into_iter()
            .find(|m| m.user_id == user_id)
            .map(|m| m.id))
    }

    async fn delete_membership(&self, team_id: &str, membership_id: &str) -> Result<(), AppError> {
        self.client
            .delete(&format!("teams/{}/memberships/{}", team_id, membership_id))
            .await
    }
}
