use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ApiError, ProjectQuery, RecentFeed, RemoteStore};
use crate::model::{
    Activity, ApiConfig, MemberDraft, MemberId, MemberPatch, NewActivity, Project, ProjectDraft,
    ProjectId, ProjectPatch, RecentItem, Task, TaskDraft, TaskId, TaskPatch, TeamMember, User,
};

/// JWT pair returned by `POST /api/token/`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else if e.status() == Some(StatusCode::UNAUTHORIZED) {
            ApiError::NotAuthenticated
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

/// [`RemoteStore`] over the backend's REST API, authenticated with a
/// bearer token.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpStore {
    /// Build a store for `config.base_url`. Without a token every call
    /// fails with [`ApiError::NotAuthenticated`] before touching the network.
    pub fn new(config: &ApiConfig, token: Option<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(HttpStore {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Exchange credentials for a token pair.
    pub async fn login(
        config: &ApiConfig,
        username: &str,
        password: &str,
    ) -> Result<TokenPair, ApiError> {
        let store = HttpStore::new(config, None)?;
        let req = store
            .client
            .post(store.url("/api/token/"))
            .json(&Credentials { username, password });
        send_json(req).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, req: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        match &self.token {
            Some(token) => Ok(req.bearer_auth(token)),
            None => Err(ApiError::NotAuthenticated),
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let req = self.authed(self.client.get(self.url(path)).query(query))?;
        send_json(req).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let req = self.authed(self.client.post(self.url(path)).json(body))?;
        send_json(req).await
    }

    async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let req = self.authed(self.client.patch(self.url(path)).json(body))?;
        send_json(req).await
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let req = self.authed(self.client.delete(self.url(path)))?;
        let resp = req.send().await?;
        check_status(resp).await?;
        Ok(())
    }
}

async fn send_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, ApiError> {
    let resp = req.send().await?;
    let resp = check_status(resp).await?;
    resp.json::<T>()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))
}

/// Map non-2xx responses to [`ApiError`], keeping the body for display.
async fn check_status(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    debug!(%status, url = %resp.url(), "request rejected");
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ApiError::NotAuthenticated);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn list_tasks(&self) -> Result<Vec<Task>, ApiError> {
        self.get("/api/tasks/", &[]).await
    }

    async fn create_task(&self, draft: &TaskDraft) -> Result<Task, ApiError> {
        self.post("/api/tasks/", draft).await
    }

    async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<Task, ApiError> {
        self.patch(&format!("/api/tasks/{}/", id), patch).await
    }

    async fn delete_task(&self, id: TaskId) -> Result<(), ApiError> {
        self.delete(&format!("/api/tasks/{}/", id)).await
    }

    async fn list_projects(&self, query: &ProjectQuery) -> Result<Vec<Project>, ApiError> {
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            params.push(("search", search));
        }
        if query.starred_only {
            params.push(("starred", "true"));
        }
        self.get("/api/projects/", &params).await
    }

    async fn create_project(&self, draft: &ProjectDraft) -> Result<Project, ApiError> {
        self.post("/api/projects/", draft).await
    }

    async fn update_project(
        &self,
        id: ProjectId,
        patch: &ProjectPatch,
    ) -> Result<Project, ApiError> {
        self.patch(&format!("/api/projects/{}/", id), patch).await
    }

    async fn delete_project(&self, id: ProjectId) -> Result<(), ApiError> {
        self.delete(&format!("/api/projects/{}/", id)).await
    }

    async fn list_members(&self) -> Result<Vec<TeamMember>, ApiError> {
        self.get("/api/team-members/", &[]).await
    }

    async fn create_member(&self, draft: &MemberDraft) -> Result<TeamMember, ApiError> {
        self.post("/api/team-members/", draft).await
    }

    async fn update_member(
        &self,
        id: MemberId,
        patch: &MemberPatch,
    ) -> Result<TeamMember, ApiError> {
        self.patch(&format!("/api/team-members/{}/", id), patch)
            .await
    }

    async fn delete_member(&self, id: MemberId) -> Result<(), ApiError> {
        self.delete(&format!("/api/team-members/{}/", id)).await
    }

    async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        self.get("/api/users/", &[]).await
    }

    async fn create_activity(&self, activity: &NewActivity) -> Result<Activity, ApiError> {
        self.post("/api/activities/", activity).await
    }

    async fn recent(
        &self,
        feed: RecentFeed,
        query: Option<&str>,
    ) -> Result<Vec<RecentItem>, ApiError> {
        let query = query.filter(|q| !q.is_empty());
        let activities: Vec<Activity> = match feed {
            RecentFeed::Work => {
                let params: Vec<(&str, &str)> = query.map(|q| ("search", q)).into_iter().collect();
                self.get("/api/recent/work", &params).await?
            }
            RecentFeed::Views => {
                let params: Vec<(&str, &str)> = query.map(|q| ("search", q)).into_iter().collect();
                self.get("/api/recent/views", &params).await?
            }
            RecentFeed::Search => {
                self.get("/api/recent/search", &[("query", query.unwrap_or(""))])
                    .await?
            }
        };
        Ok(activities.into_iter().map(RecentItem::from_activity).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer each incoming connection with the next canned response.
    async fn canned_server(responses: Vec<(u16, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut chunk = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&chunk[..n]);
                }
                let reply = format!(
                    "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}", addr)
    }

    fn local_store(base_url: String) -> HttpStore {
        let config = ApiConfig {
            base_url,
            timeout_secs: 5,
        };
        let mut store = HttpStore::new(&config, Some("token".into())).unwrap();
        store.client = Client::builder().no_proxy().build().unwrap();
        store
    }

    #[tokio::test]
    async fn unauthorized_and_forbidden_are_not_authenticated() {
        let base_url = canned_server(vec![
            (401, r#"{"detail":"Token is expired"}"#),
            (403, r#"{"detail":"Authentication credentials were not provided."}"#),
        ])
        .await;
        let store = local_store(base_url);
        assert_eq!(store.list_tasks().await, Err(ApiError::NotAuthenticated));
        assert_eq!(store.delete_task(3).await, Err(ApiError::NotAuthenticated));
    }

    #[tokio::test]
    async fn server_error_keeps_body() {
        let base_url = canned_server(vec![(500, r#"{"detail":"database down"}"#)]).await;
        let store = local_store(base_url);
        assert_eq!(
            store.list_projects(&ProjectQuery::all()).await,
            Err(ApiError::Status {
                status: 500,
                body: r#"{"detail":"database down"}"#.into(),
            })
        );
    }

    #[tokio::test]
    async fn success_decodes_body() {
        let base_url = canned_server(vec![(200, "[]")]).await;
        let store = local_store(base_url);
        assert_eq!(store.list_members().await, Ok(Vec::new()));
    }

    #[tokio::test]
    async fn missing_token_fails_before_any_request() {
        let config = ApiConfig {
            // Nothing listens here; a request would surface as Transport.
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 1,
        };
        let store = HttpStore::new(&config, None).unwrap();
        assert_eq!(store.list_tasks().await, Err(ApiError::NotAuthenticated));
        assert_eq!(store.delete_task(1).await, Err(ApiError::NotAuthenticated));
    }

    #[test]
    fn empty_token_counts_as_missing() {
        let store = HttpStore::new(&ApiConfig::default(), Some(String::new())).unwrap();
        assert!(store.token.is_none());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = ApiConfig {
            base_url: "https://tasks.example.com/".into(),
            timeout_secs: 5,
        };
        let store = HttpStore::new(&config, Some("t".into())).unwrap();
        assert_eq!(store.url("/api/tasks/"), "https://tasks.example.com/api/tasks/");
    }
}
