//! Typed HTTP client for the Airyra coordination service.
//!
//! Wraps every `/v1` route in a typed method and inverts the server's error
//! mapping: a 4xx/5xx wire payload is decoded back into the original
//! [`DomainError`] with its code and context intact, so callers handle the
//! same error values they would see in-process. A refused connection is
//! surfaced as the distinct [`ClientError::ServerNotRunning`] sentinel,
//! which CLIs map to exit code 2.

use airyra_core::{
    error::{DomainError, ErrorBody},
    models::{
        AuditEntry, Dependency, NewSpec, NewTask, Paged, Spec, Task, TaskStatus, UpdateSpec,
        UpdateTask,
    },
    AGENT_HEADER,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by the client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server answered with a domain error; code and context preserved
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Nothing is listening at the configured address
    #[error("server is not running at {url}")]
    ServerNotRunning { url: String },

    /// Any other transport-level failure
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// Convenience accessor for the wrapped domain error, if any.
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            ClientError::Domain(err) => Some(err),
            _ => None,
        }
    }
}

/// Pagination options for list calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageOptions {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageOptions {
    fn query(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(per_page) = self.per_page {
            pairs.push(("per_page", per_page.to_string()));
        }
        pairs
    }
}

/// Typed wrapper over the Airyra HTTP API.
///
/// One client speaks for one agent identity; the identity travels on every
/// request in the `X-Airyra-Agent` header.
#[derive(Debug, Clone)]
pub struct AiryraClient {
    http: reqwest::Client,
    base_url: String,
    agent: String,
}

impl AiryraClient {
    /// Create a client for `base_url` (e.g. `http://127.0.0.1:7420`)
    /// identifying as `agent`.
    pub fn new(base_url: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent: agent.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        match request.header(AGENT_HEADER, self.agent.as_str()).send().await {
            Ok(response) => Ok(response),
            Err(err) if err.is_connect() => Err(ClientError::ServerNotRunning {
                url: self.base_url.clone(),
            }),
            Err(err) => Err(ClientError::Transport(err.to_string())),
        }
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|err| ClientError::Transport(format!("invalid response body: {err}")))
        } else {
            Err(Self::decode_error(response).await)
        }
    }

    async fn expect_no_content(response: reqwest::Response) -> Result<()> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::decode_error(response).await)
        }
    }

    async fn decode_error(response: reqwest::Response) -> ClientError {
        let status = response.status();
        match response.json::<ErrorBody>().await {
            Ok(body) => ClientError::Domain(DomainError::from_wire(body.error)),
            Err(err) => {
                ClientError::Transport(format!("undecodable error response ({status}): {err}"))
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let request = self.http.get(self.url(path)).query(query);
        Self::decode(self.execute(request).await?).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let mut request = self.http.post(self.url(path));
        if let Some(body) = body {
            request = request.json(&body);
        }
        Self::decode(self.execute(request).await?).await
    }

    // ----- service -----

    /// Liveness probe.
    pub async fn health(&self) -> Result<serde_json::Value> {
        self.get_json("/v1/health", &[]).await
    }

    /// List project names.
    pub async fn list_projects(&self) -> Result<Paged<String>> {
        self.get_json("/v1/projects", &[]).await
    }

    // ----- tasks -----

    pub async fn create_task(&self, project: &str, new_task: &NewTask) -> Result<Task> {
        let request = self
            .http
            .post(self.url(&format!("/v1/projects/{project}/tasks")))
            .json(new_task);
        Self::decode(self.execute(request).await?).await
    }

    pub async fn get_task(&self, project: &str, task_id: &str) -> Result<Task> {
        self.get_json(&format!("/v1/projects/{project}/tasks/{task_id}"), &[])
            .await
    }

    pub async fn list_tasks(
        &self,
        project: &str,
        status: Option<TaskStatus>,
        page: PageOptions,
    ) -> Result<Paged<Task>> {
        let mut query = page.query();
        if let Some(status) = status {
            query.push(("status", status.as_str().to_string()));
        }
        self.get_json(&format!("/v1/projects/{project}/tasks"), &query)
            .await
    }

    pub async fn ready_tasks(&self, project: &str, page: PageOptions) -> Result<Paged<Task>> {
        self.get_json(&format!("/v1/projects/{project}/tasks/ready"), &page.query())
            .await
    }

    pub async fn update_task(
        &self,
        project: &str,
        task_id: &str,
        updates: &UpdateTask,
    ) -> Result<Task> {
        let request = self
            .http
            .patch(self.url(&format!("/v1/projects/{project}/tasks/{task_id}")))
            .json(updates);
        Self::decode(self.execute(request).await?).await
    }

    pub async fn delete_task(&self, project: &str, task_id: &str) -> Result<()> {
        let request = self
            .http
            .delete(self.url(&format!("/v1/projects/{project}/tasks/{task_id}")));
        Self::expect_no_content(self.execute(request).await?).await
    }

    pub async fn claim_task(&self, project: &str, task_id: &str) -> Result<Task> {
        self.post_json(&format!("/v1/projects/{project}/tasks/{task_id}/claim"), None)
            .await
    }

    pub async fn complete_task(&self, project: &str, task_id: &str) -> Result<Task> {
        self.post_json(&format!("/v1/projects/{project}/tasks/{task_id}/done"), None)
            .await
    }

    pub async fn release_task(&self, project: &str, task_id: &str, force: bool) -> Result<Task> {
        let path = if force {
            format!("/v1/projects/{project}/tasks/{task_id}/release?force=true")
        } else {
            format!("/v1/projects/{project}/tasks/{task_id}/release")
        };
        self.post_json(&path, None).await
    }

    pub async fn block_task(&self, project: &str, task_id: &str) -> Result<Task> {
        self.post_json(&format!("/v1/projects/{project}/tasks/{task_id}/block"), None)
            .await
    }

    pub async fn unblock_task(&self, project: &str, task_id: &str) -> Result<Task> {
        self.post_json(
            &format!("/v1/projects/{project}/tasks/{task_id}/unblock"),
            None,
        )
        .await
    }

    // ----- task dependencies -----

    pub async fn add_dependency(
        &self,
        project: &str,
        child_id: &str,
        parent_id: &str,
    ) -> Result<Dependency> {
        self.post_json(
            &format!("/v1/projects/{project}/tasks/{child_id}/deps"),
            Some(json!({ "parent_id": parent_id })),
        )
        .await
    }

    pub async fn remove_dependency(
        &self,
        project: &str,
        child_id: &str,
        parent_id: &str,
    ) -> Result<()> {
        let request = self.http.delete(self.url(&format!(
            "/v1/projects/{project}/tasks/{child_id}/deps/{parent_id}"
        )));
        Self::expect_no_content(self.execute(request).await?).await
    }

    pub async fn list_dependencies(
        &self,
        project: &str,
        task_id: &str,
    ) -> Result<Paged<Dependency>> {
        self.get_json(&format!("/v1/projects/{project}/tasks/{task_id}/deps"), &[])
            .await
    }

    pub async fn task_history(&self, project: &str, task_id: &str) -> Result<Paged<AuditEntry>> {
        self.get_json(
            &format!("/v1/projects/{project}/tasks/{task_id}/history"),
            &[],
        )
        .await
    }

    // ----- specs -----

    pub async fn create_spec(&self, project: &str, new_spec: &NewSpec) -> Result<Spec> {
        let request = self
            .http
            .post(self.url(&format!("/v1/projects/{project}/specs")))
            .json(new_spec);
        Self::decode(self.execute(request).await?).await
    }

    pub async fn get_spec(&self, project: &str, spec_id: &str) -> Result<Spec> {
        self.get_json(&format!("/v1/projects/{project}/specs/{spec_id}"), &[])
            .await
    }

    pub async fn list_specs(&self, project: &str, page: PageOptions) -> Result<Paged<Spec>> {
        self.get_json(&format!("/v1/projects/{project}/specs"), &page.query())
            .await
    }

    pub async fn ready_specs(&self, project: &str, page: PageOptions) -> Result<Paged<Spec>> {
        self.get_json(&format!("/v1/projects/{project}/specs/ready"), &page.query())
            .await
    }

    pub async fn update_spec(
        &self,
        project: &str,
        spec_id: &str,
        updates: &UpdateSpec,
    ) -> Result<Spec> {
        let request = self
            .http
            .patch(self.url(&format!("/v1/projects/{project}/specs/{spec_id}")))
            .json(updates);
        Self::decode(self.execute(request).await?).await
    }

    pub async fn delete_spec(&self, project: &str, spec_id: &str) -> Result<()> {
        let request = self
            .http
            .delete(self.url(&format!("/v1/projects/{project}/specs/{spec_id}")));
        Self::expect_no_content(self.execute(request).await?).await
    }

    pub async fn cancel_spec(&self, project: &str, spec_id: &str) -> Result<Spec> {
        self.post_json(&format!("/v1/projects/{project}/specs/{spec_id}/cancel"), None)
            .await
    }

    pub async fn reopen_spec(&self, project: &str, spec_id: &str) -> Result<Spec> {
        self.post_json(&format!("/v1/projects/{project}/specs/{spec_id}/reopen"), None)
            .await
    }

    pub async fn tasks_in_spec(
        &self,
        project: &str,
        spec_id: &str,
        page: PageOptions,
    ) -> Result<Paged<Task>> {
        self.get_json(
            &format!("/v1/projects/{project}/specs/{spec_id}/tasks"),
            &page.query(),
        )
        .await
    }

    // ----- spec dependencies -----

    pub async fn add_spec_dependency(
        &self,
        project: &str,
        child_id: &str,
        parent_id: &str,
    ) -> Result<Dependency> {
        self.post_json(
            &format!("/v1/projects/{project}/specs/{child_id}/deps"),
            Some(json!({ "parent_id": parent_id })),
        )
        .await
    }

    pub async fn remove_spec_dependency(
        &self,
        project: &str,
        child_id: &str,
        parent_id: &str,
    ) -> Result<()> {
        let request = self.http.delete(self.url(&format!(
            "/v1/projects/{project}/specs/{child_id}/deps/{parent_id}"
        )));
        Self::expect_no_content(self.execute(request).await?).await
    }

    pub async fn list_spec_dependencies(
        &self,
        project: &str,
        spec_id: &str,
    ) -> Result<Paged<Dependency>> {
        self.get_json(&format!("/v1/projects/{project}/specs/{spec_id}/deps"), &[])
            .await
    }
}
