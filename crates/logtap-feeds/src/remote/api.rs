//! The logging backend seam.
//!
//! [`LoggingApi`] is the narrow slice of a Cloud Logging client the remote
//! reader needs. The HTTP implementation lives in [`super::http`]; tests swap
//! in an in-memory one.

use async_trait::async_trait;
use logtap_core::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sort order for historical queries: oldest first, so the watermark only moves forward.
pub const ORDER_BY_TIMESTAMP_ASC: &str = "timestamp asc";

/// The resource name that scopes every query to one project.
pub fn project_resource(project: &str) -> String {
    format!("projects/{project}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEntriesRequest {
    pub resource_names: Vec<String>,
    pub filter: String,
    pub order_by: String,
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

/// One page of a historical query.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPage {
    #[serde(default)]
    pub entries: Vec<Value>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl EntryPage {
    /// The token for the following page, if the backend says there is one.
    pub fn next_token(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// The opening message of a tail session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TailRequest {
    pub resource_names: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub filter: String,
}

/// One message of the tail stream.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TailResponse {
    #[serde(default)]
    pub entries: Vec<Value>,
    #[serde(default)]
    pub suppression_info: Vec<Value>,
}

#[async_trait]
pub trait LoggingApi: Send + Sync {
    /// Check that the backend is reachable with the current credentials.
    ///
    /// One single-item log listing under `resource` by default.
    async fn connect(&self, resource: &str) -> Result<()> {
        self.list_logs(resource, 1).await.map(|_| ())
    }

    /// List log names under `resource`. Also the default reachability check.
    async fn list_logs(&self, resource: &str, page_size: u32) -> Result<Vec<String>>;

    async fn list_entries(&self, request: &ListEntriesRequest) -> Result<EntryPage>;

    /// Open a live tail stream.
    async fn tail_entries(&self) -> Result<Box<dyn TailSession>>;
}

/// A bidirectional tail stream: one request goes up, batches come down.
#[async_trait]
pub trait TailSession: Send {
    async fn send(&mut self, request: TailRequest) -> Result<()>;

    /// The next batch of entries; `None` once the server ends the stream.
    async fn recv(&mut self) -> Result<Option<TailResponse>>;

    /// Half-close the upstream side.
    async fn close_send(&mut self) -> Result<()> {
        Ok(())
    }
}
