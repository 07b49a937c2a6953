//! Cloud Logging over its REST surface.
//!
//! | operation          | request                                 |
//! |--------------------|-----------------------------------------|
//! | access probe       | `GET  /v2/{resource}/logs?pageSize=N`   |
//! | historical page    | `POST /v2/entries:list`                 |
//! | live tail          | `POST /v2/entries:tail` (streamed body) |
//!
//! Every request carries a bearer token from a [`TokenSource`].

use super::api::{EntryPage, ListEntriesRequest, LoggingApi, TailRequest, TailResponse, TailSession};
use super::framing::JsonStreamDecoder;
use crate::auth::TokenSource;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use logtap_core::{FeedError, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// A pooled client that speaks both `https://` and plain `http://`.
pub fn https_client() -> HttpsClient {
    let connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .build();
    Client::builder(TokioExecutor::new()).build(connector)
}

/// Turn non-2xx responses into errors. 401 and 403 are access failures.
pub(crate) async fn check_status(response: Response<Incoming>, context: &str) -> Result<Response<Incoming>> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = match response.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => Bytes::new(),
    };
    let message = format!("{status}: {}", error_detail(&body));
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(FeedError::access(message))
    } else {
        Err(FeedError::transport(context, message))
    }
}

/// The `error.message` of a Google error body, or the raw body.
fn error_detail(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        if let Some(message) = value.pointer("/error/message").and_then(Value::as_str) {
            return message.to_string();
        }
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    match text.char_indices().nth(200) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

pub(crate) async fn read_json<T: DeserializeOwned>(response: Response<Incoming>, context: &str) -> Result<T> {
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| FeedError::transport(context, e))?
        .to_bytes();
    serde_json::from_slice(&body)
        .map_err(|e| FeedError::transport(context, format!("malformed response: {e}")))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogList {
    #[serde(default)]
    log_names: Vec<String>,
}

#[derive(Clone)]
pub struct HttpLoggingApi {
    client: HttpsClient,
    endpoint: String,
    tokens: Arc<dyn TokenSource>,
}

impl HttpLoggingApi {
    pub fn new(endpoint: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Self {
        Self::with_client(https_client(), endpoint, tokens)
    }

    pub fn with_client(client: HttpsClient, endpoint: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/{path}", self.endpoint)
    }

    async fn call(&self, method: Method, path: &str, body: Option<Vec<u8>>, context: &str) -> Result<Response<Incoming>> {
        let token = self.tokens.token().await?;
        let mut builder = Request::builder()
            .method(method)
            .uri(self.url(path))
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(ACCEPT, "application/json");
        let body = match body {
            Some(bytes) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Full::new(Bytes::from(bytes))
            }
            None => Full::new(Bytes::new()),
        };
        let request = builder.body(body).map_err(|e| FeedError::transport(context, e))?;
        tracing::trace!(context, path, "logging api request");
        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| FeedError::transport(context, e))?;
        match check_status(response, context).await {
            Err(err @ FeedError::Access { .. }) => {
                self.tokens.invalidate().await;
                Err(err)
            }
            other => other,
        }
    }
}

#[async_trait]
impl LoggingApi for HttpLoggingApi {
    async fn list_logs(&self, resource: &str, page_size: u32) -> Result<Vec<String>> {
        let path = format!("{resource}/logs?pageSize={page_size}");
        let response = self.call(Method::GET, &path, None, "list logs").await?;
        let list: LogList = read_json(response, "list logs").await?;
        Ok(list.log_names)
    }

    async fn list_entries(&self, request: &ListEntriesRequest) -> Result<EntryPage> {
        let body = serde_json::to_vec(request).map_err(|e| FeedError::transport("list entries", e))?;
        let response = self
            .call(Method::POST, "entries:list", Some(body), "list entries")
            .await?;
        read_json(response, "list entries").await
    }

    async fn tail_entries(&self) -> Result<Box<dyn TailSession>> {
        Ok(Box::new(HttpTailSession {
            api: self.clone(),
            body: None,
            decoder: JsonStreamDecoder::new(),
        }))
    }
}

/// A tail stream: the request is sent once, the response body never ends
/// until the server gives up or we drop it.
pub struct HttpTailSession {
    api: HttpLoggingApi,
    body: Option<Incoming>,
    decoder: JsonStreamDecoder,
}

#[async_trait]
impl TailSession for HttpTailSession {
    async fn send(&mut self, request: TailRequest) -> Result<()> {
        if self.body.is_some() {
            return Err(FeedError::transport("tail send", "tail request already sent"));
        }
        let body = serde_json::to_vec(&request).map_err(|e| FeedError::transport("tail send", e))?;
        let response = self
            .api
            .call(Method::POST, "entries:tail", Some(body), "tail send")
            .await?;
        self.body = Some(response.into_body());
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<TailResponse>> {
        loop {
            let decoded = self
                .decoder
                .next_object()
                .map_err(|e| FeedError::transport("tail recv", e))?;
            if let Some(message) = decoded {
                if let Some(error) = message.get("error") {
                    return Err(FeedError::transport("tail recv", error));
                }
                return serde_json::from_value(message)
                    .map(Some)
                    .map_err(|e| FeedError::transport("tail recv", e));
            }
            let Some(body) = self.body.as_mut() else {
                return Err(FeedError::transport("tail recv", "no tail request was sent"));
            };
            match body.frame().await {
                None if self.decoder.pending() > 0 => {
                    return Err(FeedError::transport("tail recv", "stream ended mid-message"));
                }
                None => return Ok(None),
                Some(Err(e)) => return Err(FeedError::transport("tail recv", e)),
                Some(Ok(frame)) => {
                    if let Some(data) = frame.data_ref() {
                        self.decoder.push(data);
                    }
                }
            }
        }
    }
}
