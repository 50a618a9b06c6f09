//! Outbound calls made by `callApi` actions.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client, Method,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(url: &str) -> Self {
        Self {
            url: url.to_string(),
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            body: None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} answered {status}")]
    Status { url: String, status: u16 },

    #[error("response from {url} is not JSON: {message}")]
    Decode { url: String, message: String },
}

/// The outbound-call facility. The engine only ever needs a parsed body or a
/// typed failure back.
#[mockall::automock]
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn call(&self, request: ApiRequest) -> Result<Value, NetworkError>;
}

/// [`ApiClient`] over HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpApiClient {
    client: Client,
}

impl HttpApiClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn call(&self, request: ApiRequest) -> Result<Value, NetworkError> {
        let url = request.url.clone();
        let request_error = |message: String| NetworkError::Request {
            url: url.clone(),
            message,
        };

        let method = Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|e| request_error(e.to_string()))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            headers.insert(
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| request_error(e.to_string()))?,
                HeaderValue::from_str(value).map_err(|e| request_error(e.to_string()))?,
            );
        }

        let mut builder = self.client.request(method, &request.url).headers(headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| request_error(e.to_string()))?;
        if !response.status().is_success() {
            return Err(NetworkError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        response.json().await.map_err(|e| NetworkError::Decode {
            url: url.clone(),
            message: e.to_string(),
        })
    }
}
