// Copyright (c) The devops-reporter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    config::ConnectionConfig,
    errors::TransportError,
    helpers::{basic_auth_header, encode_path_segment},
};
use debug_ignore::DebugIgnore;
use std::fmt;
use ureq::Agent;

/// The API version sent with every request.
pub const API_VERSION: &str = "7.1";

/// An HTTP method used by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PATCH`
    Patch,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
            Self::Patch => f.write_str("PATCH"),
        }
    }
}

/// A request to the service, relative to the API base URL.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    /// The request method.
    pub method: Method,

    /// The path below the API base URL, starting with `/`.
    pub path: String,

    /// Query parameters, in addition to `api-version`.
    pub query: Vec<(String, String)>,

    /// The JSON body, for `POST` and `PATCH`.
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// Creates a request with no query parameters or body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Adds a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Sets the JSON body.
    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A response from the service.
///
/// Non-success statuses are returned as responses, not errors; the client decides what they mean.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse {
    /// The HTTP status code.
    pub status: u16,

    /// The response body.
    pub body: String,
}

impl ApiResponse {
    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends requests to the service.
///
/// Implementations are blocking; the client runs them on tokio's blocking pool.
pub trait Transport: fmt::Debug + Send + Sync {
    /// Sends a request and returns the response.
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// A [`Transport`] backed by `ureq`, authenticating with a personal access token.
#[derive(Debug)]
pub struct UreqTransport {
    agent: Agent,
    base_url: String,
    authorization: DebugIgnore<String>,
}

impl UreqTransport {
    /// Creates a transport for the organization and project in `config`.
    pub fn new(config: &ConnectionConfig) -> Self {
        let agent_config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(config.http_timeout))
            .build();

        Self {
            agent: Agent::new_with_config(agent_config),
            base_url: base_url(config),
            authorization: DebugIgnore(basic_auth_header(&config.pat)),
        }
    }

    /// The base URL requests are sent relative to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn query_pairs<'a>(request: &'a ApiRequest) -> impl Iterator<Item = (&'a str, &'a str)> {
        std::iter::once(("api-version", API_VERSION)).chain(
            request
                .query
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str())),
        )
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let to_error = |error: ureq::Error| TransportError::Http {
            method: request.method,
            path: request.path.clone(),
            error: Box::new(error),
        };

        let empty = serde_json::Value::Object(Default::default());
        let body = request.body.as_ref().unwrap_or(&empty);
        let authorization = self.authorization.as_str();

        let mut response = match request.method {
            Method::Get => self
                .agent
                .get(url.as_str())
                .header("Authorization", authorization)
                .query_pairs(Self::query_pairs(request))
                .call(),
            Method::Post => self
                .agent
                .post(url.as_str())
                .header("Authorization", authorization)
                .query_pairs(Self::query_pairs(request))
                .send_json(body),
            Method::Patch => self
                .agent
                .patch(url.as_str())
                .header("Authorization", authorization)
                .query_pairs(Self::query_pairs(request))
                .send_json(body),
        }
        .map_err(to_error)?;

        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string().map_err(to_error)?;
        Ok(ApiResponse { status, body })
    }
}

/// The API base URL for the organization and project in `config`.
pub fn base_url(config: &ConnectionConfig) -> String {
    format!(
        "https://dev.azure.com/{}/{}/_apis",
        encode_path_segment(&config.organization),
        encode_path_segment(&config.project)
    )
}
