// Copyright (c) The devops-reporter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{ApiRequest, ApiResponse, Method, Transport};
use crate::errors::TransportError;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// A transport that records every request and replies with canned responses.
///
/// Requests without a canned response get `200 {}`.
#[derive(Debug, Default)]
pub(crate) struct RecordingTransport {
    requests: Mutex<Vec<ApiRequest>>,
    responses: Mutex<HashMap<(Method, String), ApiResponse>>,
}

impl RecordingTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn respond(
        &self,
        method: Method,
        path: &str,
        status: u16,
        body: serde_json::Value,
    ) {
        self.responses.lock().unwrap().insert(
            (method, path.to_owned()),
            ApiResponse {
                status,
                body: body.to_string(),
            },
        );
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// The requests sent so far, as `METHOD path` strings.
    pub(crate) fn request_lines(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| format!("{} {}", request.method, request.path))
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let response = self
            .responses
            .lock()
            .unwrap()
            .get(&(request.method, request.path.clone()))
            .cloned()
            .unwrap_or_else(|| ApiResponse {
                status: 200,
                body: "{}".to_owned(),
            });
        Ok(response)
    }
}
