// In-process test client

use std::collections::HashMap;
use std::sync::Arc;
use trellis_core::{HttpMethod, HttpRequest, HttpResponse, ResourceApplication, Result, RouteTable};

/// Drives a `RouteTable` without a socket
#[derive(Clone)]
pub struct TestClient {
    table: Arc<RouteTable>,
}

impl TestClient {
    pub fn new(table: Arc<RouteTable>) -> Self {
        Self { table }
    }

    /// Build the application and wrap the resulting table
    pub fn from_application(application: ResourceApplication) -> Result<Self> {
        Ok(Self::new(Arc::new(application.build()?)))
    }

    pub fn table(&self) -> &Arc<RouteTable> {
        &self.table
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(HttpMethod::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Vec<u8>) -> TestResponse {
        self.request(HttpMethod::POST, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: Vec<u8>) -> TestResponse {
        self.request(HttpMethod::PUT, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request(HttpMethod::DELETE, path, None).await
    }

    pub async fn patch(&self, path: &str, body: Vec<u8>) -> TestResponse {
        self.request(HttpMethod::PATCH, path, Some(body)).await
    }

    /// Make a request with custom method; `path` may carry a query string
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> TestResponse {
        let mut req = HttpRequest::from_target(method.as_str(), path);
        if let Some(body) = body {
            req = req.with_body(body);
        }
        self.send(req).await
    }

    pub async fn send(&self, request: HttpRequest) -> TestResponse {
        TestResponse::new(self.table.handle(request).await)
    }
}

/// Builder for test requests
pub struct TestRequestBuilder {
    method: HttpMethod,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    query_params: Vec<(String, String)>,
}

impl TestRequestBuilder {
    pub fn new(method: HttpMethod, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            headers: HashMap::new(),
            body: Vec::new(),
            query_params: Vec::new(),
        }
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    pub fn content_type(self, value: &str) -> Self {
        self.header("Content-Type", value)
    }

    pub fn accept(self, value: &str) -> Self {
        self.header("Accept", value)
    }

    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        let pair = format!("{}={}", name, value);
        self.headers
            .entry("Cookie".to_string())
            .and_modify(|cookies| {
                cookies.push_str("; ");
                cookies.push_str(&pair);
            })
            .or_insert(pair);
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// JSON body plus `Content-Type: application/json`
    pub fn json<T: serde::Serialize>(self, value: &T) -> serde_json::Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(self.content_type("application/json").body(body))
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query_params.push((key.to_string(), value.to_string()));
        self
    }

    pub fn build(self) -> HttpRequest {
        let mut request = HttpRequest::new(self.method.as_str(), self.path);
        request.query_params.extend(self.query_params);
        request.headers = self.headers;
        if !self.body.is_empty() {
            request = request.with_body(self.body);
        }
        request
    }

    pub async fn send(self, client: &TestClient) -> TestResponse {
        client.send(self.build()).await
    }
}

/// Response from a test request
#[derive(Debug, Clone)]
pub struct TestResponse {
    response: HttpResponse,
}

impl TestResponse {
    pub fn new(response: HttpResponse) -> Self {
        Self { response }
    }

    pub fn into_inner(self) -> HttpResponse {
        self.response
    }

    pub fn status(&self) -> u16 {
        self.response.status
    }

    pub fn body(&self) -> &[u8] {
        &self.response.body
    }

    pub fn body_string(&self) -> String {
        self.response.body_text()
    }

    pub fn body_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, String> {
        serde_json::from_slice(&self.response.body)
            .map_err(|e| format!("Serialization error: {}", e))
    }

    /// Case-insensitive header lookup
    pub fn header(&self, key: &str) -> Option<&str> {
        self.response.header(key)
    }

    /// Panics unless the status is 2xx
    pub fn assert_success(&self) -> &HttpResponse {
        assert!(
            (200..300).contains(&self.status()),
            "Expected success response, got {}: {}",
            self.status(),
            self.body_string()
        );
        &self.response
    }

    /// Panics unless the status is 4xx or 5xx
    pub fn assert_error(&self) -> &HttpResponse {
        assert!(
            self.status() >= 400,
            "Expected error response, got {}",
            self.status()
        );
        &self.response
    }
}
