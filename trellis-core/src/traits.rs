// Collaborator contracts for the Trellis resource runtime

use crate::error::{Error, Result};
use crate::handle::Instance;
use crate::http::{HttpResponse, RequestHead};
use crate::resource::TypeKey;
use crate::routing::Route;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Supplies resource instances, dependency-injection style.
///
/// `get` is called once per dispatched request; the matching `release` is
/// called exactly once when the request scope closes, whether the request
/// completed or was abandoned.
#[async_trait]
pub trait ResourceProvider: Send + Sync + 'static {
    async fn get(&self, key: &TypeKey) -> Result<Instance>;

    fn release(&self, _key: &TypeKey, _instance: Instance) {}
}

#[async_trait]
impl<P: ResourceProvider + ?Sized> ResourceProvider for Arc<P> {
    async fn get(&self, key: &TypeKey) -> Result<Instance> {
        (**self).get(key).await
    }

    fn release(&self, key: &TypeKey, instance: Instance) {
        (**self).release(key, instance)
    }
}

/// Turns a per-request failure into the response sent to the client.
pub trait ErrorReporter: Send + Sync + 'static {
    fn report(&self, request: &RequestHead, error: &Error) -> HttpResponse;
}

/// Receives routes while the route table is being built.
pub trait RouteSink {
    fn register(&mut self, verb: HttpMethod, path: &str, route: Arc<Route>) -> Result<()>;
}

/// HTTP methods
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::GET,
        HttpMethod::POST,
        HttpMethod::PUT,
        HttpMethod::DELETE,
        HttpMethod::PATCH,
        HttpMethod::HEAD,
        HttpMethod::OPTIONS,
    ];

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "DELETE" => Some(HttpMethod::DELETE),
            "PATCH" => Some(HttpMethod::PATCH),
            "HEAD" => Some(HttpMethod::HEAD),
            "OPTIONS" => Some(HttpMethod::OPTIONS),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
