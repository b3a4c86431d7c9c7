// Application assembly and HTTP server

use crate::binding::BindingPlan;
use crate::container::Container;
use crate::dispatcher::{JsonErrorReporter, RequestDispatcher};
use crate::error::{Error, Result};
use crate::handle::Instance;
use crate::http::{HttpRequest, HttpResponse, RequestBody, parse_query};
use crate::inheritance::InterfaceConflictPolicy;
use crate::logging::{debug, error, info, warn};
use crate::reader::{ContentReader, ContentReaders};
use crate::resolver;
use crate::resource::{ResourceType, TypeKey};
use crate::routing::{Route, Router, register_route};
use crate::traits::{ErrorReporter, HttpMethod, ResourceProvider};
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderName, HeaderValue, StatusCode};
use http_body_util::{Full, Limited};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, body::Incoming as IncomingBody};
use hyper_util::rt::TokioIo;
use std::any::Any;
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Name of the marker that makes a registered class a provider class
/// rather than a resource.
pub const PROVIDER_MARKER: &str = "Provider";

/// The set of resource types, provider classes and singletons served
/// together under one application path.
///
/// ```
/// use std::sync::Arc;
/// use trellis_core::annotation::Annotation;
/// use trellis_core::application::ResourceApplication;
/// use trellis_core::handle::{MethodHandle, Reply};
/// use trellis_core::http::HttpRequest;
/// use trellis_core::resource::{MethodDecl, ResourceClass};
///
/// struct Hello;
///
/// let hello = ResourceClass::builder::<Hello>()
///     .annotate(Annotation::path("hello"))
///     .method(
///         MethodDecl::new("say")
///             .annotate(Annotation::get())
///             .handle(MethodHandle::on(|_: Arc<Hello>, _| async { Ok(Reply::text("hi")) })),
///     )
///     .build();
///
/// let table = ResourceApplication::new()
///     .application_path("api")
///     .singleton(hello, Hello)
///     .build()
///     .unwrap();
/// assert_eq!(table.router().len(), 1);
///
/// # tokio_test::block_on(async {
/// let res = table.handle(HttpRequest::new("GET", "/api/hello")).await;
/// assert_eq!(res.body_text(), "hi");
/// # });
/// ```
pub struct ResourceApplication {
    application_path: String,
    resources: Vec<Arc<dyn ResourceType>>,
    provider_classes: Vec<Arc<dyn ResourceType>>,
    singletons: HashMap<TypeKey, Instance>,
    properties: HashMap<String, serde_json::Value>,
    conflict_policy: InterfaceConflictPolicy,
    provider: Option<Arc<dyn ResourceProvider>>,
    readers: ContentReaders,
    reporter: Option<Arc<dyn ErrorReporter>>,
}

impl ResourceApplication {
    pub fn new() -> Self {
        Self {
            application_path: String::new(),
            resources: Vec::new(),
            provider_classes: Vec::new(),
            singletons: HashMap::new(),
            properties: HashMap::new(),
            conflict_policy: InterfaceConflictPolicy::default(),
            provider: None,
            readers: ContentReaders::new(),
            reporter: None,
        }
    }

    /// Prefix of every route; empty by default.
    pub fn application_path(mut self, path: impl Into<String>) -> Self {
        self.application_path = path.into();
        self
    }

    /// Register a class. Classes carrying the `Provider` marker are kept as
    /// provider classes and never routed; everything else is a resource.
    pub fn class(self, ty: Arc<dyn ResourceType>) -> Self {
        let is_provider = ty.annotations().iter().any(|a| {
            matches!(a, crate::annotation::Annotation::Marker(m) if m.name == PROVIDER_MARKER)
        });
        if is_provider {
            self.provider_class(ty)
        } else {
            self.resource(ty)
        }
    }

    pub fn resource(mut self, ty: Arc<dyn ResourceType>) -> Self {
        self.resources.push(ty);
        self
    }

    pub fn provider_class(mut self, ty: Arc<dyn ResourceType>) -> Self {
        self.provider_classes.push(ty);
        self
    }

    /// Register a resource served by one shared instance.
    pub fn singleton<T: Any + Send + Sync>(mut self, ty: Arc<dyn ResourceType>, instance: T) -> Self {
        self.singletons.insert(ty.key().clone(), Arc::new(instance));
        self.resources.push(ty);
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn conflict_policy(mut self, policy: InterfaceConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Where non-singleton resource instances come from. Defaults to an
    /// empty [`Container`].
    pub fn provider(mut self, provider: Arc<dyn ResourceProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn reader<T: Any>(mut self, reader: impl ContentReader) -> Self {
        self.readers.register::<T>(reader);
        self
    }

    pub fn readers(mut self, readers: ContentReaders) -> Self {
        self.readers = readers;
        self
    }

    pub fn error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Resolve every resource and build the route table. Any malformed
    /// metadata aborts the build.
    pub fn build(self) -> Result<RouteTable> {
        let mut router = Router::new();
        for resource in &self.resources {
            let descriptors =
                resolver::resolve_all(resource, &self.application_path, self.conflict_policy)?;
            debug!(
                resource = resource.name(),
                methods = descriptors.len(),
                "Resolved resource"
            );
            for descriptor in descriptors {
                let plan = BindingPlan::for_descriptor(&descriptor)?;
                register_route(&mut router, Route::new(descriptor, plan))?;
            }
        }
        info!(
            routes = router.len(),
            resources = self.resources.len(),
            providers = self.provider_classes.len(),
            "Route table built"
        );

        let fallback = self
            .provider
            .unwrap_or_else(|| Arc::new(Container::new()) as Arc<dyn ResourceProvider>);
        let provider: Arc<dyn ResourceProvider> = if self.singletons.is_empty() {
            fallback
        } else {
            Arc::new(SingletonProvider {
                singletons: self.singletons,
                fallback,
            })
        };
        let reporter = self
            .reporter
            .unwrap_or_else(|| Arc::new(JsonErrorReporter::new()) as Arc<dyn ErrorReporter>);

        Ok(RouteTable {
            application_path: self.application_path,
            router,
            provider_classes: self.provider_classes,
            properties: self.properties,
            dispatcher: RequestDispatcher::new(provider, Arc::new(self.readers), reporter),
        })
    }
}

impl Default for ResourceApplication {
    fn default() -> Self {
        Self::new()
    }
}

/// Singleton instances first, then the configured provider.
struct SingletonProvider {
    singletons: HashMap<TypeKey, Instance>,
    fallback: Arc<dyn ResourceProvider>,
}

#[async_trait]
impl ResourceProvider for SingletonProvider {
    async fn get(&self, key: &TypeKey) -> Result<Instance> {
        match self.singletons.get(key) {
            Some(instance) => Ok(instance.clone()),
            None => self.fallback.get(key).await,
        }
    }

    fn release(&self, key: &TypeKey, instance: Instance) {
        if !self.singletons.contains_key(key) {
            self.fallback.release(key, instance);
        }
    }
}

/// The read-only product of [`ResourceApplication::build`].
pub struct RouteTable {
    application_path: String,
    router: Router,
    provider_classes: Vec<Arc<dyn ResourceType>>,
    properties: HashMap<String, serde_json::Value>,
    dispatcher: RequestDispatcher,
}

impl RouteTable {
    /// Route and dispatch one request.
    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        let matched = HttpMethod::from_str(&request.method)
            .ok_or_else(|| Error::MethodNotAllowed(request.method.clone()))
            .and_then(|verb| self.router.at(verb, &request.path));
        match matched {
            Ok(matched) => self.dispatcher.dispatch(request, matched).await,
            Err(err) => {
                debug!(method = %request.method, path = %request.path, error = %err, "No route");
                self.dispatcher.reporter().report(&request.head(), &err)
            }
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn application_path(&self) -> &str {
        &self.application_path
    }

    pub fn provider_classes(&self) -> &[Arc<dyn ResourceType>] {
        &self.provider_classes
    }

    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("application_path", &self.application_path)
            .field("router", &self.router)
            .finish()
    }
}

/// HTTP/1 server for a route table.
#[derive(Debug, Clone)]
pub struct Server {
    table: Arc<RouteTable>,
    addr: SocketAddr,
    max_body_bytes: usize,
}

impl Server {
    pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

    pub fn new(table: Arc<RouteTable>) -> Self {
        Self {
            table,
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_body_bytes: Self::DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Requests with longer bodies fail with 413 when the entity is read.
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Serve until the process ends.
    pub async fn listen(self) -> Result<()> {
        self.listen_until(std::future::pending()).await
    }

    /// Serve until `shutdown` completes.
    pub async fn listen_until(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from an already bound listener until `shutdown`
    /// completes. Connections in flight are left to finish on their own.
    pub async fn serve(self, listener: TcpListener, shutdown: impl Future<Output = ()>) -> Result<()> {
        info!(addr = %listener.local_addr()?, "Server listening");
        tokio::pin!(shutdown);

        loop {
            let (stream, remote) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
                _ = &mut shutdown => {
                    info!("Server shutting down");
                    return Ok(());
                }
            };

            let io = TokioIo::new(stream);
            let table = self.table.clone();
            let limit = self.max_body_bytes;

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<IncomingBody>| {
                    let table = table.clone();
                    async move { Ok::<_, Infallible>(handle_request(req, &table, limit).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!(remote = %remote, error = %err, "Error serving connection");
                }
            });
        }
    }
}

/// Convert, route, dispatch and convert back.
async fn handle_request(
    req: Request<IncomingBody>,
    table: &RouteTable,
    limit: usize,
) -> Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();

    let mut request = HttpRequest::new(parts.method.as_str(), parts.uri.path());
    if let Some(query) = parts.uri.query() {
        request.query_params = parse_query(query);
    }
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            request.headers.insert(name.to_string(), value.to_string());
        }
    }
    request.body = RequestBody::streaming(Limited::new(body, limit));

    into_hyper(table.handle(request).await)
}

fn into_hyper(response: HttpResponse) -> Response<Full<Bytes>> {
    let mut out = Response::new(Full::new(Bytes::from(response.body)));
    *out.status_mut() =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    for (key, value) in response.headers {
        match (HeaderName::from_bytes(key.as_bytes()), HeaderValue::from_str(&value)) {
            (Ok(name), Ok(value)) => {
                out.headers_mut().append(name, value);
            }
            _ => warn!(header = %key, "Dropping invalid response header"),
        }
    }
    out
}
