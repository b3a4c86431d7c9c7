//! Request dispatch.
//!
//! One dispatch runs a matched route through four states:
//!
//! - **Received**: media types are checked against `Content-Type` and
//!   `Accept`, a [`RequestScope`] is opened and the resource instance is
//!   obtained from the provider.
//! - **ParamsResolved**: every binding of the route's plan has produced an
//!   argument; the entity is read from the body, named values are taken
//!   from the request and converted.
//! - **Invoked**: the method handle has run to completion.
//! - **ResponseSent**: the reply has been turned into a response.
//!
//! A failure in any state ends the dispatch; the error goes to the
//! [`ErrorReporter`] and the method is not invoked if it had not been yet.
//! Dropping the dispatch future abandons it at its current await point and
//! the scope still releases the instance.

use crate::annotation::ParamSource;
use crate::binding::{BindingKind, ParameterBinding};
use crate::error::{Error, Result};
use crate::handle::{Args, Instance, Reply, Value};
use crate::http::{HttpRequest, HttpResponse, RequestHead};
use crate::logging::{debug, error, trace, warn};
use crate::media_type::{self, MediaType};
use crate::reader::ContentReaders;
use crate::resource::{ReturnKind, TypeKey};
use crate::routing::{Route, RouteMatch};
use crate::traits::{ErrorReporter, ResourceProvider};
use futures_util::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{Instrument, info_span};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Received,
    ParamsResolved,
    Invoked,
    ResponseSent,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatchState::Received => "received",
            DispatchState::ParamsResolved => "params_resolved",
            DispatchState::Invoked => "invoked",
            DispatchState::ResponseSent => "response_sent",
        };
        f.write_str(name)
    }
}

/// Per-request scope: owns the resource instance and gives it back to the
/// provider exactly once, when dropped.
pub struct RequestScope {
    id: Uuid,
    provider: Arc<dyn ResourceProvider>,
    resource: Option<(TypeKey, Instance)>,
    state: DispatchState,
}

impl RequestScope {
    pub fn open(provider: Arc<dyn ResourceProvider>) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider,
            resource: None,
            state: DispatchState::Received,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    fn advance(&mut self, state: DispatchState) {
        trace!(from = %self.state, to = %state, "Dispatch state");
        self.state = state;
    }

    /// Obtain the instance for `key` and keep it until the scope closes.
    pub async fn acquire(&mut self, key: &TypeKey) -> Result<Instance> {
        let instance = self.provider.get(key).await.map_err(|e| match e {
            e @ Error::Resolution { .. } => e,
            other => Error::Resolution {
                resource: key.to_string(),
                reason: other.to_string(),
            },
        })?;
        self.resource = Some((key.clone(), instance.clone()));
        Ok(instance)
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        if self.state != DispatchState::ResponseSent {
            debug!(request_id = %self.id, state = %self.state, "Request scope closed early");
        }
        if let Some((key, instance)) = self.resource.take() {
            self.provider.release(&key, instance);
        }
    }
}

impl fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("holds_instance", &self.resource.is_some())
            .finish()
    }
}

/// Executes matched routes.
#[derive(Clone)]
pub struct RequestDispatcher {
    provider: Arc<dyn ResourceProvider>,
    readers: Arc<ContentReaders>,
    reporter: Arc<dyn ErrorReporter>,
}

impl RequestDispatcher {
    pub fn new(
        provider: Arc<dyn ResourceProvider>,
        readers: Arc<ContentReaders>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            provider,
            readers,
            reporter,
        }
    }

    pub fn reporter(&self) -> &Arc<dyn ErrorReporter> {
        &self.reporter
    }

    /// Run `matched` for `request`. Never fails: errors become the
    /// reporter's response.
    pub async fn dispatch(&self, mut request: HttpRequest, matched: RouteMatch) -> HttpResponse {
        let mut scope = RequestScope::open(self.provider.clone());
        let span = info_span!(
            "request",
            id = %scope.id(),
            method = %request.method,
            path = %request.path,
        );
        async move {
            let head = request.head();
            request.path_params = matched.params;
            let route = matched.route;

            let response = match self.run(&mut scope, &mut request, &route).await {
                Ok(response) => response,
                Err(err) => {
                    if err.is_server_error() {
                        error!(error = %err, handler = %route.descriptor.name(), "Request failed");
                    } else {
                        warn!(error = %err, handler = %route.descriptor.name(), "Request rejected");
                    }
                    self.reporter.report(&head, &err)
                }
            };
            scope.advance(DispatchState::ResponseSent);
            debug!(status = response.status, "Response ready");
            response
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        scope: &mut RequestScope,
        request: &mut HttpRequest,
        route: &Route,
    ) -> Result<HttpResponse> {
        let descriptor = &route.descriptor;

        // Received
        let content_type = request.content_type().map(str::to_string);
        if !media_type::is_consumable(descriptor.consumes(), content_type.as_deref()) {
            return Err(Error::UnsupportedMediaType(format!(
                "{} consumes {}",
                descriptor.name(),
                join(descriptor.consumes())
            )));
        }
        let accepted = media_type::parse_accept(request.accept());
        let selected = media_type::select_produced(descriptor.produces(), &accepted).map_err(|_| {
            Error::NotAcceptable(format!(
                "{} produces {}",
                descriptor.name(),
                join(descriptor.produces())
            ))
        })?;
        let instance = scope.acquire(descriptor.owner().key()).await?;

        // ParamsResolved
        let content_type = content_type.as_deref().and_then(MediaType::parse);
        let mut values: Vec<Value> = Vec::with_capacity(route.plan.len());
        for binding in route.plan.bindings() {
            let value = match &binding.kind {
                BindingKind::Entity => self.read_entity(binding, request, content_type.as_ref()).await?,
                BindingKind::Named { source, name } => named_value(binding, request, *source, name)?,
            };
            values.push(value);
        }
        scope.advance(DispatchState::ParamsResolved);

        // Invoked
        let invocation = descriptor.handle().invoke(instance, Args::new(values));
        let outcome = AssertUnwindSafe(invocation).catch_unwind().await;
        let reply = match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(source)) => {
                return Err(Error::Invocation {
                    method: descriptor.name(),
                    source,
                });
            }
            Err(panic) => {
                return Err(Error::Invocation {
                    method: descriptor.name(),
                    source: panic_message(panic).into(),
                });
            }
        };
        scope.advance(DispatchState::Invoked);

        match descriptor.returns() {
            ReturnKind::Void => Ok(HttpResponse::no_content()),
            ReturnKind::Entity => write_reply(reply, selected.as_ref()),
        }
    }

    async fn read_entity(
        &self,
        binding: &ParameterBinding,
        request: &mut HttpRequest,
        content_type: Option<&MediaType>,
    ) -> Result<Value> {
        let target = binding.ty.key();
        let reader = self.readers.get(target).ok_or_else(|| Error::ParameterBinding {
            position: binding.position,
            name: binding.label(),
            reason: format!("no content reader for {}", target),
        })?;
        trace!(target = %target, "Reading entity");
        reader
            .read(&mut request.body, content_type, target)
            .await
            .map_err(|e| match e {
                e @ Error::PayloadTooLarge(_) => e,
                other => Error::ParameterBinding {
                    position: binding.position,
                    name: binding.label(),
                    reason: other.to_string(),
                },
            })
    }
}

impl fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("readers", &self.readers)
            .finish()
    }
}

fn named_value(
    binding: &ParameterBinding,
    request: &HttpRequest,
    source: ParamSource,
    name: &str,
) -> Result<Value> {
    let raw = match source {
        ParamSource::Path => request.param(name).cloned(),
        ParamSource::Query => request.query(name).cloned(),
        ParamSource::Header => request.header(name).cloned(),
        ParamSource::Cookie => request.cookie(name),
    };
    let failure = |reason: String| Error::ParameterBinding {
        position: binding.position,
        name: binding.label(),
        reason,
    };
    match raw.or_else(|| binding.default_value.clone()) {
        Some(raw) => binding.ty.convert(&raw).map_err(failure),
        None => binding
            .ty
            .absent_value()
            .ok_or_else(|| failure("missing from request".to_string())),
    }
}

fn write_reply(reply: Reply, selected: Option<&MediaType>) -> Result<HttpResponse> {
    let content_type = |fallback: MediaType| selected.cloned().unwrap_or(fallback).to_string();
    let response = match reply {
        Reply::Empty => HttpResponse::no_content(),
        Reply::Json(value) => {
            let body = serde_json::to_vec(&value).map_err(|e| Error::Serialization(e.to_string()))?;
            HttpResponse::ok()
                .with_header("Content-Type", content_type(MediaType::json()))
                .with_body(body)
        }
        Reply::Text(text) => HttpResponse::ok()
            .with_header(
                "Content-Type",
                content_type(MediaType::plain_text().with_param("charset", "utf-8")),
            )
            .with_body(text.into_bytes()),
        Reply::Bytes { body, media_type } => {
            let media_type = media_type
                .or_else(|| selected.cloned())
                .unwrap_or_else(MediaType::octet_stream);
            HttpResponse::ok()
                .with_header("Content-Type", media_type.to_string())
                .with_body(body.to_vec())
        }
        Reply::Response(mut response) => {
            if let Some(selected) = selected
                && !response.body.is_empty()
                && response.header("content-type").is_none()
            {
                response
                    .headers
                    .insert("Content-Type".to_string(), selected.to_string());
            }
            response
        }
    };
    Ok(response)
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(message) => format!("panicked: {}", message),
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(message) => format!("panicked: {}", message),
            Err(_) => "panicked".to_string(),
        },
    }
}

fn join(types: &[MediaType]) -> String {
    types
        .iter()
        .map(MediaType::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Default error channel: status from [`Error::status_code`] and a JSON
/// body `{"error", "status"}`.
#[derive(Debug, Clone, Default)]
pub struct JsonErrorReporter {
    expose_internal: bool,
}

impl JsonErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Include the message of 5xx errors in the body instead of a generic
    /// one.
    pub fn expose_internal(mut self, expose: bool) -> Self {
        self.expose_internal = expose;
        self
    }
}

impl ErrorReporter for JsonErrorReporter {
    fn report(&self, _request: &RequestHead, error: &Error) -> HttpResponse {
        let status = error.status_code();
        let message = if status >= 500 && !self.expose_internal {
            "Internal server error".to_string()
        } else {
            error.to_string()
        };
        let body = serde_json::json!({
            "error": message,
            "status": status,
        });
        HttpResponse::new(status)
            .with_json(&body)
            .unwrap_or_else(|_| HttpResponse::internal_server_error())
    }
}
