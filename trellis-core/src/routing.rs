// Routing: (verb, path) to resolved resource method

use crate::binding::BindingPlan;
use crate::descriptor::ResourceMethodDescriptor;
use crate::error::{Error, Result};
use crate::logging::{debug, info};
use crate::traits::{HttpMethod, RouteSink};
use matchit::{InsertError, Router as MatchitRouter};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// A resolved resource method and the plan for its arguments.
#[derive(Debug)]
pub struct Route {
    pub descriptor: ResourceMethodDescriptor,
    pub plan: BindingPlan,
}

impl Route {
    pub fn new(descriptor: ResourceMethodDescriptor, plan: BindingPlan) -> Self {
        Self { descriptor, plan }
    }
}

/// A route matched for one request, with its path parameters.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    pub params: HashMap<String, String>,
}

/// Router keyed by verb; each verb gets its own matchit tree.
///
/// Templates use `{name}` for one segment and `{*name}` for the rest of
/// the path.
#[derive(Default)]
pub struct Router {
    trees: BTreeMap<HttpMethod, MatchitRouter<Arc<Route>>>,
    routes: Vec<(HttpMethod, String, Arc<Route>)>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the route for `verb` and `path`.
    ///
    /// Captured parameters are percent-decoded; a segment that does not
    /// decode to UTF-8 is kept as sent.
    ///
    /// A path known under another verb is `MethodNotAllowed`, an unknown
    /// path is `RouteNotFound`.
    pub fn at(&self, verb: HttpMethod, path: &str) -> Result<RouteMatch> {
        if let Some(tree) = self.trees.get(&verb)
            && let Ok(matched) = tree.at(path)
        {
            return Ok(RouteMatch {
                route: matched.value.clone(),
                params: matched
                    .params
                    .iter()
                    .map(|(k, v)| (k.to_string(), decode_segment(v)))
                    .collect(),
            });
        }

        let allowed = self.allowed_methods(path);
        if allowed.is_empty() {
            Err(Error::RouteNotFound(format!("{} {}", verb, path)))
        } else {
            Err(Error::MethodNotAllowed(format!(
                "{} {} (allowed: {})",
                verb,
                path,
                allowed
                    .iter()
                    .map(HttpMethod::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            )))
        }
    }

    /// Verbs with a route matching `path`.
    pub fn allowed_methods(&self, path: &str) -> Vec<HttpMethod> {
        self.trees
            .iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(verb, _)| *verb)
            .collect()
    }

    /// Registered routes in registration order.
    pub fn routes(&self) -> impl Iterator<Item = (HttpMethod, &str, &Arc<Route>)> {
        self.routes
            .iter()
            .map(|(verb, path, route)| (*verb, path.as_str(), route))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl RouteSink for Router {
    fn register(&mut self, verb: HttpMethod, path: &str, route: Arc<Route>) -> Result<()> {
        let tree = self.trees.entry(verb).or_default();
        tree.insert(path, route.clone()).map_err(|e| match e {
            InsertError::Conflict { with } => Error::DuplicateRoute(format!(
                "{} {} ({}) conflicts with {}",
                verb,
                path,
                route.descriptor.name(),
                with
            )),
            other => Error::InvalidRoute {
                path: path.to_string(),
                reason: other.to_string(),
            },
        })?;
        info!(
            method = %verb,
            path,
            handler = %route.descriptor.name(),
            "Registered route"
        );
        self.routes.push((verb, path.to_string(), route));
        Ok(())
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.routes.iter().map(|(verb, path, _)| format!("{} {}", verb, path)))
            .finish()
    }
}

/// Register `route` in `sink` under its descriptor's verb and path.
pub fn register_route(sink: &mut dyn RouteSink, route: Route) -> Result<()> {
    let verb = route.descriptor.verb();
    let path = crate::path::route_path(route.descriptor.path());
    debug!(method = %verb, path = %path, "Registering resource method");
    sink.register(verb, &path, Arc::new(route))
}

fn decode_segment(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::Annotation;
    use crate::handle::{MethodHandle, Reply};
    use crate::inheritance::InterfaceConflictPolicy;
    use crate::resource::{MethodDecl, ResourceClass, ResourceType};

    fn route(verb: Annotation, path: &str) -> Route {
        let class: Arc<dyn ResourceType> = ResourceClass::abstract_class("Res")
            .method(
                MethodDecl::new("m")
                    .annotate(verb)
                    .handle(MethodHandle::new(|_, _| async { Ok(Reply::Empty) })),
            )
            .build();
        let descriptor = ResourceMethodDescriptor::from_method(
            &class,
            &class,
            &class.methods()[0],
            path,
            InterfaceConflictPolicy::FirstMatch,
        )
        .unwrap()
        .unwrap();
        let plan = BindingPlan::for_descriptor(&descriptor).unwrap();
        Route::new(descriptor, plan)
    }

    #[test]
    fn test_match_with_params() {
        let mut router = Router::new();
        register_route(&mut router, route(Annotation::get(), "users/{id}")).unwrap();
        let matched = router.at(HttpMethod::GET, "/users/42").unwrap();
        assert_eq!(matched.params.get("id"), Some(&"42".to_string()));
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn test_params_are_percent_decoded() {
        let mut router = Router::new();
        register_route(&mut router, route(Annotation::get(), "users/{name}")).unwrap();
        let matched = router.at(HttpMethod::GET, "/users/a%20b").unwrap();
        assert_eq!(matched.params.get("name"), Some(&"a b".to_string()));

        // invalid UTF-8 stays raw
        let matched = router.at(HttpMethod::GET, "/users/%FF").unwrap();
        assert_eq!(matched.params.get("name"), Some(&"%FF".to_string()));
    }

    #[test]
    fn test_not_found_vs_method_not_allowed() {
        let mut router = Router::new();
        register_route(&mut router, route(Annotation::get(), "users")).unwrap();
        assert!(matches!(
            router.at(HttpMethod::POST, "/users").unwrap_err(),
            Error::MethodNotAllowed(_)
        ));
        assert!(matches!(
            router.at(HttpMethod::GET, "/nope").unwrap_err(),
            Error::RouteNotFound(_)
        ));
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let mut router = Router::new();
        register_route(&mut router, route(Annotation::get(), "users")).unwrap();
        register_route(&mut router, route(Annotation::post(), "users")).unwrap();
        let err = register_route(&mut router, route(Annotation::get(), "/users/")).unwrap_err();
        assert!(matches!(err, Error::DuplicateRoute(_)));
    }

    #[test]
    fn test_root_route() {
        let mut router = Router::new();
        register_route(&mut router, route(Annotation::get(), "")).unwrap();
        assert!(router.at(HttpMethod::GET, "/").is_ok());
    }
}
