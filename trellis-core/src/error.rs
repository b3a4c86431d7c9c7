// Error types for the Trellis resource runtime

use thiserror::Error;

/// Boxed error used as the cause of failures raised by resource methods,
/// providers and content readers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
    // Startup: malformed resource metadata. Any of these aborts the build
    // of the route table.
    #[error("Unknown HTTP method `{verb}` declared on {method}")]
    UnknownHttpMethod { method: String, verb: String },

    #[error("Malformed annotation on {element}: {reason}")]
    MalformedAnnotation { element: String, reason: String },

    #[error(
        "Ambiguous {annotation} on {method}: interfaces {first} and {second} declare different values"
    )]
    AmbiguousInterfaceAnnotation {
        method: String,
        annotation: &'static str,
        first: String,
        second: String,
    },

    #[error("Ambiguous entity parameters on {method}: positions {positions:?} all bind the request body")]
    AmbiguousEntity { method: String, positions: Vec<usize> },

    #[error("Duplicate route: {0}")]
    DuplicateRoute(String),

    #[error("Invalid route `{path}`: {reason}")]
    InvalidRoute { path: String, reason: String },

    // Request: raised while dispatching a single request.
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Cannot resolve resource instance for {resource}: {reason}")]
    Resolution { resource: String, reason: String },

    #[error("Cannot bind parameter #{position} ({name}): {reason}")]
    ParameterBinding {
        position: usize,
        name: String,
        reason: String,
    },

    #[error("Unsupported Media Type: {0}")]
    UnsupportedMediaType(String),

    #[error("Not Acceptable: {0}")]
    NotAcceptable(String),

    #[error("Resource method {method} failed: {source}")]
    Invocation {
        method: String,
        #[source]
        source: BoxError,
    },

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    // Errors a resource method may raise to pick its own status.
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::RouteNotFound(_) | Error::NotFound(_) => 404,
            Error::MethodNotAllowed(_) => 405,
            Error::NotAcceptable(_) => 406,
            Error::UnsupportedMediaType(_) => 415,
            Error::PayloadTooLarge(_) => 413,
            Error::ParameterBinding { .. }
            | Error::BadRequest(_)
            | Error::Deserialization(_) => 400,
            Error::Unauthorized(_) => 401,
            Error::Forbidden(_) => 403,
            Error::Conflict(_) => 409,
            // A resource method that fails with one of our own errors keeps
            // that error's status.
            Error::Invocation { source, .. } => source
                .downcast_ref::<Error>()
                .map(Error::status_code)
                .unwrap_or(500),
            _ => 500,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// True for the errors that can only happen while building the route
    /// table.
    pub fn is_startup_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownHttpMethod { .. }
                | Error::MalformedAnnotation { .. }
                | Error::AmbiguousInterfaceAnnotation { .. }
                | Error::AmbiguousEntity { .. }
                | Error::DuplicateRoute(_)
                | Error::InvalidRoute { .. }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_status_codes() {
        assert_eq!(Error::RouteNotFound("GET /x".into()).status_code(), 404);
        assert_eq!(Error::MethodNotAllowed("PUT /x".into()).status_code(), 405);
        assert_eq!(
            Error::ParameterBinding {
                position: 0,
                name: "id".into(),
                reason: "missing".into()
            }
            .status_code(),
            400
        );
        assert_eq!(
            Error::Resolution {
                resource: "Foo".into(),
                reason: "not registered".into()
            }
            .status_code(),
            500
        );
    }

    #[test]
    fn test_invocation_keeps_inner_status() {
        let err = Error::Invocation {
            method: "Foo#get".into(),
            source: Box::new(Error::NotFound("gorp 7".into())),
        };
        assert_eq!(err.status_code(), 404);

        let err = Error::Invocation {
            method: "Foo#get".into(),
            source: "boom".into(),
        };
        assert_eq!(err.status_code(), 500);
        assert!(err.is_server_error());
    }

    #[test]
    fn test_startup_classification() {
        assert!(Error::DuplicateRoute("GET /a".into()).is_startup_error());
        assert!(!Error::NotAcceptable("text/html".into()).is_startup_error());
    }
}
