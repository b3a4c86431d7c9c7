// Trellis - annotation-driven HTTP resources for Rust
//
// Resource classes declare their HTTP metadata with annotations that are
// inherited from superclasses and interfaces; Trellis resolves it once at
// startup into a route table and dispatches requests against it.

// Re-export core functionality
pub use trellis_core::*;

// Re-export optional crates
#[cfg(feature = "config")]
pub use trellis_config;

#[cfg(feature = "testing")]
pub use trellis_testing;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Annotation, Args, Container, ContentReaders, Error, HttpMethod, HttpRequest,
        HttpResponse, InterfaceConflictPolicy, MediaType, MethodDecl, MethodHandle, ParamDecl,
        ParamType, Reply, ResourceApplication, ResourceClass, ResourceProvider, ResourceType,
        Result, ReturnKind, RouteTable, Server, TypeKey,
    };

    #[cfg(feature = "config")]
    pub use trellis_config::{ConfigManager, ServerConfig};

    #[cfg(feature = "testing")]
    pub use trellis_testing::{TestClient, TestRequestBuilder, TestResponse};
}
