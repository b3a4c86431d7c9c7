// Core library for Trellis: annotation-driven resource routing
// Resource metadata resolution, parameter binding and request dispatch

pub mod annotation;
pub mod application;
pub mod binding;
pub mod container;
pub mod descriptor;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod http;
pub mod inheritance;
pub mod logging;
pub mod media_type;
pub mod path;
pub mod reader;
pub mod resolver;
pub mod resource;
pub mod routing;
pub mod traits;

// Re-export commonly used types
pub use annotation::*;
pub use application::*;
pub use binding::*;
pub use container::*;
pub use descriptor::*;
pub use dispatcher::*;
pub use error::*;
pub use handle::*;
pub use self::http::*;
pub use inheritance::InterfaceConflictPolicy;
pub use media_type::MediaType;
pub use reader::*;
pub use resolver::resolve_all;
pub use resource::*;
pub use routing::{Route, RouteMatch, Router, register_route};
pub use traits::*;
