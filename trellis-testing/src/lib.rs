//! Testing utilities for Trellis.
//!
//! - **TestClient** drives a `RouteTable` in-process
//! - **TestRequestBuilder** for headers, cookies, query and JSON bodies
//! - **CountingProvider** / **CountingReader** count lifecycle and reader calls
//! - **Spy** records named calls from inside resource methods
//! - **Assertions** on status, headers and bodies
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use trellis_core::*;
//! use trellis_testing::*;
//!
//! struct Hello;
//!
//! # tokio_test::block_on(async {
//! let hello: Arc<dyn ResourceType> = ResourceClass::builder::<Hello>()
//!     .annotate(Annotation::path("hello"))
//!     .method(
//!         MethodDecl::new("hello")
//!             .annotate(Annotation::get())
//!             .handle(MethodHandle::new(|_, _| async { Ok(Reply::text("Hello!")) })),
//!     )
//!     .build();
//!
//! let client = TestClient::from_application(
//!     ResourceApplication::new().singleton(hello, Hello),
//! )
//! .unwrap();
//!
//! let response = client.get("/hello").await;
//! assert_status(&response, 200);
//! assert_eq!(response.body_string(), "Hello!");
//! # });
//! ```

mod assertions;
mod mock;
mod test_client;

pub use assertions::{
    assert_body_contains, assert_client_error, assert_header, assert_json,
    assert_json_content_type, assert_server_error, assert_status,
};
pub use mock::{CountingProvider, CountingReader, Spy};
pub use test_client::{TestClient, TestRequestBuilder, TestResponse};

pub use tokio::test as tokio_test;
