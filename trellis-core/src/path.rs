//! Path composition for resource routes.
//!
//! Resource paths are assembled from up to three pieces: the application
//! path, the class-level `Path` and the method-level `Path`. Each piece may
//! carry stray whitespace or slashes on either side; the composed result is
//! always relative (no leading `/`), never ends with `/` and never contains
//! `//`.
//!
//! ```
//! use trellis_core::path::{compose, route_path};
//!
//! let class_path = compose("foo", "/frob/");
//! assert_eq!(compose(&class_path, " foo "), "foo/frob/foo");
//! assert_eq!(route_path(""), "/");
//! ```

/// Trim whitespace and slashes from both ends of `segment` and collapse any
/// run of interior slashes into one.
pub fn normalize(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for part in segment
        .split('/')
        .map(str::trim)
        .filter(|part| !part.is_empty())
    {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(part);
    }
    out
}

/// Join `prefix` and `segment` with exactly one `/`.
///
/// An empty `segment` leaves the prefix unchanged, an empty `prefix` yields
/// the segment.
pub fn compose(prefix: &str, segment: &str) -> String {
    let prefix = normalize(prefix);
    let segment = normalize(segment);
    if segment.is_empty() {
        prefix
    } else if prefix.is_empty() {
        segment
    } else {
        let mut out = prefix;
        out.push('/');
        out.push_str(&segment);
        out
    }
}

/// Render a composed path as the key the router matches against.
pub fn route_path(composed: &str) -> String {
    let composed = normalize(composed);
    if composed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", composed)
    }
}
