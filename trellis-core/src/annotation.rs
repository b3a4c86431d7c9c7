//! The annotation vocabulary understood by the resolver and the binder.
//!
//! Annotations are plain data attached to resource types, methods and
//! parameters. HTTP verbs are not a dedicated variant: like JAX-RS, a verb
//! annotation is any [`Marker`] that carries an
//! [`MetaAnnotation::HttpMethod`] meta-annotation, so custom verb markers
//! resolve the same way as the built-in ones.

use std::borrow::Cow;
use std::fmt;

/// Where a named parameter is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamSource {
    /// A `{name}` template variable of the matched route
    Path,
    /// A query string parameter
    Query,
    /// A request header (case-insensitive)
    Header,
    /// A cookie from the `Cookie` header
    Cookie,
}

impl ParamSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamSource::Path => "PathParam",
            ParamSource::Query => "QueryParam",
            ParamSource::Header => "HeaderParam",
            ParamSource::Cookie => "CookieParam",
        }
    }
}

impl fmt::Display for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An annotation placed on another annotation type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaAnnotation {
    /// Marks the annotated marker as an HTTP verb designator.
    HttpMethod(Cow<'static, str>),
    /// Anything else; carried along, never interpreted.
    Other(Cow<'static, str>),
}

/// A named annotation with its own meta-annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub name: Cow<'static, str>,
    pub meta: Vec<MetaAnnotation>,
}

impl Marker {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            meta: Vec::new(),
        }
    }

    pub fn with_meta(mut self, meta: MetaAnnotation) -> Self {
        self.meta.push(meta);
        self
    }

    /// The verb named by an `HttpMethod` meta-annotation, if any.
    pub fn http_method(&self) -> Option<&str> {
        self.meta.iter().find_map(|meta| match meta {
            MetaAnnotation::HttpMethod(verb) => Some(verb.as_ref()),
            MetaAnnotation::Other(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    /// Relative URI template of a type or method
    Path(String),
    /// Media types a method accepts
    Consumes(Vec<String>),
    /// Media types a method produces
    Produces(Vec<String>),
    /// Binds a parameter to a named request value
    Param(ParamSource, String),
    /// Fallback for a named parameter absent from the request
    DefaultValue(String),
    /// Any other annotation, possibly a verb designator
    Marker(Marker),
}

impl Annotation {
    pub fn path(value: impl Into<String>) -> Self {
        Annotation::Path(value.into())
    }

    pub fn consumes<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Annotation::Consumes(values.into_iter().map(Into::into).collect())
    }

    pub fn produces<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Annotation::Produces(values.into_iter().map(Into::into).collect())
    }

    /// A verb marker named after the verb itself (`@GET`, `@POST`, ...).
    pub fn http_method(verb: &'static str) -> Self {
        Annotation::Marker(
            Marker::new(verb).with_meta(MetaAnnotation::HttpMethod(Cow::Borrowed(verb))),
        )
    }

    pub fn get() -> Self {
        Self::http_method("GET")
    }

    pub fn post() -> Self {
        Self::http_method("POST")
    }

    pub fn put() -> Self {
        Self::http_method("PUT")
    }

    pub fn delete() -> Self {
        Self::http_method("DELETE")
    }

    pub fn patch() -> Self {
        Self::http_method("PATCH")
    }

    pub fn head() -> Self {
        Self::http_method("HEAD")
    }

    pub fn options() -> Self {
        Self::http_method("OPTIONS")
    }

    pub fn marker(name: impl Into<Cow<'static, str>>) -> Self {
        Annotation::Marker(Marker::new(name))
    }

    pub fn path_param(name: impl Into<String>) -> Self {
        Annotation::Param(ParamSource::Path, name.into())
    }

    pub fn query_param(name: impl Into<String>) -> Self {
        Annotation::Param(ParamSource::Query, name.into())
    }

    pub fn header_param(name: impl Into<String>) -> Self {
        Annotation::Param(ParamSource::Header, name.into())
    }

    pub fn cookie_param(name: impl Into<String>) -> Self {
        Annotation::Param(ParamSource::Cookie, name.into())
    }

    pub fn default_value(value: impl Into<String>) -> Self {
        Annotation::DefaultValue(value.into())
    }

    /// The verb this annotation designates through its meta-annotations.
    pub fn http_method_name(&self) -> Option<&str> {
        match self {
            Annotation::Marker(marker) => marker.http_method(),
            _ => None,
        }
    }

    /// The binding this annotation declares, if it is a binding annotation.
    pub fn binding(&self) -> Option<(ParamSource, &str)> {
        match self {
            Annotation::Param(source, name) => Some((*source, name.as_str())),
            _ => None,
        }
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Annotation::Path(value) => write!(f, "@Path(\"{}\")", value),
            Annotation::Consumes(values) => write!(f, "@Consumes({:?})", values),
            Annotation::Produces(values) => write!(f, "@Produces({:?})", values),
            Annotation::Param(source, name) => write!(f, "@{}(\"{}\")", source, name),
            Annotation::DefaultValue(value) => write!(f, "@DefaultValue(\"{}\")", value),
            Annotation::Marker(marker) => write!(f, "@{}", marker.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_verbs_carry_meta_annotation() {
        assert_eq!(Annotation::get().http_method_name(), Some("GET"));
        assert_eq!(Annotation::delete().http_method_name(), Some("DELETE"));
        assert_eq!(Annotation::path("x").http_method_name(), None);
    }

    #[test]
    fn test_custom_verb_marker() {
        let propfind = Annotation::Marker(
            Marker::new("Fetch")
                .with_meta(MetaAnnotation::Other("Documented".into()))
                .with_meta(MetaAnnotation::HttpMethod("GET".into())),
        );
        assert_eq!(propfind.http_method_name(), Some("GET"));
        assert_eq!(Annotation::marker("Inject").http_method_name(), None);
    }

    #[test]
    fn test_binding() {
        assert_eq!(
            Annotation::header_param("X-Trace").binding(),
            Some((ParamSource::Header, "X-Trace"))
        );
        assert_eq!(Annotation::default_value("1").binding(), None);
        assert_eq!(Annotation::marker("Valid").binding(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Annotation::query_param("q").to_string(), "@QueryParam(\"q\")");
        assert_eq!(Annotation::get().to_string(), "@GET");
    }
}
