//! Resource type metadata.
//!
//! [`ResourceType`] is the introspection capability the resolver works
//! against: a class-like entity with annotations, declared methods, a
//! direct superclass and directly implemented interfaces. [`ResourceClass`]
//! is the static-table implementation, assembled with a builder at startup.
//!
//! ```
//! use std::sync::Arc;
//! use trellis_core::annotation::Annotation;
//! use trellis_core::handle::{MethodHandle, Reply};
//! use trellis_core::resource::{MethodDecl, ResourceClass, ResourceType};
//!
//! struct Hello;
//!
//! let hello = ResourceClass::builder::<Hello>()
//!     .annotate(Annotation::path("hello"))
//!     .method(
//!         MethodDecl::new("say")
//!             .annotate(Annotation::get())
//!             .handle(MethodHandle::on(|_: Arc<Hello>, _| async { Ok(Reply::text("hi")) })),
//!     )
//!     .build();
//! assert_eq!(hello.methods().len(), 1);
//! ```

use crate::annotation::Annotation;
use crate::handle::{MethodHandle, Value};
use std::any::{Any, TypeId, type_name};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Identity of a type as seen by providers and content readers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeKey {
    name: Cow<'static, str>,
    id: Option<TypeId>,
}

impl TypeKey {
    /// Key of a Rust type.
    pub fn of<T: Any + ?Sized>() -> Self {
        Self {
            name: Cow::Borrowed(type_name::<T>()),
            id: Some(TypeId::of::<T>()),
        }
    }

    /// Key of a type known only by name (interfaces, abstract classes).
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            id: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unqualified name: the last path segment of the type name.
    pub fn simple_name(&self) -> &str {
        let base = self.name.split('<').next().unwrap_or(&self.name);
        base.rsplit("::").next().unwrap_or(base)
    }

    pub fn type_id(&self) -> Option<TypeId> {
        self.id
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Interface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    NonPublic,
}

/// Declared return of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// Returns nothing; answered with an empty success response
    Void,
    /// Returns a value written through the response channel
    Entity,
}

type Converter = Arc<dyn Fn(&str) -> Result<Value, String> + Send + Sync>;
type AbsentValue = Arc<dyn Fn() -> Value + Send + Sync>;

/// Declared type of a method parameter and how to build it from a string.
#[derive(Clone)]
pub struct ParamType {
    key: TypeKey,
    convert: Option<Converter>,
    absent: Option<AbsentValue>,
}

impl ParamType {
    /// A type with no string conversion; only usable as an entity.
    pub fn of<T: Any + Send>() -> Self {
        Self {
            key: TypeKey::of::<T>(),
            convert: None,
            absent: None,
        }
    }

    /// A type parsed from the raw request value with [`FromStr`].
    pub fn parsed<T>() -> Self
    where
        T: FromStr + Any + Send,
        T::Err: fmt::Display,
    {
        Self {
            key: TypeKey::of::<T>(),
            convert: Some(Arc::new(|raw: &str| {
                raw.parse::<T>()
                    .map(|value| Box::new(value) as Value)
                    .map_err(|e| e.to_string())
            })),
            absent: None,
        }
    }

    /// `Option<T>`: `None` when the request carries no value.
    pub fn optional<T>() -> Self
    where
        T: FromStr + Any + Send,
        T::Err: fmt::Display,
    {
        Self {
            key: TypeKey::of::<Option<T>>(),
            convert: Some(Arc::new(|raw: &str| {
                raw.parse::<T>()
                    .map(|value| Box::new(Some(value)) as Value)
                    .map_err(|e| e.to_string())
            })),
            absent: Some(Arc::new(|| Box::new(None::<T>) as Value)),
        }
    }

    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    /// Whether named request values can be converted to this type.
    pub fn is_convertible(&self) -> bool {
        self.convert.is_some()
    }

    /// Convert a raw request value.
    pub fn convert(&self, raw: &str) -> Result<Value, String> {
        match &self.convert {
            Some(convert) => convert(raw),
            None => Err(format!("{} cannot be built from a string", self.key)),
        }
    }

    /// The value used when the request carries nothing, if the type allows it.
    pub fn absent_value(&self) -> Option<Value> {
        self.absent.as_ref().map(|absent| absent())
    }
}

impl fmt::Debug for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamType")
            .field("key", &self.key)
            .field("convertible", &self.convert.is_some())
            .field("optional", &self.absent.is_some())
            .finish()
    }
}

impl PartialEq for ParamType {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub ty: ParamType,
    pub annotations: Vec<Annotation>,
}

impl ParamDecl {
    pub fn new(ty: ParamType) -> Self {
        Self {
            ty,
            annotations: Vec::new(),
        }
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }
}

/// Name plus ordered parameter types; what makes two declarations in a
/// hierarchy "the same method".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub name: String,
    pub params: Vec<TypeKey>,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(param.simple_name())?;
        }
        f.write_str(")")
    }
}

/// A method declared on a resource type.
#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub annotations: Vec<Annotation>,
    pub visibility: Visibility,
    pub is_static: bool,
    pub returns: ReturnKind,
    /// `None` for abstract and interface methods.
    pub handle: Option<MethodHandle>,
}

impl MethodDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            annotations: Vec::new(),
            visibility: Visibility::Public,
            is_static: false,
            returns: ReturnKind::Entity,
            handle: None,
        }
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn param(mut self, param: ParamDecl) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, returns: ReturnKind) -> Self {
        self.returns = returns;
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn static_method(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn handle(mut self, handle: MethodHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn signature(&self) -> Signature {
        Signature {
            name: self.name.clone(),
            params: self.params.iter().map(|p| p.ty.key().clone()).collect(),
        }
    }

    pub fn is_abstract(&self) -> bool {
        self.handle.is_none()
    }

    /// Public, non-static and invocable.
    pub fn is_candidate(&self) -> bool {
        self.visibility == Visibility::Public && !self.is_static && !self.is_abstract()
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

/// Introspection capability over a class-like resource type.
pub trait ResourceType: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn key(&self) -> &TypeKey;

    fn kind(&self) -> TypeKind;

    /// Type-level annotations.
    fn annotations(&self) -> &[Annotation];

    /// Methods declared directly on this type.
    fn methods(&self) -> &[MethodDecl];

    fn superclass(&self) -> Option<Arc<dyn ResourceType>>;

    /// Interfaces this type implements directly, in declaration order.
    fn direct_interfaces(&self) -> Vec<Arc<dyn ResourceType>>;

    /// The method declared on this type with the given signature.
    fn declared_method(&self, signature: &Signature) -> Option<&MethodDecl> {
        self.methods().iter().find(|m| {
            m.name == signature.name
                && m.params.len() == signature.params.len()
                && m.params
                    .iter()
                    .zip(&signature.params)
                    .all(|(p, key)| p.ty.key() == key)
        })
    }
}

/// Static-table [`ResourceType`].
#[derive(Debug)]
pub struct ResourceClass {
    name: String,
    key: TypeKey,
    kind: TypeKind,
    annotations: Vec<Annotation>,
    methods: Vec<MethodDecl>,
    superclass: Option<Arc<dyn ResourceType>>,
    interfaces: Vec<Arc<dyn ResourceType>>,
}

impl ResourceClass {
    /// Builder for a class backed by the Rust type `T`; providers look
    /// instances up by `T`.
    pub fn builder<T: Any>() -> ResourceClassBuilder {
        let key = TypeKey::of::<T>();
        ResourceClassBuilder::new(key.simple_name().to_string(), key, TypeKind::Class)
    }

    /// Builder for a class with no Rust type of its own (an abstract base).
    pub fn abstract_class(name: impl Into<String>) -> ResourceClassBuilder {
        let name = name.into();
        ResourceClassBuilder::new(name.clone(), TypeKey::named(name), TypeKind::Class)
    }

    pub fn interface(name: impl Into<String>) -> ResourceClassBuilder {
        let name = name.into();
        ResourceClassBuilder::new(name.clone(), TypeKey::named(name), TypeKind::Interface)
    }
}

impl ResourceType for ResourceClass {
    fn name(&self) -> &str {
        &self.name
    }

    fn key(&self) -> &TypeKey {
        &self.key
    }

    fn kind(&self) -> TypeKind {
        self.kind
    }

    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    fn methods(&self) -> &[MethodDecl] {
        &self.methods
    }

    fn superclass(&self) -> Option<Arc<dyn ResourceType>> {
        self.superclass.clone()
    }

    fn direct_interfaces(&self) -> Vec<Arc<dyn ResourceType>> {
        self.interfaces.clone()
    }
}

pub struct ResourceClassBuilder {
    inner: ResourceClass,
}

impl ResourceClassBuilder {
    fn new(name: String, key: TypeKey, kind: TypeKind) -> Self {
        Self {
            inner: ResourceClass {
                name,
                key,
                kind,
                annotations: Vec::new(),
                methods: Vec::new(),
                superclass: None,
                interfaces: Vec::new(),
            },
        }
    }

    /// Override the display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.inner.name = name.into();
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.inner.annotations.push(annotation);
        self
    }

    pub fn method(mut self, method: MethodDecl) -> Self {
        self.inner.methods.push(method);
        self
    }

    pub fn extends(mut self, superclass: Arc<dyn ResourceType>) -> Self {
        self.inner.superclass = Some(superclass);
        self
    }

    pub fn implements(mut self, interface: Arc<dyn ResourceType>) -> Self {
        self.inner.interfaces.push(interface);
        self
    }

    pub fn build(self) -> Arc<ResourceClass> {
        Arc::new(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Gorp;

    #[test]
    fn test_type_key_names() {
        let key = TypeKey::of::<Gorp>();
        assert_eq!(key.simple_name(), "Gorp");
        assert!(key.type_id().is_some());
        assert_eq!(TypeKey::named("Frobnicator").simple_name(), "Frobnicator");
        assert_ne!(TypeKey::named("Gorp"), key);
    }

    #[test]
    fn test_param_type_conversion() {
        let ty = ParamType::parsed::<u32>();
        let value = ty.convert("42").unwrap();
        assert_eq!(*value.downcast::<u32>().unwrap(), 42);
        assert!(ty.convert("forty-two").is_err());
        assert!(ty.absent_value().is_none());

        assert!(ParamType::of::<Gorp>().convert("x").is_err());
    }

    #[test]
    fn test_optional_param_type() {
        let ty = ParamType::optional::<i64>();
        let absent = ty.absent_value().unwrap();
        assert_eq!(*absent.downcast::<Option<i64>>().unwrap(), None);
        let present = ty.convert("-3").unwrap();
        assert_eq!(*present.downcast::<Option<i64>>().unwrap(), Some(-3));
    }

    #[test]
    fn test_declared_method_by_signature() {
        let iface = ResourceClass::interface("Frobnicator")
            .method(MethodDecl::new("spew"))
            .method(MethodDecl::new("spew").param(ParamDecl::new(ParamType::parsed::<u32>())))
            .build();

        let sig = MethodDecl::new("spew")
            .param(ParamDecl::new(ParamType::parsed::<u32>()))
            .signature();
        let found = iface.declared_method(&sig).unwrap();
        assert_eq!(found.params.len(), 1);
        assert_eq!(sig.to_string(), "spew(u32)");

        let other = MethodDecl::new("spew")
            .param(ParamDecl::new(ParamType::parsed::<String>()))
            .signature();
        assert!(iface.declared_method(&other).is_none());
    }

    #[test]
    fn test_candidate_rules() {
        assert!(!MethodDecl::new("abstract").is_candidate());
        let handle = MethodHandle::new(|_, _| async { Ok(crate::handle::Reply::Empty) });
        assert!(MethodDecl::new("m").handle(handle.clone()).is_candidate());
        assert!(
            !MethodDecl::new("m")
                .handle(handle.clone())
                .static_method()
                .is_candidate()
        );
        assert!(
            !MethodDecl::new("m")
                .handle(handle)
                .visibility(Visibility::NonPublic)
                .is_candidate()
        );
    }
}
