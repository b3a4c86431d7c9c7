//! Annotation inheritance.
//!
//! A resource method inherits an annotation it does not declare itself from
//! the same-signature method of its nearest superclass that declares it, and
//! failing that from the first directly implemented interface that does.
//! Interfaces are collected while walking the class chain, starting with the
//! declaring class, then each superclass in turn, then their super-interfaces;
//! each interface is visited once.
//!
//! ```
//! use std::sync::Arc;
//! use trellis_core::annotation::Annotation;
//! use trellis_core::handle::{MethodHandle, Reply};
//! use trellis_core::inheritance::{InterfaceConflictPolicy, produces_of, resolve};
//! use trellis_core::resource::{MethodDecl, ResourceClass, ResourceType};
//!
//! let iface = ResourceClass::interface("Frobnicator")
//!     .method(MethodDecl::new("spew").annotate(Annotation::produces(["text/x-frob"])))
//!     .build();
//! let class: Arc<dyn ResourceType> = ResourceClass::abstract_class("Impl")
//!     .implements(iface)
//!     .method(MethodDecl::new("spew").handle(MethodHandle::new(|_, _| async { Ok(Reply::Empty) })))
//!     .build();
//!
//! let method = &class.methods()[0];
//! let produces = resolve(method, &class, InterfaceConflictPolicy::FirstMatch, "Produces", produces_of)
//!     .unwrap();
//! assert_eq!(produces, Some(vec!["text/x-frob".to_string()]));
//! ```

use crate::annotation::Annotation;
use crate::error::{Error, Result};
use crate::resource::{MethodDecl, ResourceType, TypeKey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, trace};

/// What to do when two interfaces at the same search step disagree.
///
/// A step is one depth of the interface walk: the interfaces named by the
/// class chain, then their super-interfaces, and so on. A match at one depth
/// ends the walk, so a deeper interface never conflicts with it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceConflictPolicy {
    /// The first interface in discovery order wins.
    #[default]
    FirstMatch,
    /// Disagreement is a startup error.
    Reject,
}

/// Resolve an annotation value for `method`, declared on `declaring`.
///
/// `annotation` names what is being resolved, for diagnostics.
pub fn resolve<T, F>(
    method: &MethodDecl,
    declaring: &Arc<dyn ResourceType>,
    policy: InterfaceConflictPolicy,
    annotation: &'static str,
    extract: F,
) -> Result<Option<T>>
where
    T: PartialEq + Debug,
    F: Fn(&[Annotation]) -> Option<T>,
{
    if let Some(value) = extract(method.annotations()) {
        return Ok(Some(value));
    }
    let signature = method.signature();
    let element = || format!("{}#{}", declaring.name(), signature);
    walk(declaring, policy, annotation, element, |ty| {
        ty.declared_method(&signature)
            .and_then(|m| extract(m.annotations()))
    })
}

/// Resolve a type-level annotation value for `ty`: the type itself, then
/// its superclasses, then the interfaces collected on the way.
pub fn resolve_class<T, F>(
    ty: &Arc<dyn ResourceType>,
    policy: InterfaceConflictPolicy,
    annotation: &'static str,
    extract: F,
) -> Result<Option<T>>
where
    T: PartialEq + Debug,
    F: Fn(&[Annotation]) -> Option<T>,
{
    if let Some(value) = extract(ty.annotations()) {
        return Ok(Some(value));
    }
    let element = || ty.name().to_string();
    walk(ty, policy, annotation, element, |ancestor| {
        extract(ancestor.annotations())
    })
}

fn walk<T, E, L>(
    start: &Arc<dyn ResourceType>,
    policy: InterfaceConflictPolicy,
    annotation: &'static str,
    element: E,
    lookup: L,
) -> Result<Option<T>>
where
    T: PartialEq + Debug,
    E: Fn() -> String,
    L: Fn(&dyn ResourceType) -> Option<T>,
{
    let mut interfaces = InterfaceSet::default();
    interfaces.extend_at(start.direct_interfaces(), 0);

    let mut current = start.superclass();
    while let Some(ancestor) = current {
        if let Some(value) = lookup(ancestor.as_ref()) {
            trace!(
                element = %element(),
                annotation,
                from = ancestor.name(),
                "Inherited annotation from superclass"
            );
            return Ok(Some(value));
        }
        interfaces.extend_at(ancestor.direct_interfaces(), 0);
        current = ancestor.superclass();
    }

    // interfaces named by the class chain sit at depth 0, super-interfaces
    // one deeper than the interface that names them
    let mut found: Option<(Arc<dyn ResourceType>, usize, T)> = None;
    let mut index = 0;
    while let Some((iface, depth)) = interfaces.get(index) {
        index += 1;
        if let Some((_, found_depth, _)) = &found
            && depth > *found_depth
        {
            break;
        }
        let Some(value) = lookup(iface.as_ref()) else {
            interfaces.extend_at(iface.direct_interfaces(), depth + 1);
            continue;
        };
        if found.is_none() {
            found = Some((iface, depth, value));
            continue;
        }
        if let Some((first, _, chosen)) = &found
            && *chosen != value
        {
            match policy {
                InterfaceConflictPolicy::Reject => {
                    return Err(Error::AmbiguousInterfaceAnnotation {
                        method: element(),
                        annotation,
                        first: first.name().to_string(),
                        second: iface.name().to_string(),
                    });
                }
                InterfaceConflictPolicy::FirstMatch => {
                    debug!(
                        element = %element(),
                        annotation,
                        chosen = first.name(),
                        ignored = iface.name(),
                        "Interfaces disagree; keeping the first"
                    );
                }
            }
        }
    }

    if let Some((iface, _, _)) = &found {
        trace!(
            element = %element(),
            annotation,
            from = iface.name(),
            "Inherited annotation from interface"
        );
    }
    Ok(found.map(|(_, _, value)| value))
}

/// Interfaces in discovery order with their depth, each at most once.
#[derive(Default)]
struct InterfaceSet {
    order: Vec<(Arc<dyn ResourceType>, usize)>,
    seen: HashSet<TypeKey>,
}

impl InterfaceSet {
    fn extend_at(&mut self, interfaces: Vec<Arc<dyn ResourceType>>, depth: usize) {
        for iface in interfaces {
            if self.seen.insert(iface.key().clone()) {
                self.order.push((iface, depth));
            }
        }
    }

    fn get(&self, index: usize) -> Option<(Arc<dyn ResourceType>, usize)> {
        self.order.get(index).cloned()
    }
}

/// The verb named by the first annotation carrying an HTTP-method
/// meta-annotation.
pub fn verb_of(annotations: &[Annotation]) -> Option<String> {
    annotations
        .iter()
        .find_map(|a| a.http_method_name().map(str::to_string))
}

pub fn path_of(annotations: &[Annotation]) -> Option<String> {
    annotations.iter().find_map(|a| match a {
        Annotation::Path(path) => Some(path.clone()),
        _ => None,
    })
}

pub fn consumes_of(annotations: &[Annotation]) -> Option<Vec<String>> {
    annotations.iter().find_map(|a| match a {
        Annotation::Consumes(types) => Some(types.clone()),
        _ => None,
    })
}

pub fn produces_of(annotations: &[Annotation]) -> Option<Vec<String>> {
    annotations.iter().find_map(|a| match a {
        Annotation::Produces(types) => Some(types.clone()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{MethodHandle, Reply};
    use crate::resource::ResourceClass;

    fn concrete(name: &str) -> MethodDecl {
        MethodDecl::new(name).handle(MethodHandle::new(|_, _| async { Ok(Reply::Empty) }))
    }

    fn produces_for(class: &Arc<dyn ResourceType>, policy: InterfaceConflictPolicy) -> Result<Option<Vec<String>>> {
        resolve(&class.methods()[0], class, policy, "Produces", produces_of)
    }

    #[test]
    fn test_method_wins_over_everything() {
        let iface = ResourceClass::interface("I")
            .method(MethodDecl::new("m").annotate(Annotation::produces(["i/i"])))
            .build();
        let class: Arc<dyn ResourceType> = ResourceClass::abstract_class("C")
            .implements(iface)
            .method(concrete("m").annotate(Annotation::produces(["c/c"])))
            .build();
        assert_eq!(
            produces_for(&class, InterfaceConflictPolicy::FirstMatch).unwrap(),
            Some(vec!["c/c".to_string()])
        );
    }

    #[test]
    fn test_superclass_wins_over_interface() {
        let iface = ResourceClass::interface("I")
            .method(MethodDecl::new("m").annotate(Annotation::produces(["i/i"])))
            .build();
        let base = ResourceClass::abstract_class("Base")
            .implements(iface)
            .method(MethodDecl::new("m").annotate(Annotation::produces(["base/base"])))
            .build();
        let class: Arc<dyn ResourceType> = ResourceClass::abstract_class("C")
            .extends(base)
            .method(concrete("m"))
            .build();
        assert_eq!(
            produces_for(&class, InterfaceConflictPolicy::FirstMatch).unwrap(),
            Some(vec!["base/base".to_string()])
        );
    }

    #[test]
    fn test_sibling_interfaces_first_match_and_reject() {
        let a = ResourceClass::interface("A")
            .method(MethodDecl::new("m").annotate(Annotation::produces(["a/a"])))
            .build();
        let b = ResourceClass::interface("B")
            .method(MethodDecl::new("m").annotate(Annotation::produces(["b/b"])))
            .build();
        let class: Arc<dyn ResourceType> = ResourceClass::abstract_class("C")
            .implements(a)
            .implements(b)
            .method(concrete("m"))
            .build();

        assert_eq!(
            produces_for(&class, InterfaceConflictPolicy::FirstMatch).unwrap(),
            Some(vec!["a/a".to_string()])
        );
        let err = produces_for(&class, InterfaceConflictPolicy::Reject).unwrap_err();
        assert!(matches!(
            err,
            Error::AmbiguousInterfaceAnnotation { ref first, ref second, .. } if first == "A" && second == "B"
        ));
    }

    #[test]
    fn test_deeper_super_interface_does_not_conflict() {
        let root = ResourceClass::interface("R")
            .method(MethodDecl::new("m").annotate(Annotation::produces(["r/r"])))
            .build();
        let a = ResourceClass::interface("A").implements(root).build();
        let b = ResourceClass::interface("B")
            .method(MethodDecl::new("m").annotate(Annotation::produces(["b/b"])))
            .build();
        let class: Arc<dyn ResourceType> = ResourceClass::abstract_class("C")
            .implements(a)
            .implements(b)
            .method(concrete("m"))
            .build();

        for policy in [InterfaceConflictPolicy::FirstMatch, InterfaceConflictPolicy::Reject] {
            assert_eq!(
                produces_for(&class, policy).unwrap(),
                Some(vec!["b/b".to_string()])
            );
        }
    }

    #[test]
    fn test_super_interfaces_at_same_depth_conflict() {
        let r1 = ResourceClass::interface("R1")
            .method(MethodDecl::new("m").annotate(Annotation::produces(["r1/r1"])))
            .build();
        let r2 = ResourceClass::interface("R2")
            .method(MethodDecl::new("m").annotate(Annotation::produces(["r2/r2"])))
            .build();
        let a = ResourceClass::interface("A").implements(r1).build();
        let b = ResourceClass::interface("B").implements(r2).build();
        let class: Arc<dyn ResourceType> = ResourceClass::abstract_class("C")
            .implements(a)
            .implements(b)
            .method(concrete("m"))
            .build();

        assert_eq!(
            produces_for(&class, InterfaceConflictPolicy::FirstMatch).unwrap(),
            Some(vec!["r1/r1".to_string()])
        );
        assert!(matches!(
            produces_for(&class, InterfaceConflictPolicy::Reject).unwrap_err(),
            Error::AmbiguousInterfaceAnnotation { .. }
        ));
    }

    #[test]
    fn test_agreeing_interfaces_are_not_a_conflict() {
        let a = ResourceClass::interface("A")
            .method(MethodDecl::new("m").annotate(Annotation::produces(["x/x"])))
            .build();
        let b = ResourceClass::interface("B")
            .method(MethodDecl::new("m").annotate(Annotation::produces(["x/x"])))
            .build();
        let class: Arc<dyn ResourceType> = ResourceClass::abstract_class("C")
            .implements(a)
            .implements(b)
            .method(concrete("m"))
            .build();
        assert!(produces_for(&class, InterfaceConflictPolicy::Reject).unwrap().is_some());
    }

    #[test]
    fn test_super_interface_is_searched() {
        let root = ResourceClass::interface("Root")
            .method(MethodDecl::new("m").annotate(Annotation::get()))
            .build();
        let child = ResourceClass::interface("Child").implements(root).build();
        let class: Arc<dyn ResourceType> = ResourceClass::abstract_class("C")
            .implements(child)
            .method(concrete("m"))
            .build();
        let verb = resolve(
            &class.methods()[0],
            &class,
            InterfaceConflictPolicy::FirstMatch,
            "HttpMethod",
            verb_of,
        )
        .unwrap();
        assert_eq!(verb.as_deref(), Some("GET"));
    }

    #[test]
    fn test_different_signature_does_not_inherit() {
        let iface = ResourceClass::interface("I")
            .method(MethodDecl::new("other").annotate(Annotation::get()))
            .build();
        let class: Arc<dyn ResourceType> = ResourceClass::abstract_class("C")
            .implements(iface)
            .method(concrete("m"))
            .build();
        let verb = resolve(
            &class.methods()[0],
            &class,
            InterfaceConflictPolicy::FirstMatch,
            "HttpMethod",
            verb_of,
        )
        .unwrap();
        assert_eq!(verb, None);
    }

    #[test]
    fn test_resolve_class_path() {
        let base = ResourceClass::abstract_class("Base")
            .annotate(Annotation::path("frob"))
            .build();
        let class: Arc<dyn ResourceType> = ResourceClass::abstract_class("C").extends(base).build();
        assert_eq!(
            resolve_class(&class, InterfaceConflictPolicy::FirstMatch, "Path", path_of).unwrap(),
            Some("frob".to_string())
        );
    }
}
