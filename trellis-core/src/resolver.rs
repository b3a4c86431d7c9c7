// Resource method enumeration and resolution

use crate::descriptor::ResourceMethodDescriptor;
use crate::error::Result;
use crate::inheritance::{self, InterfaceConflictPolicy};
use crate::path;
use crate::resource::{MethodDecl, ResourceType, Signature, TypeKind};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// Resolve every routable method of `resource`.
///
/// Candidates are the public, non-static, concrete methods the type
/// declares or inherits; the most derived declaration of a signature wins.
/// Methods for which no HTTP verb resolves are left out. The result follows
/// declaration order, the resource's own methods first.
pub fn resolve_all(
    resource: &Arc<dyn ResourceType>,
    application_path: &str,
    policy: InterfaceConflictPolicy,
) -> Result<Vec<ResourceMethodDescriptor>> {
    let class_path =
        inheritance::resolve_class(resource, policy, "Path", inheritance::path_of)?.unwrap_or_default();
    let base_path = path::compose(application_path, &class_path);

    let mut descriptors = Vec::new();
    for (declaring, method) in candidates(resource) {
        match ResourceMethodDescriptor::from_method(resource, &declaring, &method, &base_path, policy)? {
            Some(descriptor) => {
                trace!(descriptor = %descriptor, "Resolved resource method");
                descriptors.push(descriptor);
            }
            None => {
                debug!(
                    resource = resource.name(),
                    method = %method.signature(),
                    "Skipping method without an HTTP verb"
                );
            }
        }
    }
    Ok(descriptors)
}

/// Methods visible on `resource`, paired with the type that declares them.
fn candidates(resource: &Arc<dyn ResourceType>) -> Vec<(Arc<dyn ResourceType>, MethodDecl)> {
    let mut seen: HashSet<Signature> = HashSet::new();
    let mut out = Vec::new();
    let mut interfaces: Vec<Arc<dyn ResourceType>> = Vec::new();

    let mut current = Some(resource.clone());
    while let Some(ty) = current {
        collect(&ty, &mut seen, &mut out);
        interfaces.extend(ty.direct_interfaces());
        current = ty.superclass();
    }

    // default methods from interfaces, if nothing in the class chain
    // declared the same signature
    let mut visited = HashSet::new();
    let mut index = 0;
    while let Some(iface) = interfaces.get(index).cloned() {
        index += 1;
        if iface.kind() != TypeKind::Interface || !visited.insert(iface.key().clone()) {
            continue;
        }
        collect(&iface, &mut seen, &mut out);
        interfaces.extend(iface.direct_interfaces());
    }

    out.retain(|(_, method)| method.is_candidate());
    out
}

fn collect(
    ty: &Arc<dyn ResourceType>,
    seen: &mut HashSet<Signature>,
    out: &mut Vec<(Arc<dyn ResourceType>, MethodDecl)>,
) {
    for method in ty.methods() {
        if seen.insert(method.signature()) {
            out.push((ty.clone(), method.clone()));
        }
    }
}
