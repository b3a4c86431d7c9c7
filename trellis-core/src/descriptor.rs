// Resolved resource method descriptors

use crate::error::{Error, Result};
use crate::handle::MethodHandle;
use crate::inheritance::{self, InterfaceConflictPolicy};
use crate::media_type::MediaType;
use crate::path;
use crate::resource::{MethodDecl, ResourceType, ReturnKind};
use crate::traits::HttpMethod;
use std::fmt;
use std::sync::Arc;

/// Everything needed to route to and invoke one resource method.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Clone)]
pub struct ResourceMethodDescriptor {
    owner: Arc<dyn ResourceType>,
    declaring: Arc<dyn ResourceType>,
    method: MethodDecl,
    handle: MethodHandle,
    verb: HttpMethod,
    path: String,
    consumes: Vec<MediaType>,
    produces: Vec<MediaType>,
}

impl ResourceMethodDescriptor {
    /// Resolve the descriptor for `method`, declared on `declaring` and
    /// served by instances of `owner`.
    ///
    /// `base_path` is the application path already composed with the
    /// class-level path. Returns `Ok(None)` when the method is not a
    /// candidate or no HTTP verb can be resolved for it.
    pub fn from_method(
        owner: &Arc<dyn ResourceType>,
        declaring: &Arc<dyn ResourceType>,
        method: &MethodDecl,
        base_path: &str,
        policy: InterfaceConflictPolicy,
    ) -> Result<Option<Self>> {
        let Some(handle) = method.handle.clone().filter(|_| method.is_candidate()) else {
            return Ok(None);
        };
        let element = || format!("{}#{}", owner.name(), method.signature());

        let Some(verb_name) =
            inheritance::resolve(method, declaring, policy, "HttpMethod", inheritance::verb_of)?
        else {
            return Ok(None);
        };
        let verb = HttpMethod::from_str(&verb_name).ok_or_else(|| Error::UnknownHttpMethod {
            method: element(),
            verb: verb_name.clone(),
        })?;

        let method_path =
            inheritance::resolve(method, declaring, policy, "Path", inheritance::path_of)?
                .unwrap_or_default();
        let consumes = media_types(
            inheritance::resolve(method, declaring, policy, "Consumes", inheritance::consumes_of)?,
            &element,
        )?;
        let produces = media_types(
            inheritance::resolve(method, declaring, policy, "Produces", inheritance::produces_of)?,
            &element,
        )?;

        Ok(Some(Self {
            owner: owner.clone(),
            declaring: declaring.clone(),
            method: method.clone(),
            handle,
            verb,
            path: path::compose(base_path, &method_path),
            consumes,
            produces,
        }))
    }

    /// The resource type whose instances serve this method.
    pub fn owner(&self) -> &Arc<dyn ResourceType> {
        &self.owner
    }

    /// The type the method body was found on.
    pub fn declaring(&self) -> &Arc<dyn ResourceType> {
        &self.declaring
    }

    pub fn method(&self) -> &MethodDecl {
        &self.method
    }

    pub fn handle(&self) -> &MethodHandle {
        &self.handle
    }

    pub fn verb(&self) -> HttpMethod {
        self.verb
    }

    /// Composed path, relative and normalized; empty for the root.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn consumes(&self) -> &[MediaType] {
        &self.consumes
    }

    pub fn produces(&self) -> &[MediaType] {
        &self.produces
    }

    pub fn returns(&self) -> ReturnKind {
        self.method.returns
    }

    /// `Owner#method(Params)`
    pub fn name(&self) -> String {
        format!("{}#{}", self.owner.name(), self.method.signature())
    }
}

impl fmt::Debug for ResourceMethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceMethodDescriptor")
            .field("method", &self.name())
            .field("verb", &self.verb)
            .field("path", &self.path)
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .finish()
    }
}

impl fmt::Display for ResourceMethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {}",
            self.verb,
            path::route_path(&self.path),
            self.name()
        )
    }
}

/// Parse declared media types; nothing declared (or an empty list) means
/// `*/*`.
fn media_types(declared: Option<Vec<String>>, element: &dyn Fn() -> String) -> Result<Vec<MediaType>> {
    let declared = declared.unwrap_or_default();
    if declared.is_empty() {
        return Ok(vec![MediaType::any()]);
    }
    declared
        .iter()
        .map(|raw| {
            MediaType::parse(raw).ok_or_else(|| Error::MalformedAnnotation {
                element: element(),
                reason: format!("`{}` is not a media type", raw),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{Annotation, Marker, MetaAnnotation};
    use crate::handle::Reply;
    use crate::resource::{ResourceClass, Visibility};

    fn concrete(name: &str) -> MethodDecl {
        MethodDecl::new(name).handle(MethodHandle::new(|_, _| async { Ok(Reply::Empty) }))
    }

    fn class_with(method: MethodDecl) -> Arc<dyn ResourceType> {
        ResourceClass::abstract_class("Res").method(method).build()
    }

    fn describe(class: &Arc<dyn ResourceType>) -> Result<Option<ResourceMethodDescriptor>> {
        ResourceMethodDescriptor::from_method(
            class,
            class,
            &class.methods()[0],
            "api/res",
            InterfaceConflictPolicy::FirstMatch,
        )
    }

    #[test]
    fn test_defaults() {
        let class = class_with(concrete("list").annotate(Annotation::get()));
        let descriptor = describe(&class).unwrap().unwrap();
        assert_eq!(descriptor.verb(), HttpMethod::GET);
        assert_eq!(descriptor.path(), "api/res");
        assert_eq!(descriptor.consumes(), &[MediaType::any()]);
        assert_eq!(descriptor.produces(), &[MediaType::any()]);
        assert_eq!(descriptor.to_string(), "GET /api/res -> Res#list()");
    }

    #[test]
    fn test_empty_produces_defaults_to_wildcard() {
        let class = class_with(
            concrete("list")
                .annotate(Annotation::get())
                .annotate(Annotation::produces(Vec::<String>::new())),
        );
        assert_eq!(describe(&class).unwrap().unwrap().produces(), &[MediaType::any()]);
    }

    #[test]
    fn test_non_candidates_and_verbless_are_skipped() {
        assert!(describe(&class_with(concrete("helper"))).unwrap().is_none());
        assert!(
            describe(&class_with(MethodDecl::new("abs").annotate(Annotation::get())))
                .unwrap()
                .is_none()
        );
        assert!(
            describe(&class_with(
                concrete("hidden")
                    .annotate(Annotation::get())
                    .visibility(Visibility::NonPublic)
            ))
            .unwrap()
            .is_none()
        );
    }

    #[test]
    fn test_unknown_verb_is_an_error() {
        let propfind = Annotation::Marker(
            Marker::new("PROPFIND").with_meta(MetaAnnotation::HttpMethod("PROPFIND".into())),
        );
        let err = describe(&class_with(concrete("m").annotate(propfind))).unwrap_err();
        assert!(matches!(err, Error::UnknownHttpMethod { .. }));
    }

    #[test]
    fn test_malformed_media_type_is_an_error() {
        let class = class_with(
            concrete("m")
                .annotate(Annotation::post())
                .annotate(Annotation::consumes(["json"])),
        );
        assert!(matches!(
            describe(&class).unwrap_err(),
            Error::MalformedAnnotation { .. }
        ));
    }
}
