//! Parameter binding plans.
//!
//! Every declared parameter gets exactly one binding: the first recognized
//! binding annotation (`PathParam`, `QueryParam`, `HeaderParam`,
//! `CookieParam`) makes it a named request value, anything else makes it
//! the entity read from the request body. Unrecognized annotations are
//! ignored.

use crate::annotation::{Annotation, ParamSource};
use crate::descriptor::ResourceMethodDescriptor;
use crate::error::{Error, Result};
use crate::resource::{MethodDecl, ParamType};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingKind {
    /// The request body, read through a content reader
    Entity,
    /// A named value from the request
    Named { source: ParamSource, name: String },
}

#[derive(Debug, Clone)]
pub struct ParameterBinding {
    pub position: usize,
    pub ty: ParamType,
    pub kind: BindingKind,
    /// Raw fallback for a named value the request does not carry
    pub default_value: Option<String>,
}

impl ParameterBinding {
    pub fn is_entity(&self) -> bool {
        self.kind == BindingKind::Entity
    }

    /// Short label for diagnostics: the bound name, or `entity`.
    pub fn label(&self) -> String {
        match &self.kind {
            BindingKind::Entity => "entity".to_string(),
            BindingKind::Named { source, name } => format!("@{}(\"{}\")", source, name),
        }
    }
}

impl fmt::Display for ParameterBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}: {}", self.position, self.label(), self.ty.key().simple_name())
    }
}

/// Classify each parameter of `method`, in declaration order.
pub fn bind(method: &MethodDecl) -> Vec<ParameterBinding> {
    method
        .params
        .iter()
        .enumerate()
        .map(|(position, param)| {
            let kind = param
                .annotations
                .iter()
                .find_map(Annotation::binding)
                .map(|(source, name)| BindingKind::Named {
                    source,
                    name: name.to_string(),
                })
                .unwrap_or(BindingKind::Entity);
            let default_value = param.annotations.iter().find_map(|a| match a {
                Annotation::DefaultValue(value) => Some(value.clone()),
                _ => None,
            });
            ParameterBinding {
                position,
                ty: param.ty.clone(),
                kind,
                default_value,
            }
        })
        .collect()
}

/// The checked, ordered bindings of one resource method.
#[derive(Debug, Clone)]
pub struct BindingPlan {
    bindings: Vec<ParameterBinding>,
    entity: Option<usize>,
}

impl BindingPlan {
    /// Bind the parameters of `descriptor` and check the plan can be
    /// executed: at most one entity, named values convertible from a string,
    /// path parameters present in the route template.
    pub fn for_descriptor(descriptor: &ResourceMethodDescriptor) -> Result<Self> {
        let bindings = bind(descriptor.method());

        let entities: Vec<usize> = bindings
            .iter()
            .filter(|b| b.is_entity())
            .map(|b| b.position)
            .collect();
        if entities.len() > 1 {
            return Err(Error::AmbiguousEntity {
                method: descriptor.name(),
                positions: entities,
            });
        }

        for binding in &bindings {
            let BindingKind::Named { source, name } = &binding.kind else {
                continue;
            };
            if !binding.ty.is_convertible() {
                return Err(Error::MalformedAnnotation {
                    element: descriptor.name(),
                    reason: format!(
                        "parameter {} cannot be built from a request value",
                        binding
                    ),
                });
            }
            if *source == ParamSource::Path && !has_template_var(descriptor.path(), name) {
                return Err(Error::MalformedAnnotation {
                    element: descriptor.name(),
                    reason: format!(
                        "path parameter `{}` is not in route `{}`",
                        name,
                        descriptor.path()
                    ),
                });
            }
        }

        Ok(Self {
            entity: entities.first().copied(),
            bindings,
        })
    }

    pub fn bindings(&self) -> &[ParameterBinding] {
        &self.bindings
    }

    /// Position of the entity parameter, if the method has one.
    pub fn entity(&self) -> Option<&ParameterBinding> {
        self.entity.map(|position| &self.bindings[position])
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

fn has_template_var(path: &str, name: &str) -> bool {
    path.contains(&format!("{{{}}}", name)) || path.contains(&format!("{{*{}}}", name))
}
