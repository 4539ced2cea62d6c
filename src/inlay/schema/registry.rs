//! # Model registry
//!
//! The [`Registry`] owns every [`ModelDescriptor`] and is the only piece of
//! shared state in the crate: instances hold an `Rc<Registry>` and a
//! [`ModelId`] instead of carrying their own schema. It is immutable once
//! built, so sharing it across an object graph is safe by construction.
//!
//! [`RegistryBuilder`] collects model declarations and freezes them in
//! `finish`, which runs in two passes:
//!
//! 1. register every model (including inline association targets) and build
//!    its attribute tables, copying then extending the parent's tables;
//! 2. resolve association targets by name, append derived reference-key
//!    attributes, and verify model-typed attributes point at registered
//!    models.
//!
//! Anything unresolvable is a configuration error returned from `finish`;
//! nothing is deferred to first use.

use super::association::{AssocKind, AssociationReflection, Finder, SourceAccess};
use super::attribute::{AttrKind, AttributeReflection, CastRule, DefaultSpec};
use super::model::{AssociationDecl, AttributeDecl, ModelBuilder, ModelDescriptor, TargetDecl};
use super::naming::singularize;
use crate::error::{InlayError, Result};
use crate::typecast;
use log::debug;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModelId(pub(crate) usize);

pub struct Registry {
    models: Vec<ModelDescriptor>,
    by_name: HashMap<String, ModelId>,
}

impl Registry {
    pub fn model(&self, name: &str) -> Result<&ModelDescriptor> {
        self.model_id(name).map(|id| self.descriptor(id))
    }

    pub fn model_id(&self, name: &str) -> Result<ModelId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| InlayError::UnknownModel(name.to_string()))
    }

    pub fn has_model(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn descriptor(&self, id: ModelId) -> &ModelDescriptor {
        &self.models[id.0]
    }

    pub fn model_name(&self, id: ModelId) -> &str {
        &self.models[id.0].name
    }

    /// True when `child` is `ancestor` or transitively extends it.
    pub fn is_descendant(&self, child: ModelId, ancestor: ModelId) -> bool {
        let mut current = Some(child);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.models[id.0].parent;
        }
        false
    }

    /// One-line schema summary, e.g. `User(*id: UUID, name: String)`.
    /// The primary attribute is starred; source slots are omitted.
    pub fn describe(&self, name: &str) -> Result<String> {
        let descriptor = self.model(name)?;
        let attrs: Vec<String> = descriptor
            .attributes
            .iter()
            .filter(|reflection| !reflection.is_source())
            .map(|reflection| {
                let marker = if reflection.primary { "*" } else { "" };
                let shown_type = match reflection.kind {
                    AttrKind::Collection => format!("[{}]", reflection.type_name),
                    _ => reflection.type_name.clone(),
                };
                format!("{}{}: {}", marker, reflection.name, shown_type)
            })
            .collect();
        Ok(format!("{}({})", descriptor.name, attrs.join(", ")))
    }
}

enum PendingTarget {
    Resolved(ModelId),
    Named(String),
}

struct PendingAssoc {
    name: String,
    kind: AssocKind,
    target: PendingTarget,
    source: SourceAccess,
    default: Option<DefaultSpec>,
    reference_key: Option<String>,
    allow_missing: bool,
    finder: Option<Rc<dyn Finder>>,
}

#[derive(Default)]
pub struct RegistryBuilder {
    models: Vec<ModelBuilder>,
}

impl RegistryBuilder {
    pub fn new() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Declares a model. The closure receives the model's builder.
    pub fn model<F>(&mut self, name: &str, define: F) -> &mut Self
    where
        F: FnOnce(&mut ModelBuilder),
    {
        let mut builder = ModelBuilder::new(name, None);
        define(&mut builder);
        self.models.push(builder);
        self
    }

    /// Declares a model extending an earlier one: the descendant starts from
    /// a copy of the parent's reflection tables and adds its own.
    pub fn model_extending<F>(&mut self, name: &str, parent: &str, define: F) -> &mut Self
    where
        F: FnOnce(&mut ModelBuilder),
    {
        let mut builder = ModelBuilder::new(name, Some(parent.to_string()));
        define(&mut builder);
        self.models.push(builder);
        self
    }

    pub fn finish(self) -> Result<Rc<Registry>> {
        let mut models: Vec<ModelDescriptor> = Vec::new();
        let mut by_name: HashMap<String, ModelId> = HashMap::new();
        let mut pending: Vec<(ModelId, Vec<PendingAssoc>)> = Vec::new();

        for builder in self.models {
            register_model(&mut models, &mut by_name, &mut pending, builder)?;
        }

        // Second pass: resolve association targets and reference keys now that
        // every model name is known.
        for (model_id, protos) in pending {
            let inherited = match models[model_id.0].parent {
                Some(parent) => models[parent.0].associations.clone(),
                None => Vec::new(),
            };
            let mut associations = inherited;
            let mut reflections: Vec<Rc<AssociationReflection>> = Vec::new();
            for proto in protos {
                let target_model = match &proto.target {
                    PendingTarget::Resolved(id) => *id,
                    PendingTarget::Named(name) => by_name
                        .get(name)
                        .copied()
                        .ok_or_else(|| InlayError::UnknownModel(name.clone()))?,
                };
                let reference_key = match proto.kind {
                    AssocKind::ReferencesOne => Some(
                        proto
                            .reference_key
                            .unwrap_or_else(|| format!("{}_id", proto.name)),
                    ),
                    AssocKind::ReferencesMany => Some(
                        proto
                            .reference_key
                            .unwrap_or_else(|| format!("{}_ids", singularize(&proto.name))),
                    ),
                    _ => None,
                };
                if let Some(key) = &reference_key {
                    // The key attribute casts like the target's primary, so a
                    // UUID-keyed target gets UUID reference keys.
                    let target = &models[target_model.0];
                    let key_type = target
                        .primary
                        .as_ref()
                        .and_then(|name| target.attribute(name))
                        .map(|reflection| reflection.type_name.clone())
                        .unwrap_or_else(|| "Integer".to_string());
                    ensure_reference_key_attribute(
                        &mut models[model_id.0],
                        key,
                        proto.kind,
                        &key_type,
                    )?;
                }
                reflections.push(Rc::new(AssociationReflection {
                    name: proto.name,
                    kind: proto.kind,
                    target_model,
                    target_name: models[target_model.0].name.clone(),
                    source: proto.source,
                    default: proto.default,
                    reference_key,
                    allow_missing: proto.allow_missing,
                    finder: proto.finder,
                }));
            }
            for reflection in reflections {
                let existing = associations
                    .iter()
                    .position(|a| a.name == reflection.name);
                match existing {
                    Some(idx) => associations[idx] = reflection,
                    None => associations.push(reflection),
                }
            }
            let assoc_index = associations
                .iter()
                .enumerate()
                .map(|(idx, a)| (a.name.clone(), idx))
                .collect();
            models[model_id.0].associations = associations;
            models[model_id.0].assoc_index = assoc_index;
        }

        // Model-typed attributes must point at registered models.
        for descriptor in &models {
            for reflection in &descriptor.attributes {
                if let CastRule::Model(name) = &reflection.cast {
                    if !by_name.contains_key(name) {
                        return Err(InlayError::UnknownModel(name.clone()));
                    }
                }
            }
        }

        debug!("registry built: {} models", models.len());
        Ok(Rc::new(Registry { models, by_name }))
    }
}

fn register_model(
    models: &mut Vec<ModelDescriptor>,
    by_name: &mut HashMap<String, ModelId>,
    pending: &mut Vec<(ModelId, Vec<PendingAssoc>)>,
    builder: ModelBuilder,
) -> Result<ModelId> {
    if by_name.contains_key(&builder.name) {
        return Err(InlayError::DuplicateModel(builder.name));
    }
    let parent = match &builder.parent_name {
        Some(name) => Some(
            by_name
                .get(name)
                .copied()
                .ok_or_else(|| InlayError::UnknownModel(name.clone()))?,
        ),
        None => None,
    };

    let id = ModelId(models.len());
    let (mut attributes, mut attr_index, mut attr_aliases) = match parent {
        Some(pid) => {
            let p = &models[pid.0];
            (
                p.attributes.clone(),
                p.attr_index.clone(),
                p.attr_aliases.clone(),
            )
        }
        None => (Vec::new(), HashMap::new(), HashMap::new()),
    };
    for decl in &builder.attributes {
        let reflection = Rc::new(build_attribute(decl)?);
        if let Some(&idx) = attr_index.get(&reflection.name) {
            // A slot the caller declared themselves wins over auto-declared
            // ones; an explicit redeclaration replaces in place.
            if !decl.auto {
                attributes[idx] = reflection;
            }
        } else {
            attr_index.insert(reflection.name.clone(), attributes.len());
            attributes.push(reflection);
        }
    }
    for (alias, name) in &builder.attr_aliases {
        attr_aliases.insert(alias.clone(), name.clone());
    }

    let (mut assoc_aliases, mut validators, mut before_save, mut before_destroy, parent_primary) =
        match parent {
            Some(pid) => {
                let p = &models[pid.0];
                (
                    p.assoc_aliases.clone(),
                    p.validators.clone(),
                    p.before_save.clone(),
                    p.before_destroy.clone(),
                    p.primary.clone(),
                )
            }
            None => (HashMap::new(), Vec::new(), Vec::new(), Vec::new(), None),
        };
    for (alias, name) in &builder.assoc_aliases {
        assoc_aliases.insert(alias.clone(), name.clone());
    }
    validators.extend(builder.validators.iter().cloned());
    before_save.extend(builder.before_save.iter().copied());
    before_destroy.extend(builder.before_destroy.iter().copied());
    let primary = builder.primary.clone().or(parent_primary);

    by_name.insert(builder.name.clone(), id);
    models.push(ModelDescriptor {
        id,
        name: builder.name.clone(),
        parent,
        attributes,
        attr_index,
        attr_aliases,
        associations: Vec::new(),
        assoc_index: HashMap::new(),
        assoc_aliases,
        validators,
        before_save,
        before_destroy,
        primary,
    });
    debug!("registered model `{}`", builder.name);

    // Inline targets register under the owner's namespace before the owner's
    // association list is resolved.
    let mut inline_ids = Vec::with_capacity(builder.inline.len());
    for child in builder.inline {
        inline_ids.push(register_model(models, by_name, pending, child)?);
    }

    let protos = builder
        .associations
        .into_iter()
        .map(|decl| {
            let AssociationDecl {
                name,
                kind,
                target,
                source,
                default,
                reference_key,
                allow_missing,
                finder,
            } = decl;
            let target = match target {
                TargetDecl::Inline(idx) => PendingTarget::Resolved(inline_ids[idx]),
                TargetDecl::Named(name) => PendingTarget::Named(name),
            };
            PendingAssoc {
                name,
                kind,
                target,
                source,
                default,
                reference_key,
                allow_missing,
                finder,
            }
        })
        .collect();
    pending.push((id, protos));

    Ok(id)
}

fn build_attribute(decl: &AttributeDecl) -> Result<AttributeReflection> {
    let cast = match (&decl.kind, &decl.attr_type) {
        (AttrKind::Source, _) => CastRule::Raw,
        (_, super::attribute::AttrType::Model(name)) => CastRule::Model(name.clone()),
        (_, other) => CastRule::Fn(typecast::typecaster(other.type_name())?),
    };
    let normalize = match (decl.normalizer_fn, &decl.normalizer_name) {
        (Some(normalize), _) => Some(normalize),
        (None, Some(name)) => Some(typecast::normalizer(name)?),
        (None, None) => None,
    };
    Ok(AttributeReflection {
        name: decl.name.clone(),
        kind: decl.kind,
        type_name: decl.attr_type.type_name().to_string(),
        cast,
        enum_values: decl.enum_values.clone(),
        default: decl.default.clone(),
        normalize,
        primary: decl.primary,
    })
}

fn ensure_reference_key_attribute(
    descriptor: &mut ModelDescriptor,
    key: &str,
    kind: AssocKind,
    key_type: &str,
) -> Result<()> {
    if descriptor.has_attribute(key) {
        return Ok(());
    }
    let attr_kind = if kind == AssocKind::ReferencesMany {
        AttrKind::Collection
    } else {
        AttrKind::Scalar
    };
    let reflection = Rc::new(AttributeReflection {
        name: key.to_string(),
        kind: attr_kind,
        type_name: key_type.to_string(),
        cast: CastRule::Fn(typecast::typecaster(key_type)?),
        enum_values: None,
        default: None,
        normalize: None,
        primary: false,
    });
    descriptor
        .attr_index
        .insert(reflection.name.clone(), descriptor.attributes.len());
    descriptor.attributes.push(reflection);
    Ok(())
}
