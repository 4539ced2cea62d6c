//! # Model descriptors and the declaration builder
//!
//! A [`ModelDescriptor`] is the frozen reflection table for one model:
//! attributes and associations in declaration order, alias maps, validators,
//! lifecycle guards and the optional primary attribute. Descendant models copy
//! the parent's tables and extend them, so lookup never walks an inheritance
//! chain at runtime.
//!
//! [`ModelBuilder`] is the mutable declaration surface handed to the closure
//! passed to [`super::registry::RegistryBuilder::model`]:
//!
//! ```ignore
//! registry.model("User", |m| {
//!     m.attribute("name", AttrType::String);
//!     m.attribute("count", AttrType::Integer).default("10");
//!     m.collection("tags", AttrType::String).normalized_by("uniq");
//!     m.embeds_many_inline("projects", |p| {
//!         p.attribute("title", AttrType::String);
//!         p.validates_presence("title");
//!     });
//! });
//! ```
//!
//! Builder methods are infallible so declarations chain; lookup failures
//! (unknown typecaster, unknown normalizer, unresolvable target) surface when
//! the registry builder finishes.

use super::association::{AssocKind, Finder, SourceAccess, SourceReadFn, SourceWriteFn};
use super::attribute::{
    AttrKind, AttrType, AttributeReflection, DefaultFn, DefaultSpec,
};
use super::naming::classify;
use super::registry::ModelId;
use crate::record::{Errors, Instance};
use crate::typecast::NormalizerFn;
use crate::value::Value;
use std::collections::HashMap;
use std::rc::Rc;
use uuid::Uuid;

/// A lifecycle guard; returning `false` vetoes the operation.
pub type GuardFn = fn(&Instance) -> bool;

/// A custom validation routine adding messages to the error bag.
pub type ValidateFn = fn(&Instance, &mut Errors);

#[derive(Clone, Debug)]
pub enum Validator {
    /// The named attribute must read as a present value.
    Presence(String),
    /// Every member of the named association must itself be valid.
    Associated(String),
    With(ValidateFn),
}

/// Frozen reflection table for one model.
#[derive(Debug)]
pub struct ModelDescriptor {
    pub id: ModelId,
    pub name: String,
    pub parent: Option<ModelId>,
    pub(crate) attributes: Vec<Rc<AttributeReflection>>,
    pub(crate) attr_index: HashMap<String, usize>,
    pub(crate) attr_aliases: HashMap<String, String>,
    pub(crate) associations: Vec<Rc<super::association::AssociationReflection>>,
    pub(crate) assoc_index: HashMap<String, usize>,
    pub(crate) assoc_aliases: HashMap<String, String>,
    pub(crate) validators: Vec<Validator>,
    pub(crate) before_save: Vec<GuardFn>,
    pub(crate) before_destroy: Vec<GuardFn>,
    pub primary: Option<String>,
}

impl ModelDescriptor {
    /// Resolves an attribute by name or alias.
    pub fn attribute(&self, name: &str) -> Option<&Rc<AttributeReflection>> {
        let canonical = self.attr_aliases.get(name).map_or(name, String::as_str);
        self.attr_index
            .get(canonical)
            .map(|&idx| &self.attributes[idx])
    }

    /// Resolves an association by name or alias.
    pub fn association(
        &self,
        name: &str,
    ) -> Option<&Rc<super::association::AssociationReflection>> {
        let canonical = self.assoc_aliases.get(name).map_or(name, String::as_str);
        self.assoc_index
            .get(canonical)
            .map(|&idx| &self.associations[idx])
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Attribute names in declaration order, ancestors first. Source slots
    /// backing embedded associations are included only when asked for.
    pub fn attribute_names(&self, include_sources: bool) -> Vec<&str> {
        self.attributes
            .iter()
            .filter(|reflection| include_sources || !reflection.is_source())
            .map(|reflection| reflection.name.as_str())
            .collect()
    }

    pub fn association_names(&self) -> Vec<&str> {
        self.associations
            .iter()
            .map(|reflection| reflection.name.as_str())
            .collect()
    }

    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }
}

#[derive(Debug, Clone)]
pub(crate) enum TargetDecl {
    Named(String),
    Inline(usize),
}

/// One attribute declaration under construction. Returned by the builder's
/// declaration methods so options chain off it.
pub struct AttributeDecl {
    pub(crate) name: String,
    pub(crate) kind: AttrKind,
    pub(crate) attr_type: AttrType,
    pub(crate) enum_values: Option<Vec<Value>>,
    pub(crate) default: Option<DefaultSpec>,
    pub(crate) normalizer_name: Option<String>,
    pub(crate) normalizer_fn: Option<NormalizerFn>,
    pub(crate) primary: bool,
    pub(crate) auto: bool,
}

impl AttributeDecl {
    fn new(name: &str, kind: AttrKind, attr_type: AttrType) -> AttributeDecl {
        AttributeDecl {
            name: name.to_string(),
            kind,
            attr_type,
            enum_values: None,
            default: None,
            normalizer_name: None,
            normalizer_fn: None,
            primary: false,
            auto: false,
        }
    }

    pub fn default(&mut self, value: impl Into<Value>) -> &mut Self {
        self.default = Some(DefaultSpec::Literal(value.into()));
        self
    }

    /// A default computed per instance; the factory may read sibling
    /// attributes.
    pub fn default_with(&mut self, factory: DefaultFn) -> &mut Self {
        self.default = Some(DefaultSpec::Generated(factory));
        self
    }

    /// Restricts read values to the given set; anything else reads as nil.
    pub fn one_of<T: Into<Value>, I: IntoIterator<Item = T>>(&mut self, values: I) -> &mut Self {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Attaches a normalizer registered under `name`; resolved when the
    /// registry builder finishes.
    pub fn normalized_by(&mut self, name: &str) -> &mut Self {
        self.normalizer_name = Some(name.to_string());
        self
    }

    pub fn normalize_with(&mut self, normalize: NormalizerFn) -> &mut Self {
        self.normalizer_fn = Some(normalize);
        self
    }
}

/// One association declaration under construction.
pub struct AssociationDecl {
    pub(crate) name: String,
    pub(crate) kind: AssocKind,
    pub(crate) target: TargetDecl,
    pub(crate) source: SourceAccess,
    pub(crate) default: Option<DefaultSpec>,
    pub(crate) reference_key: Option<String>,
    pub(crate) allow_missing: bool,
    pub(crate) finder: Option<Rc<dyn Finder>>,
}

impl AssociationDecl {
    fn new(name: &str, kind: AssocKind, target: TargetDecl) -> AssociationDecl {
        AssociationDecl {
            name: name.to_string(),
            kind,
            target,
            source: SourceAccess::slot(),
            default: None,
            reference_key: None,
            allow_missing: false,
            finder: None,
        }
    }

    /// Points the association at an explicitly named model instead of the
    /// name derived from the association name.
    pub fn class_name(&mut self, name: &str) -> &mut Self {
        self.target = TargetDecl::Named(name.to_string());
        self
    }

    /// Replaces the slot source accessors, e.g. with the JSON column pair
    /// from [`crate::host`].
    pub fn source(&mut self, read: SourceReadFn, write: SourceWriteFn) -> &mut Self {
        self.source = SourceAccess { read, write };
        self
    }

    /// Initial unsaved target(s) for a never-persisted owner.
    pub fn default(&mut self, value: impl Into<Value>) -> &mut Self {
        self.default = Some(DefaultSpec::Literal(value.into()));
        self
    }

    pub fn default_with(&mut self, factory: DefaultFn) -> &mut Self {
        self.default = Some(DefaultSpec::Generated(factory));
        self
    }

    /// Overrides the derived reference key attribute name.
    pub fn reference_key(&mut self, key: &str) -> &mut Self {
        self.reference_key = Some(key.to_string());
        self
    }

    /// Read a dangling reference as `None` instead of `RecordNotFound`.
    pub fn allow_missing(&mut self) -> &mut Self {
        self.allow_missing = true;
        self
    }

    pub fn finder(&mut self, finder: Rc<dyn Finder>) -> &mut Self {
        self.finder = Some(finder);
        self
    }
}

/// Mutable declaration surface for one model.
pub struct ModelBuilder {
    pub(crate) name: String,
    pub(crate) parent_name: Option<String>,
    pub(crate) attributes: Vec<AttributeDecl>,
    pub(crate) associations: Vec<AssociationDecl>,
    pub(crate) attr_aliases: Vec<(String, String)>,
    pub(crate) assoc_aliases: Vec<(String, String)>,
    pub(crate) validators: Vec<Validator>,
    pub(crate) before_save: Vec<GuardFn>,
    pub(crate) before_destroy: Vec<GuardFn>,
    pub(crate) primary: Option<String>,
    pub(crate) inline: Vec<ModelBuilder>,
}

fn generated_uuid(_owner: &Instance) -> Value {
    Value::Uuid(Uuid::new_v4())
}

impl ModelBuilder {
    pub(crate) fn new(name: &str, parent_name: Option<String>) -> ModelBuilder {
        ModelBuilder {
            name: name.to_string(),
            parent_name,
            attributes: Vec::new(),
            associations: Vec::new(),
            attr_aliases: Vec::new(),
            assoc_aliases: Vec::new(),
            validators: Vec::new(),
            before_save: Vec::new(),
            before_destroy: Vec::new(),
            primary: None,
            inline: Vec::new(),
        }
    }

    pub fn attribute(&mut self, name: &str, attr_type: AttrType) -> &mut AttributeDecl {
        self.push_attribute(AttributeDecl::new(name, AttrKind::Scalar, attr_type))
    }

    /// An ordered sequence of values, each independently cast.
    pub fn collection(&mut self, name: &str, attr_type: AttrType) -> &mut AttributeDecl {
        self.push_attribute(AttributeDecl::new(name, AttrKind::Collection, attr_type))
    }

    /// Declares `id` as a UUID primary attribute with a generated default.
    pub fn primary_uuid(&mut self) -> &mut AttributeDecl {
        self.primary = Some("id".to_string());
        let mut decl = AttributeDecl::new("id", AttrKind::Scalar, AttrType::Uuid);
        decl.primary = true;
        decl.default = Some(DefaultSpec::Generated(generated_uuid));
        self.push_attribute(decl)
    }

    /// Declares an explicitly typed primary attribute, without a default.
    pub fn primary_attribute(&mut self, name: &str, attr_type: AttrType) -> &mut AttributeDecl {
        self.primary = Some(name.to_string());
        let mut decl = AttributeDecl::new(name, AttrKind::Scalar, attr_type);
        decl.primary = true;
        self.push_attribute(decl)
    }

    pub fn embeds_one(&mut self, name: &str) -> &mut AssociationDecl {
        let target = TargetDecl::Named(classify(name));
        self.push_embedded(name, AssocKind::EmbedsOne, target)
    }

    /// Declares `embeds_one` together with an inline definition of its target
    /// model, registered as `"{Owner}::{Classified}"`.
    pub fn embeds_one_inline<F>(&mut self, name: &str, define: F) -> &mut AssociationDecl
    where
        F: FnOnce(&mut ModelBuilder),
    {
        let target = self.define_inline(name, define);
        self.push_embedded(name, AssocKind::EmbedsOne, target)
    }

    pub fn embeds_many(&mut self, name: &str) -> &mut AssociationDecl {
        let target = TargetDecl::Named(classify(name));
        self.push_embedded(name, AssocKind::EmbedsMany, target)
    }

    pub fn embeds_many_inline<F>(&mut self, name: &str, define: F) -> &mut AssociationDecl
    where
        F: FnOnce(&mut ModelBuilder),
    {
        let target = self.define_inline(name, define);
        self.push_embedded(name, AssocKind::EmbedsMany, target)
    }

    pub fn references_one(&mut self, name: &str) -> &mut AssociationDecl {
        let target = TargetDecl::Named(classify(name));
        self.push_association(AssociationDecl::new(name, AssocKind::ReferencesOne, target))
    }

    pub fn references_many(&mut self, name: &str) -> &mut AssociationDecl {
        let target = TargetDecl::Named(classify(name));
        self.push_association(AssociationDecl::new(
            name,
            AssocKind::ReferencesMany,
            target,
        ))
    }

    pub fn alias_attribute(&mut self, alias: &str, name: &str) -> &mut Self {
        self.attr_aliases.push((alias.to_string(), name.to_string()));
        self
    }

    pub fn alias_association(&mut self, alias: &str, name: &str) -> &mut Self {
        self.assoc_aliases
            .push((alias.to_string(), name.to_string()));
        self
    }

    pub fn validates_presence(&mut self, name: &str) -> &mut Self {
        self.validators.push(Validator::Presence(name.to_string()));
        self
    }

    pub fn validates_associated(&mut self, name: &str) -> &mut Self {
        self.validators
            .push(Validator::Associated(name.to_string()));
        self
    }

    pub fn validate_with(&mut self, validate: ValidateFn) -> &mut Self {
        self.validators.push(Validator::With(validate));
        self
    }

    pub fn before_save(&mut self, guard: GuardFn) -> &mut Self {
        self.before_save.push(guard);
        self
    }

    pub fn before_destroy(&mut self, guard: GuardFn) -> &mut Self {
        self.before_destroy.push(guard);
        self
    }

    fn define_inline<F>(&mut self, name: &str, define: F) -> TargetDecl
    where
        F: FnOnce(&mut ModelBuilder),
    {
        let child_name = format!("{}::{}", self.name, classify(name));
        let mut child = ModelBuilder::new(&child_name, None);
        define(&mut child);
        self.inline.push(child);
        TargetDecl::Inline(self.inline.len() - 1)
    }

    fn push_embedded(
        &mut self,
        name: &str,
        kind: AssocKind,
        target: TargetDecl,
    ) -> &mut AssociationDecl {
        // Embedded associations serialize into a raw slot of their own name;
        // declare it here so it lands at the declaration position.
        let mut slot = AttributeDecl::new(name, AttrKind::Source, AttrType::Object);
        slot.auto = true;
        self.push_attribute(slot);
        self.push_association(AssociationDecl::new(name, kind, target))
    }

    fn push_attribute(&mut self, decl: AttributeDecl) -> &mut AttributeDecl {
        self.attributes.push(decl);
        let idx = self.attributes.len() - 1;
        &mut self.attributes[idx]
    }

    fn push_association(&mut self, decl: AssociationDecl) -> &mut AssociationDecl {
        self.associations.push(decl);
        let idx = self.associations.len() - 1;
        &mut self.associations[idx]
    }
}
