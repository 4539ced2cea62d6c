//! # Records
//!
//! An [`Instance`] is a cheap cloneable handle (`Rc`) over one record: a bag
//! of attribute cells plus lifecycle flags, validation errors, dirty state and
//! lazily built association runtimes. The schema side stays in the registry;
//! a record only carries its `ModelId` and the shared `Rc<Registry>`.
//!
//! ## Access is name-based
//!
//! There are no generated accessors. Reading and writing go through
//! [`Instance::get`] / [`Instance::set`] (the typecast pipeline) and
//! [`Instance::read_attribute`] / [`Instance::write_attribute`] (the raw slot,
//! used by association sources and hosts). Associations are reached with
//! [`Instance::association`].
//!
//! ## Interior mutability
//!
//! A record is a shared-handle structure for single-threaded use: `Cell` for
//! flags, `RefCell` for maps, never `Send`. Borrows are kept short and no
//! borrow is held across a callback, so defaults and validators may read the
//! instance they run against.

mod cell;
mod errors;
mod lifecycle;
mod validation;

pub use errors::{ErrorEntry, Errors};
pub(crate) use lifecycle::EmbedLink;

use self::cell::AttributeCell;
use crate::assoc::Association;
use crate::error::{InlayError, Result};
use crate::schema::attribute::AttributeReflection;
use crate::schema::{ModelDescriptor, ModelId, Registry};
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

pub(crate) struct Record {
    registry: Rc<Registry>,
    model: ModelId,
    cells: RefCell<HashMap<String, AttributeCell>>,
    associations: RefCell<HashMap<String, Association>>,
    persisted: Cell<bool>,
    destroyed: Cell<bool>,
    marked: Cell<bool>,
    embedding: RefCell<Option<EmbedLink>>,
    errors: RefCell<Errors>,
    original: RefCell<HashMap<String, Value>>,
}

/// Shared handle over one record.
#[derive(Clone)]
pub struct Instance(Rc<Record>);

/// Non-owning handle; associations point back at their owner through this.
#[derive(Clone)]
pub struct WeakInstance(Weak<Record>);

impl WeakInstance {
    pub fn upgrade(&self) -> Option<Instance> {
        self.0.upgrade().map(Instance)
    }
}

impl Instance {
    /// A fresh, unpersisted record with every attribute unwritten.
    pub fn build(registry: &Rc<Registry>, model: &str) -> Result<Instance> {
        registry.model_id(model).map(|id| Instance::raw_new(registry, id))
    }

    /// [`Instance::build`] plus mass assignment: unknown keys are ignored and
    /// the primary attribute is skipped.
    pub fn build_with(registry: &Rc<Registry>, model: &str, attrs: &Value) -> Result<Instance> {
        let instance = Instance::build(registry, model)?;
        instance.assign(attrs);
        Ok(instance)
    }

    /// Rehydrates a record from its serialized attribute map: raw slots are
    /// written directly (no casting, no dirty tracking) and the record is
    /// marked persisted.
    pub fn instantiate(registry: &Rc<Registry>, model: &str, attrs: &Value) -> Result<Instance> {
        registry
            .model_id(model)
            .map(|id| Instance::instantiate_by_id(registry, id, attrs))
    }

    pub(crate) fn raw_new(registry: &Rc<Registry>, model: ModelId) -> Instance {
        Instance(Rc::new(Record {
            registry: Rc::clone(registry),
            model,
            cells: RefCell::new(HashMap::new()),
            associations: RefCell::new(HashMap::new()),
            persisted: Cell::new(false),
            destroyed: Cell::new(false),
            marked: Cell::new(false),
            embedding: RefCell::new(None),
            errors: RefCell::new(Errors::default()),
            original: RefCell::new(HashMap::new()),
        }))
    }

    pub(crate) fn build_by_id_with(
        registry: &Rc<Registry>,
        model: ModelId,
        attrs: &Value,
    ) -> Instance {
        let instance = Instance::raw_new(registry, model);
        instance.assign(attrs);
        instance
    }

    pub(crate) fn instantiate_by_id(
        registry: &Rc<Registry>,
        model: ModelId,
        attrs: &Value,
    ) -> Instance {
        let instance = Instance::raw_new(registry, model);
        if let Some(pairs) = attrs.as_map() {
            for (name, value) in pairs {
                let reflection = instance.descriptor().attribute(name).cloned();
                if let Some(reflection) = reflection {
                    instance.raw_write_of(&reflection, value.clone());
                }
            }
        }
        instance.0.persisted.set(true);
        instance
    }

    pub fn registry(&self) -> &Rc<Registry> {
        &self.0.registry
    }

    pub fn model_id(&self) -> ModelId {
        self.0.model
    }

    pub fn model_name(&self) -> String {
        self.0.registry.model_name(self.0.model).to_string()
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        self.0.registry.descriptor(self.0.model)
    }

    /// Identity: two handles over the same record.
    pub fn same(a: &Instance, b: &Instance) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    pub fn downgrade(&self) -> WeakInstance {
        WeakInstance(Rc::downgrade(&self.0))
    }

    pub(crate) fn attr_reflection(&self, name: &str) -> Result<Rc<AttributeReflection>> {
        let descriptor = self.descriptor();
        descriptor
            .attribute(name)
            .cloned()
            .ok_or_else(|| InlayError::UnknownAttribute {
                model: descriptor.name.clone(),
                name: name.to_string(),
            })
    }

    /// The lazily built runtime for a declared association. The same name
    /// always yields the same runtime for the life of the record.
    pub fn association(&self, name: &str) -> Result<Association> {
        let reflection = {
            let descriptor = self.descriptor();
            descriptor
                .association(name)
                .cloned()
                .ok_or_else(|| InlayError::UnknownAssociation {
                    model: descriptor.name.clone(),
                    name: name.to_string(),
                })?
        };
        if let Some(existing) = self.0.associations.borrow().get(&reflection.name) {
            return Ok(existing.clone());
        }
        let assoc = Association::build(self, reflection.clone());
        self.0
            .associations
            .borrow_mut()
            .insert(reflection.name.clone(), assoc.clone());
        Ok(assoc)
    }

    /// The serializable attribute map: typed attributes through the cast
    /// pipeline, source slots verbatim, in declaration order.
    pub fn attributes(&self) -> Value {
        let reflections: Vec<Rc<AttributeReflection>> = self.descriptor().attributes.clone();
        let pairs = reflections
            .iter()
            .map(|reflection| {
                let value = if reflection.is_source() {
                    self.raw_of(reflection)
                } else {
                    self.read_of(reflection)
                };
                (reflection.name.clone(), value)
            })
            .collect();
        Value::Map(pairs)
    }

    pub fn attribute_names(&self, include_sources: bool) -> Vec<String> {
        self.descriptor()
            .attribute_names(include_sources)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Mass assignment. Unknown names and source slots are ignored; the
    /// primary attribute must be written explicitly with [`Instance::set`].
    pub fn assign(&self, attrs: &Value) {
        let Some(pairs) = attrs.as_map() else { return };
        for (name, value) in pairs {
            let reflection = self
                .descriptor()
                .attribute(name)
                .filter(|r| !r.is_source() && !r.primary)
                .cloned();
            if let Some(reflection) = reflection {
                self.write_of(&reflection, value.clone());
            }
        }
    }

    pub fn has_primary(&self) -> bool {
        self.descriptor().primary.is_some()
    }

    /// The primary attribute's cast value, `Null` when none is declared.
    pub fn primary_value(&self) -> Value {
        let primary = self.descriptor().primary.clone();
        match primary {
            Some(name) => self.get(&name).unwrap_or(Value::Null),
            None => Value::Null,
        }
    }

    /// A snapshot of the validation error bag.
    pub fn errors(&self) -> Errors {
        self.0.errors.borrow().clone()
    }

    pub(crate) fn add_error(&self, attribute: &str, message: &str) {
        self.0.errors.borrow_mut().add(attribute, message);
    }

    fn embedded_targets_equal(&self, other: &Instance) -> bool {
        let names: Vec<String> = self
            .descriptor()
            .associations
            .iter()
            .filter(|reflection| reflection.kind.is_embedded())
            .map(|reflection| reflection.name.clone())
            .collect();
        for name in names {
            let (Ok(mine), Ok(theirs)) = (self.association(&name), other.association(&name))
            else {
                return false;
            };
            match (mine, theirs) {
                (Association::EmbedsOne(a), Association::EmbedsOne(b)) => {
                    if a.reader() != b.reader() {
                        return false;
                    }
                }
                (Association::EmbedsMany(a), Association::EmbedsMany(b)) => {
                    if a.members() != b.members() {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        true
    }
}

/// Records of a primary-carrying model compare by primary value; a nil
/// primary matches nothing but the record itself. Everything else compares
/// attribute-by-attribute plus embedded targets.
impl PartialEq for Instance {
    fn eq(&self, other: &Instance) -> bool {
        if Instance::same(self, other) {
            return true;
        }
        if self.0.model != other.0.model {
            return false;
        }
        if self.has_primary() {
            let a = self.primary_value();
            let b = other.primary_value();
            if a.is_null() || b.is_null() {
                return false;
            }
            return a == b;
        }
        let reflections: Vec<Rc<AttributeReflection>> = self.descriptor().attributes.clone();
        for reflection in reflections
            .iter()
            .filter(|reflection| !reflection.is_source())
        {
            if self.read_of(reflection) != other.read_of(reflection) {
                return false;
            }
        }
        self.embedded_targets_equal(other)
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reflections: Vec<Rc<AttributeReflection>> = self.descriptor().attributes.clone();
        let parts: Vec<String> = reflections
            .iter()
            .filter(|reflection| !reflection.is_source())
            .map(|reflection| {
                let marker = if reflection.primary { "*" } else { "" };
                format!(
                    "{}{}: {}",
                    marker,
                    reflection.name,
                    self.read_of(reflection)
                )
            })
            .collect();
        if parts.is_empty() {
            write!(f, "#<{}>", self.model_name())
        } else {
            write!(f, "#<{} {}>", self.model_name(), parts.join(", "))
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
