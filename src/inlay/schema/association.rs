//! # Association reflections
//!
//! An [`AssociationReflection`] describes one declared association: its kind,
//! its resolved target model, how to reach the serialized form on the owner
//! (the source accessors) and, for reference associations, the key attribute
//! and the finder collaborator.
//!
//! The default source accessors go through the owner's raw attribute slot of
//! the association's own name; hosts that keep the serialized form elsewhere
//! (for example a JSON text column) swap in their own accessor pair, see
//! [`crate::host`].

use super::attribute::DefaultSpec;
use super::registry::{ModelId, Registry};
use crate::record::Instance;
use crate::value::Value;
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssocKind {
    EmbedsOne,
    EmbedsMany,
    ReferencesOne,
    ReferencesMany,
}

impl AssocKind {
    pub fn is_embedded(&self) -> bool {
        matches!(self, AssocKind::EmbedsOne | AssocKind::EmbedsMany)
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, AssocKind::EmbedsMany | AssocKind::ReferencesMany)
    }
}

pub type SourceReadFn = fn(&Instance, &str) -> Value;
pub type SourceWriteFn = fn(&Instance, &str, Value);

/// The pair of functions bridging an association to its serialized form.
#[derive(Clone, Copy, Debug)]
pub struct SourceAccess {
    pub read: SourceReadFn,
    pub write: SourceWriteFn,
}

impl SourceAccess {
    /// Raw attribute slot of the association's name.
    pub fn slot() -> SourceAccess {
        SourceAccess {
            read: slot_read,
            write: slot_write,
        }
    }
}

fn slot_read(owner: &Instance, name: &str) -> Value {
    owner.read_attribute(name).unwrap_or(Value::Null)
}

fn slot_write(owner: &Instance, name: &str, value: Value) {
    // The slot is auto-declared with the association, so this cannot miss.
    let _ = owner.write_attribute(name, value);
}

/// Looks up referenced objects by primary key. Implemented by the host; tests
/// use an in-memory table.
pub trait Finder {
    fn find_by_primary_key(
        &self,
        registry: &Rc<Registry>,
        model: ModelId,
        key: &Value,
    ) -> Option<Instance>;
}

#[derive(Clone)]
pub struct AssociationReflection {
    pub name: String,
    pub kind: AssocKind,
    pub target_model: ModelId,
    pub target_name: String,
    pub source: SourceAccess,
    pub default: Option<DefaultSpec>,
    /// Name of the key attribute for reference associations.
    pub reference_key: Option<String>,
    /// When set, a reference key that resolves to nothing reads as `None`
    /// instead of failing with `RecordNotFound`.
    pub allow_missing: bool,
    pub(crate) finder: Option<Rc<dyn Finder>>,
}

impl fmt::Debug for AssociationReflection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationReflection")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("target_name", &self.target_name)
            .field("reference_key", &self.reference_key)
            .field("allow_missing", &self.allow_missing)
            .field("finder", &self.finder.is_some())
            .finish()
    }
}
