//! # Attribute reflections
//!
//! An [`AttributeReflection`] is the immutable declaration-time description of
//! one attribute: its type, default, enum restriction and normalizer. It is
//! built once by the registry builder and shared read-only by every instance
//! of the declaring model and its descendants.

use crate::record::Instance;
use crate::typecast::{CastFn, NormalizerFn};
use crate::value::Value;

/// The declared type of an attribute.
///
/// `Model` casts raw maps into instances of the named model; `Custom` resolves
/// a caster registered with [`crate::typecast::register_typecaster`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttrType {
    Object,
    String,
    Integer,
    Float,
    Boolean,
    Uuid,
    Time,
    Model(String),
    Custom(String),
}

impl AttrType {
    pub fn type_name(&self) -> &str {
        match self {
            AttrType::Object => "Object",
            AttrType::String => "String",
            AttrType::Integer => "Integer",
            AttrType::Float => "Float",
            AttrType::Boolean => "Boolean",
            AttrType::Uuid => "UUID",
            AttrType::Time => "Time",
            AttrType::Model(name) | AttrType::Custom(name) => name,
        }
    }
}

/// How values flow through an attribute slot.
///
/// `Source` slots back embedded associations: they hold the serialized form
/// verbatim and skip the whole cast pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttrKind {
    Scalar,
    Collection,
    Source,
}

pub type DefaultFn = fn(&Instance) -> Value;

/// A declared default: either a literal or a factory evaluated against the
/// owning instance (so it may read sibling attributes).
#[derive(Clone, Debug)]
pub enum DefaultSpec {
    Literal(Value),
    Generated(DefaultFn),
}

impl DefaultSpec {
    pub fn resolve(&self, owner: &Instance) -> Value {
        match self {
            DefaultSpec::Literal(value) => value.clone(),
            DefaultSpec::Generated(factory) => factory(owner),
        }
    }
}

/// The cast step resolved at declaration time. `Raw` is the identity used by
/// `Source` slots; `Model` defers to the registry at read time because the
/// target instance construction needs it.
#[derive(Clone, Debug)]
pub(crate) enum CastRule {
    Raw,
    Fn(CastFn),
    Model(String),
}

#[derive(Clone, Debug)]
pub struct AttributeReflection {
    pub name: String,
    pub kind: AttrKind,
    pub type_name: String,
    pub(crate) cast: CastRule,
    pub enum_values: Option<Vec<Value>>,
    pub default: Option<DefaultSpec>,
    pub(crate) normalize: Option<NormalizerFn>,
    pub primary: bool,
}

impl AttributeReflection {
    /// Source slots are excluded from the typed attribute listing and from
    /// instance display.
    pub fn is_source(&self) -> bool {
        self.kind == AttrKind::Source
    }
}
