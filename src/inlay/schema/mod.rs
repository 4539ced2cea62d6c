//! # Schema layer
//!
//! Declaration-time metadata: attribute and association reflections, model
//! descriptors and the registry that freezes them. Everything here is
//! immutable once [`registry::RegistryBuilder::finish`] returns; the record
//! and association layers only ever read it.

pub mod association;
pub mod attribute;
pub mod model;
pub mod naming;
pub mod registry;

pub use association::{AssocKind, AssociationReflection, Finder, SourceAccess};
pub use attribute::{AttrKind, AttrType, AttributeReflection, DefaultSpec};
pub use model::{AssociationDecl, AttributeDecl, ModelBuilder, ModelDescriptor, Validator};
pub use registry::{ModelId, Registry, RegistryBuilder};
