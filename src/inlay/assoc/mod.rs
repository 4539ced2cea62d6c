//! # Association runtimes
//!
//! Each record lazily builds one runtime per declared association and keeps
//! it for its whole life. The embedded kinds ([`EmbedsOne`], [`EmbedsMany`])
//! own their targets outright and persist them by serializing member
//! attributes into the owner's source slot; every member carries a
//! back-pointer to its owning association and splices itself in on save and
//! out on destroy. The reference kinds ([`ReferencesOne`],
//! [`ReferencesMany`]) own nothing: they read and write a key attribute on
//! the owner and resolve it through the [`crate::schema::Finder`] attached
//! at declaration time.
//!
//! [`Association`] is the kind-erased handle handed out by
//! [`Instance::association`]; the typed accessors on [`Instance`] unwrap it.

mod embeds_many;
mod embeds_one;
mod references;

pub use embeds_many::EmbedsMany;
pub use embeds_one::EmbedsOne;
pub use references::{ReferencesMany, ReferencesOne};

use crate::error::{InlayError, Result};
use crate::record::Instance;
use crate::schema::{AssocKind, AssociationReflection, Registry};
use std::rc::Rc;

/// One record's runtime for one declared association.
#[derive(Clone)]
pub enum Association {
    EmbedsOne(Rc<EmbedsOne>),
    EmbedsMany(Rc<EmbedsMany>),
    ReferencesOne(Rc<ReferencesOne>),
    ReferencesMany(Rc<ReferencesMany>),
}

impl Association {
    pub(crate) fn build(owner: &Instance, reflection: Rc<AssociationReflection>) -> Association {
        match reflection.kind {
            AssocKind::EmbedsOne => {
                Association::EmbedsOne(Rc::new(EmbedsOne::new(owner, reflection)))
            }
            AssocKind::EmbedsMany => {
                Association::EmbedsMany(Rc::new(EmbedsMany::new(owner, reflection)))
            }
            AssocKind::ReferencesOne => {
                Association::ReferencesOne(Rc::new(ReferencesOne::new(owner, reflection)))
            }
            AssocKind::ReferencesMany => {
                Association::ReferencesMany(Rc::new(ReferencesMany::new(owner, reflection)))
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Association::EmbedsOne(a) => a.name(),
            Association::EmbedsMany(a) => a.name(),
            Association::ReferencesOne(a) => a.name(),
            Association::ReferencesMany(a) => a.name(),
        }
    }

    pub fn kind(&self) -> AssocKind {
        match self {
            Association::EmbedsOne(_) => AssocKind::EmbedsOne,
            Association::EmbedsMany(_) => AssocKind::EmbedsMany,
            Association::ReferencesOne(_) => AssocKind::ReferencesOne,
            Association::ReferencesMany(_) => AssocKind::ReferencesMany,
        }
    }

    /// Flushes pending work: embedded kinds destroy marked members and then
    /// persist the rest, reference kinds keep their key attribute current on
    /// write and have nothing left to do here.
    pub fn save(&self) -> bool {
        match self {
            Association::EmbedsOne(a) => a.save(),
            Association::EmbedsMany(a) => a.save(),
            Association::ReferencesOne(_) | Association::ReferencesMany(_) => true,
        }
    }

    /// Forgets loaded targets; the next access rereads the source.
    pub fn reload(&self) {
        match self {
            Association::EmbedsOne(a) => a.reset(),
            Association::EmbedsMany(a) => a.reset(),
            Association::ReferencesOne(a) => a.reset(),
            Association::ReferencesMany(a) => a.reset(),
        }
    }

    /// Empties the association: embedded targets are destroyed, reference
    /// keys are nilled out.
    pub fn clear(&self) -> bool {
        match self {
            Association::EmbedsOne(a) => a.clear(),
            Association::EmbedsMany(a) => a.clear(),
            Association::ReferencesOne(a) => {
                a.clear();
                true
            }
            Association::ReferencesMany(a) => {
                a.clear();
                true
            }
        }
    }

    pub(crate) fn persist_member(&self, member: &Instance) -> bool {
        match self {
            Association::EmbedsOne(a) => a.persist_member(member),
            Association::EmbedsMany(a) => a.persist_member(member),
            _ => false,
        }
    }

    pub(crate) fn remove_member(&self, member: &Instance) -> bool {
        match self {
            Association::EmbedsOne(a) => a.remove_member(member),
            Association::EmbedsMany(a) => a.remove_member(member),
            _ => false,
        }
    }

    pub(crate) fn validation_targets(&self) -> Vec<Instance> {
        match self {
            Association::EmbedsOne(a) => a.reader().into_iter().collect(),
            Association::EmbedsMany(a) => a.members(),
            Association::ReferencesOne(a) => a.reader().ok().flatten().into_iter().collect(),
            Association::ReferencesMany(a) => a.members().unwrap_or_default(),
        }
    }
}

/// A member offered to an association must be of the target model or one of
/// its descendants.
pub(crate) fn ensure_member_kind(
    registry: &Registry,
    reflection: &AssociationReflection,
    member: &Instance,
) -> Result<()> {
    if registry.is_descendant(member.model_id(), reflection.target_model) {
        Ok(())
    } else {
        Err(InlayError::AssociationTypeMismatch {
            expected: reflection.target_name.clone(),
            got: member.model_name(),
        })
    }
}

fn kind_mismatch(owner: &Instance, name: &str, wanted: &str, got: AssocKind) -> InlayError {
    InlayError::Config(format!(
        "association `{}` on `{}` is {:?}, not {}",
        name,
        owner.model_name(),
        got,
        wanted
    ))
}

impl Instance {
    /// The `embeds_one` runtime for `name`; fails when the association is of
    /// another kind.
    pub fn embeds_one(&self, name: &str) -> Result<Rc<EmbedsOne>> {
        match self.association(name)? {
            Association::EmbedsOne(a) => Ok(a),
            other => Err(kind_mismatch(self, name, "embeds_one", other.kind())),
        }
    }

    pub fn embeds_many(&self, name: &str) -> Result<Rc<EmbedsMany>> {
        match self.association(name)? {
            Association::EmbedsMany(a) => Ok(a),
            other => Err(kind_mismatch(self, name, "embeds_many", other.kind())),
        }
    }

    pub fn references_one(&self, name: &str) -> Result<Rc<ReferencesOne>> {
        match self.association(name)? {
            Association::ReferencesOne(a) => Ok(a),
            other => Err(kind_mismatch(self, name, "references_one", other.kind())),
        }
    }

    pub fn references_many(&self, name: &str) -> Result<Rc<ReferencesMany>> {
        match self.association(name)? {
            Association::ReferencesMany(a) => Ok(a),
            other => Err(kind_mismatch(self, name, "references_many", other.kind())),
        }
    }
}
