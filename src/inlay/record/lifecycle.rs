//! Persistence lifecycle: the persisted/destroyed/marked flags, save and
//! destroy with their guard callbacks, and the performer hand-off for
//! embedded members.
//!
//! Saving is an in-memory commit. A record validates, runs its guards,
//! saves its associations depth-first (each member serializes into its
//! owner's source slot) and then, when the record is itself an embedded
//! member, splices its own attributes into the owning record through the
//! owner's association runtime.

use super::{Instance, WeakInstance};
use crate::error::{InlayError, Result};
use log::debug;

/// Back-pointer from an embedded member to the association that owns it.
#[derive(Clone)]
pub(crate) struct EmbedLink {
    pub(crate) owner: WeakInstance,
    pub(crate) association: String,
}

impl Instance {
    pub fn persisted(&self) -> bool {
        self.0.persisted.get()
    }

    pub fn destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    pub fn new_record(&self) -> bool {
        !self.0.persisted.get() && !self.0.destroyed.get()
    }

    pub fn marked_for_destruction(&self) -> bool {
        self.0.marked.get()
    }

    /// Flags the record so the next association save destroys it instead of
    /// persisting it. Saving the record directly ignores the flag.
    pub fn mark_for_destruction(&self) {
        self.0.marked.set(true);
    }

    pub(crate) fn set_marked_for_destruction(&self, marked: bool) {
        self.0.marked.set(marked);
    }

    pub(crate) fn set_persisted(&self, persisted: bool) {
        self.0.persisted.set(persisted);
    }

    pub(crate) fn set_destroyed(&self, destroyed: bool) {
        self.0.destroyed.set(destroyed);
    }

    pub(crate) fn embedding(&self) -> Option<EmbedLink> {
        self.0.embedding.borrow().clone()
    }

    pub(crate) fn set_embedding(&self, link: Option<EmbedLink>) {
        *self.0.embedding.borrow_mut() = link;
    }

    /// Validates, runs the save guards, saves associations and commits.
    /// Returns `false` without committing when validation or a guard says
    /// no; association failures also veto the commit but their already
    /// performed member writes remain.
    pub fn save(&self) -> bool {
        if self.destroyed() {
            return false;
        }
        if !self.valid() {
            debug!(
                "{} failed validation: {}",
                self.model_name(),
                self.errors()
            );
            return false;
        }
        for guard in self.descriptor().before_save.clone() {
            if !guard(self) {
                debug!("{} save vetoed by guard", self.model_name());
                return false;
            }
        }
        if !self.save_associations() {
            return false;
        }
        if let Some(link) = self.embedding() {
            if let Some(owner) = link.owner.upgrade() {
                let performed = owner
                    .association(&link.association)
                    .map(|assoc| assoc.persist_member(self));
                if !matches!(performed, Ok(true)) {
                    return false;
                }
            }
        }
        self.0.persisted.set(true);
        self.clear_dirty();
        true
    }

    /// [`Instance::save`] that reports failure as an error instead of `false`.
    pub fn save_strict(&self) -> Result<()> {
        if self.destroyed() {
            return Err(InlayError::RecordNotSaved);
        }
        if !self.valid() {
            return Err(InlayError::RecordInvalid {
                model: self.model_name(),
                errors: self.errors().full_messages(),
            });
        }
        if self.save() {
            Ok(())
        } else {
            Err(InlayError::RecordNotSaved)
        }
    }

    /// Runs the destroy guards and retires the record. An embedded member
    /// also splices itself out of its owner's source slot. Destroying an
    /// already destroyed record is a no-op that reports success.
    pub fn destroy(&self) -> bool {
        if self.destroyed() {
            return true;
        }
        for guard in self.descriptor().before_destroy.clone() {
            if !guard(self) {
                debug!("{} destroy vetoed by guard", self.model_name());
                return false;
            }
        }
        if let Some(link) = self.embedding() {
            if let Some(owner) = link.owner.upgrade() {
                let performed = owner
                    .association(&link.association)
                    .map(|assoc| assoc.remove_member(self));
                if !matches!(performed, Ok(true)) {
                    return false;
                }
            }
        }
        self.0.persisted.set(false);
        self.0.destroyed.set(true);
        true
    }

    pub fn destroy_strict(&self) -> Result<()> {
        if self.destroy() {
            Ok(())
        } else {
            Err(InlayError::RecordNotDestroyed)
        }
    }

    /// Saves every association in declaration order. All of them are
    /// attempted even when an earlier one fails.
    pub fn save_associations(&self) -> bool {
        let names: Vec<String> = self
            .descriptor()
            .associations
            .iter()
            .map(|reflection| reflection.name.clone())
            .collect();
        let mut saved = true;
        for name in names {
            let ok = self
                .association(&name)
                .map(|assoc| assoc.save())
                .unwrap_or(false);
            if !ok {
                debug!(
                    "association {} on {} failed to save",
                    name,
                    self.model_name()
                );
                saved = false;
            }
        }
        saved
    }

    /// [`Instance::save_associations`] that stops at the first failing
    /// association and names it.
    pub fn save_associations_strict(&self) -> Result<()> {
        let names: Vec<String> = self
            .descriptor()
            .associations
            .iter()
            .map(|reflection| reflection.name.clone())
            .collect();
        for name in names {
            if !self.association(&name)?.save() {
                return Err(InlayError::AssociationNotSaved(name));
            }
        }
        Ok(())
    }
}
