//! The `embeds_one` runtime.
//!
//! A single-member sibling of [`super::EmbedsMany`]: the owner's source slot
//! holds one serialized attribute map or nil. The member performers write
//! the whole slot instead of splicing into an array; everything else (the
//! default gate, the slot transaction on a persisted owner, the save flush)
//! mirrors the collection form.

use super::{ensure_member_kind, Association};
use crate::error::{InlayError, Result};
use crate::record::{EmbedLink, Instance, WeakInstance};
use crate::schema::attribute::DefaultSpec;
use crate::schema::{AssociationReflection, Registry};
use crate::value::Value;
use log::debug;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub struct EmbedsOne {
    owner: WeakInstance,
    registry: Rc<Registry>,
    reflection: Rc<AssociationReflection>,
    target: RefCell<Option<Instance>>,
    loaded: Cell<bool>,
    touched: Cell<bool>,
}

impl EmbedsOne {
    pub(crate) fn new(owner: &Instance, reflection: Rc<AssociationReflection>) -> EmbedsOne {
        EmbedsOne {
            owner: owner.downgrade(),
            registry: Rc::clone(owner.registry()),
            reflection,
            target: RefCell::new(None),
            loaded: Cell::new(false),
            touched: Cell::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.reflection.name
    }

    pub fn reflection(&self) -> &AssociationReflection {
        &self.reflection
    }

    /// The target record, still returned after its destruction until a
    /// reload.
    pub fn reader(&self) -> Option<Instance> {
        self.ensure_loaded();
        self.target.borrow().clone()
    }

    /// Replaces the target in memory with a fresh unsaved record; the
    /// previous target is dropped, not destroyed.
    pub fn build(&self) -> Instance {
        self.build_with(&Value::Null)
    }

    pub fn build_with(&self, attrs: &Value) -> Instance {
        self.ensure_loaded();
        self.touched.set(true);
        let member =
            Instance::build_by_id_with(&self.registry, self.reflection.target_model, attrs);
        if let Some(old) = self.target.borrow().as_ref() {
            self.unlink(old);
        }
        self.link(&member);
        *self.target.borrow_mut() = Some(member.clone());
        member
    }

    pub fn create(&self, attrs: &Value) -> Instance {
        let member = self.build_with(attrs);
        let _ = member.save();
        member
    }

    pub fn create_strict(&self, attrs: &Value) -> Result<Instance> {
        let member = self.build_with(attrs);
        member.save_strict()?;
        Ok(member)
    }

    /// Assigns the target. On a persisted owner the current member is
    /// destroyed and the replacement saved against the slot, rolled back as
    /// one unit; `None` just destroys. On a fresh owner the exchange stays
    /// in memory.
    pub fn writer(&self, member: Option<Instance>) -> Result<()> {
        if let Some(member) = &member {
            ensure_member_kind(&self.registry, &self.reflection, member)?;
        }
        let owner = self.owner()?;
        self.ensure_loaded();
        self.touched.set(true);
        let current = self.target.borrow().clone();
        if !owner.persisted() {
            if let Some(old) = &current {
                self.unlink(old);
            }
            if let Some(member) = &member {
                self.link(member);
            }
            *self.target.borrow_mut() = member;
            return Ok(());
        }
        let replacing_same = matches!(
            (&current, &member),
            (Some(a), Some(b)) if Instance::same(a, b)
        );
        let source = self.read_source(&owner);
        let mut snapshot = flag_snapshot(current.as_ref());
        snapshot.extend(flag_snapshot(member.as_ref()));
        if let Some(old) = &current {
            if !replacing_same && !old.destroyed() && !old.destroy() {
                self.write_source(&owner, source.clone());
                restore_flags(&snapshot);
                return Err(InlayError::RecordNotSaved);
            }
        }
        if let Some(member) = &member {
            self.link(member);
        }
        *self.target.borrow_mut() = member.clone();
        if let Some(member) = &member {
            if !member.save() {
                self.unlink(member);
                self.write_source(&owner, source.clone());
                restore_flags(&snapshot);
                *self.target.borrow_mut() = current;
                return Err(InlayError::RecordNotSaved);
            }
        }
        Ok(())
    }

    /// Destroys the current target and empties the association.
    pub fn clear(&self) -> bool {
        self.ensure_loaded();
        let Ok(owner) = self.owner() else {
            return false;
        };
        self.touched.set(true);
        let current = self.target.borrow().clone();
        if let Some(member) = &current {
            if !member.destroyed() {
                let source = self.read_source(&owner);
                let snapshot = flag_snapshot(Some(member));
                if !member.destroy() {
                    self.write_source(&owner, source);
                    restore_flags(&snapshot);
                    return false;
                }
            }
            self.unlink(member);
        }
        *self.target.borrow_mut() = None;
        true
    }

    /// The save flush: a marked target is destroyed, a live one saved.
    pub fn save(&self) -> bool {
        self.ensure_loaded();
        let Ok(owner) = self.owner() else {
            return false;
        };
        let current = self.target.borrow().clone();
        match current {
            Some(member) if member.marked_for_destruction() && !member.destroyed() => {
                member.destroy()
            }
            Some(member) if !member.destroyed() => {
                if member.save() {
                    true
                } else {
                    merge_member_errors(&owner, self.name(), &member);
                    false
                }
            }
            _ => true,
        }
    }

    pub fn reload(&self) -> Option<Instance> {
        self.reset();
        self.reader()
    }

    pub(crate) fn reset(&self) {
        if let Some(member) = self.target.borrow().as_ref() {
            self.unlink(member);
        }
        *self.target.borrow_mut() = None;
        self.loaded.set(false);
    }

    /// Member performer: the slot becomes the member's serialized form.
    pub(crate) fn persist_member(&self, member: &Instance) -> bool {
        let Ok(owner) = self.owner() else {
            return false;
        };
        let held = matches!(
            self.target.borrow().as_ref(),
            Some(current) if Instance::same(current, member)
        );
        if !held {
            debug!(
                "{} does not hold this member on {}, refusing to persist",
                self.name(),
                owner.model_name()
            );
            return false;
        }
        let serialized = member.attributes();
        self.write_source(&owner, serialized);
        true
    }

    /// Member performer: a persisted member empties the slot on destroy.
    pub(crate) fn remove_member(&self, member: &Instance) -> bool {
        let Ok(owner) = self.owner() else {
            return false;
        };
        let held = matches!(
            self.target.borrow().as_ref(),
            Some(current) if Instance::same(current, member)
        );
        if held && member.persisted() {
            self.write_source(&owner, Value::Null);
        }
        true
    }

    fn ensure_loaded(&self) {
        if self.loaded.get() {
            return;
        }
        self.loaded.set(true);
        let Ok(owner) = self.owner() else {
            return;
        };
        let target = match self.read_source(&owner) {
            source @ Value::Map(_) => {
                let member = Instance::instantiate_by_id(
                    &self.registry,
                    self.reflection.target_model,
                    &source,
                );
                self.link(&member);
                Some(member)
            }
            _ => {
                if !owner.persisted() && !self.touched.get() {
                    self.reflection
                        .default
                        .clone()
                        .and_then(|spec| self.materialize_default(&owner, &spec))
                } else {
                    None
                }
            }
        };
        *self.target.borrow_mut() = target;
    }

    fn materialize_default(&self, owner: &Instance, spec: &DefaultSpec) -> Option<Instance> {
        let member = match spec.resolve(owner) {
            Value::Record(instance) => {
                if ensure_member_kind(&self.registry, &self.reflection, &instance).is_err() {
                    debug!(
                        "default for {} skipped a {} record",
                        self.name(),
                        instance.model_name()
                    );
                    return None;
                }
                instance
            }
            value @ Value::Map(_) => {
                Instance::build_by_id_with(&self.registry, self.reflection.target_model, &value)
            }
            _ => return None,
        };
        self.link(&member);
        Some(member)
    }

    fn owner(&self) -> Result<Instance> {
        self.owner.upgrade().ok_or_else(|| {
            InlayError::Config(format!("owner record of `{}` is gone", self.name()))
        })
    }

    fn read_source(&self, owner: &Instance) -> Value {
        (self.reflection.source.read)(owner, &self.reflection.name)
    }

    fn write_source(&self, owner: &Instance, value: Value) {
        (self.reflection.source.write)(owner, &self.reflection.name, value);
    }

    fn link(&self, member: &Instance) {
        member.set_embedding(Some(EmbedLink {
            owner: self.owner.clone(),
            association: self.reflection.name.clone(),
        }));
    }

    fn unlink(&self, member: &Instance) {
        member.set_embedding(None);
    }
}

fn flag_snapshot(member: Option<&Instance>) -> Vec<(Instance, bool, bool)> {
    member
        .map(|member| vec![(member.clone(), member.persisted(), member.destroyed())])
        .unwrap_or_default()
}

fn restore_flags(snapshot: &[(Instance, bool, bool)]) {
    for (member, persisted, destroyed) in snapshot {
        member.set_persisted(*persisted);
        member.set_destroyed(*destroyed);
    }
}

fn merge_member_errors(owner: &Instance, name: &str, member: &Instance) {
    let errors = member.errors();
    for entry in errors.entries() {
        owner.add_error(&format!("{}.{}", name, entry.attribute), &entry.message);
    }
}
