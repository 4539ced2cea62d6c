//! The `embeds_many` runtime.
//!
//! The target is an ordered list of member records materialized from the
//! owner's source slot. Members persist themselves: a member's save splices
//! its serialized attributes into the slot at its own position, a member's
//! destroy splices them out. The association-level operations coordinate
//! those performers.
//!
//! Mutating operations on a persisted owner are transactional against the
//! slot: the previous serialized form and the member flags are snapshotted
//! up front and restored when a destroy guard or a member save says no.
//! The save flush is looser on purpose: the destruction phase is all or
//! nothing, the persist phase attempts every member and leaves the ones
//! that made it.

use super::{ensure_member_kind, Association};
use crate::error::{InlayError, Result};
use crate::record::{EmbedLink, Instance, WeakInstance};
use crate::schema::attribute::DefaultSpec;
use crate::schema::{AssociationReflection, Registry};
use crate::value::Value;
use log::debug;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub struct EmbedsMany {
    owner: WeakInstance,
    registry: Rc<Registry>,
    reflection: Rc<AssociationReflection>,
    target: RefCell<Vec<Instance>>,
    loaded: Cell<bool>,
    touched: Cell<bool>,
}

impl EmbedsMany {
    pub(crate) fn new(owner: &Instance, reflection: Rc<AssociationReflection>) -> EmbedsMany {
        EmbedsMany {
            owner: owner.downgrade(),
            registry: Rc::clone(owner.registry()),
            reflection,
            target: RefCell::new(Vec::new()),
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

    /// The loaded members, destroyed ones included until the next reload.
    pub fn members(&self) -> Vec<Instance> {
        self.ensure_loaded();
        self.target.borrow().clone()
    }

    pub fn count(&self) -> usize {
        self.ensure_loaded();
        self.target.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn member_at(&self, index: usize) -> Option<Instance> {
        self.ensure_loaded();
        self.target.borrow().get(index).cloned()
    }

    pub fn first(&self) -> Option<Instance> {
        self.member_at(0)
    }

    /// Appends a fresh unsaved member.
    pub fn build(&self) -> Instance {
        self.build_with(&Value::Null)
    }

    pub fn build_with(&self, attrs: &Value) -> Instance {
        self.ensure_loaded();
        self.touched.set(true);
        let member =
            Instance::build_by_id_with(&self.registry, self.reflection.target_model, attrs);
        self.link(&member);
        self.target.borrow_mut().push(member.clone());
        member
    }

    /// Builds and saves in one step; the member is returned either way, so
    /// callers check `persisted` or use [`EmbedsMany::create_strict`].
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

    /// Appends already built records and, for a persisted owner, saves them.
    /// A wrong-model record fails the whole call before anything changes;
    /// `Ok(false)` means some appended member did not save.
    pub fn concat(&self, members: Vec<Instance>) -> Result<bool> {
        for member in &members {
            ensure_member_kind(&self.registry, &self.reflection, member)?;
        }
        let owner = self.owner()?;
        self.ensure_loaded();
        self.touched.set(true);
        for member in &members {
            self.link(member);
            self.target.borrow_mut().push(member.clone());
        }
        if !owner.persisted() {
            return Ok(true);
        }
        let mut saved = true;
        for member in &members {
            if !member.save() {
                saved = false;
            }
        }
        Ok(saved)
    }

    pub fn push(&self, member: Instance) -> Result<bool> {
        self.concat(vec![member])
    }

    /// Replaces the whole target. On a persisted owner the current members
    /// are destroyed and the replacements saved inside one slot transaction;
    /// on a fresh owner the exchange happens purely in memory.
    pub fn writer(&self, members: Vec<Instance>) -> Result<()> {
        for member in &members {
            ensure_member_kind(&self.registry, &self.reflection, member)?;
        }
        let owner = self.owner()?;
        self.ensure_loaded();
        self.touched.set(true);
        let current: Vec<Instance> = self.target.borrow().clone();
        if !owner.persisted() {
            for old in &current {
                self.unlink(old);
            }
            for member in &members {
                self.link(member);
            }
            *self.target.borrow_mut() = members;
            return Ok(());
        }
        let source = self.read_source(&owner);
        let mut snapshot = flag_snapshot(&current);
        snapshot.extend(flag_snapshot(&members));
        for member in &current {
            if member.destroyed() {
                continue;
            }
            if !member.destroy() {
                self.write_source(&owner, source.clone());
                restore_flags(&snapshot);
                *self.target.borrow_mut() = current;
                return Err(InlayError::RecordNotSaved);
            }
        }
        for member in &members {
            self.link(member);
        }
        *self.target.borrow_mut() = members.clone();
        for member in &members {
            if !member.save() {
                for undone in &members {
                    self.unlink(undone);
                }
                self.write_source(&owner, source.clone());
                restore_flags(&snapshot);
                *self.target.borrow_mut() = current;
                return Err(InlayError::RecordNotSaved);
            }
        }
        Ok(())
    }

    /// Destroys every member and leaves the target empty. A destroy guard
    /// veto rolls the slot and every member flag back and reports `false`.
    pub fn clear(&self) -> bool {
        self.ensure_loaded();
        let Ok(owner) = self.owner() else {
            return false;
        };
        self.touched.set(true);
        let current: Vec<Instance> = self.target.borrow().clone();
        let source = self.read_source(&owner);
        let snapshot = flag_snapshot(&current);
        for member in &current {
            if member.destroyed() {
                continue;
            }
            if !member.destroy() {
                self.write_source(&owner, source.clone());
                restore_flags(&snapshot);
                return false;
            }
        }
        for member in &current {
            self.unlink(member);
        }
        self.target.borrow_mut().clear();
        true
    }

    /// The save flush: destroy marked members (all or nothing), then attempt
    /// to persist every live member. Failed member saves are folded into the
    /// owner's error bag as `name[index].attribute`.
    pub fn save(&self) -> bool {
        self.ensure_loaded();
        let Ok(owner) = self.owner() else {
            return false;
        };
        let target: Vec<Instance> = self.target.borrow().clone();
        let marked: Vec<Instance> = target
            .iter()
            .filter(|member| member.marked_for_destruction() && !member.destroyed())
            .cloned()
            .collect();
        if !marked.is_empty() {
            let source = self.read_source(&owner);
            let snapshot = flag_snapshot(&marked);
            for member in &marked {
                if !member.destroy() {
                    self.write_source(&owner, source.clone());
                    restore_flags(&snapshot);
                    return false;
                }
            }
        }
        let mut saved = true;
        for (index, member) in target.iter().enumerate() {
            if member.marked_for_destruction() || member.destroyed() {
                continue;
            }
            if !member.save() {
                merge_member_errors(&owner, self.name(), index, member);
                saved = false;
            }
        }
        saved
    }

    /// Drops the loaded target and rereads the source.
    pub fn reload(&self) -> Vec<Instance> {
        self.reset();
        self.members()
    }

    pub(crate) fn reset(&self) {
        for member in self.target.borrow().iter() {
            self.unlink(member);
        }
        self.target.borrow_mut().clear();
        self.loaded.set(false);
    }

    /// Member performer: serialize `member` into the slot, replacing its
    /// current form or inserting it after the persisted members before it.
    pub(crate) fn persist_member(&self, member: &Instance) -> bool {
        let Ok(owner) = self.owner() else {
            return false;
        };
        let Some(index) = self.splice_index(member) else {
            debug!(
                "{} member not in target of {}, refusing to persist",
                self.name(),
                owner.model_name()
            );
            return false;
        };
        let mut items = source_items(self.read_source(&owner));
        let serialized = member.attributes();
        if member.persisted() {
            if index < items.len() {
                items[index] = serialized;
            } else {
                items.push(serialized);
            }
        } else if index <= items.len() {
            items.insert(index, serialized);
        } else {
            items.push(serialized);
        }
        self.write_source(&owner, Value::Array(items));
        true
    }

    /// Member performer: splice a persisted member out of the slot. The
    /// member stays in the target until a reload.
    pub(crate) fn remove_member(&self, member: &Instance) -> bool {
        let Ok(owner) = self.owner() else {
            return false;
        };
        if member.persisted() {
            if let Some(index) = self.splice_index(member) {
                let mut items = source_items(self.read_source(&owner));
                if index < items.len() {
                    items.remove(index);
                    self.write_source(&owner, Value::Array(items));
                }
            }
        }
        true
    }

    /// A member's slot position is the count of persisted members before it
    /// in the target. Identity, not equality: the member must be the same
    /// record, counted before its own persisted flag.
    fn splice_index(&self, member: &Instance) -> Option<usize> {
        let target = self.target.borrow();
        let mut count = 0;
        for candidate in target.iter() {
            if Instance::same(candidate, member) {
                return Some(count);
            }
            if candidate.persisted() {
                count += 1;
            }
        }
        None
    }

    fn ensure_loaded(&self) {
        if self.loaded.get() {
            return;
        }
        self.loaded.set(true);
        let Ok(owner) = self.owner() else {
            return;
        };
        let mut members: Vec<Instance> = Vec::new();
        match self.read_source(&owner) {
            Value::Array(items) if !items.is_empty() => {
                for item in &items {
                    let member = Instance::instantiate_by_id(
                        &self.registry,
                        self.reflection.target_model,
                        item,
                    );
                    self.link(&member);
                    members.push(member);
                }
            }
            _ => {
                if !owner.persisted() && !self.touched.get() {
                    if let Some(spec) = self.reflection.default.clone() {
                        members = self.materialize_default(&owner, &spec);
                    }
                }
            }
        }
        *self.target.borrow_mut() = members;
    }

    fn materialize_default(&self, owner: &Instance, spec: &DefaultSpec) -> Vec<Instance> {
        let value = spec.resolve(owner);
        let items: Vec<Value> = match value {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        let mut members = Vec::new();
        for item in items {
            let member = match item {
                Value::Record(instance) => {
                    if ensure_member_kind(&self.registry, &self.reflection, &instance).is_err() {
                        debug!(
                            "default for {} skipped a {} record",
                            self.name(),
                            instance.model_name()
                        );
                        continue;
                    }
                    instance
                }
                item @ Value::Map(_) => {
                    Instance::build_by_id_with(&self.registry, self.reflection.target_model, &item)
                }
                _ => continue,
            };
            self.link(&member);
            members.push(member);
        }
        members
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

fn source_items(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        _ => Vec::new(),
    }
}

fn flag_snapshot(members: &[Instance]) -> Vec<(Instance, bool, bool)> {
    members
        .iter()
        .map(|member| (member.clone(), member.persisted(), member.destroyed()))
        .collect()
}

fn restore_flags(snapshot: &[(Instance, bool, bool)]) {
    for (member, persisted, destroyed) in snapshot {
        member.set_persisted(*persisted);
        member.set_destroyed(*destroyed);
    }
}

fn merge_member_errors(owner: &Instance, name: &str, index: usize, member: &Instance) {
    let errors = member.errors();
    for entry in errors.entries() {
        owner.add_error(
            &format!("{}[{}].{}", name, index, entry.attribute),
            &entry.message,
        );
    }
}
