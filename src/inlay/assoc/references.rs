//! The reference runtimes.
//!
//! References own no target data. The link lives in a key attribute on the
//! owner (`author_id`, `reviewer_ids`) typed after the target's primary, and
//! resolution goes through the [`Finder`] attached to the declaration.
//! Assigning a target writes its primary into the key attribute immediately;
//! there is nothing left for save to flush.
//!
//! Resolved targets are cached against the key value that produced them, so
//! rewriting the key attribute by hand invalidates the cache on its own.

use super::ensure_member_kind;
use crate::error::{InlayError, Result};
use crate::record::{Instance, WeakInstance};
use crate::schema::{AssociationReflection, Finder, Registry};
use crate::value::Value;
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;

pub struct ReferencesOne {
    owner: WeakInstance,
    registry: Rc<Registry>,
    reflection: Rc<AssociationReflection>,
    cache: RefCell<Option<(Value, Option<Instance>)>>,
}

impl ReferencesOne {
    pub(crate) fn new(owner: &Instance, reflection: Rc<AssociationReflection>) -> ReferencesOne {
        ReferencesOne {
            owner: owner.downgrade(),
            registry: Rc::clone(owner.registry()),
            reflection,
            cache: RefCell::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.reflection.name
    }

    pub fn reflection(&self) -> &AssociationReflection {
        &self.reflection
    }

    /// The cast value of the key attribute.
    pub fn key(&self) -> Result<Value> {
        let owner = self.owner()?;
        owner.get(self.key_name()?)
    }

    /// Resolves the key through the finder. A nil key is `None`; a key the
    /// finder cannot resolve is `RecordNotFound` unless the association
    /// allows missing targets.
    pub fn reader(&self) -> Result<Option<Instance>> {
        let owner = self.owner()?;
        let key = owner.get(self.key_name()?)?;
        if key.is_null() {
            return Ok(None);
        }
        if let Some((cached_key, cached)) = &*self.cache.borrow() {
            if *cached_key == key {
                return Ok(cached.clone());
            }
        }
        let finder = self.finder()?;
        match finder.find_by_primary_key(&self.registry, self.reflection.target_model, &key) {
            Some(found) => {
                *self.cache.borrow_mut() = Some((key, Some(found.clone())));
                Ok(Some(found))
            }
            None if self.reflection.allow_missing => {
                *self.cache.borrow_mut() = Some((key, None));
                Ok(None)
            }
            None => Err(self.not_found(&owner, &key)),
        }
    }

    /// Points the key attribute at `target`'s primary, or nils it out. The
    /// target must be of the right model and must carry a primary value.
    pub fn writer(&self, target: Option<Instance>) -> Result<()> {
        let owner = self.owner()?;
        let key_name = self.key_name()?.to_string();
        match target {
            Some(target) => {
                ensure_member_kind(&self.registry, &self.reflection, &target)?;
                let primary = target.primary_value();
                if primary.is_null() {
                    return Err(InlayError::AssociationNotSaved(self.name().to_string()));
                }
                owner.set(&key_name, primary)?;
                let cached_key = owner.get(&key_name)?;
                *self.cache.borrow_mut() = Some((cached_key, Some(target)));
            }
            None => {
                owner.set(&key_name, Value::Null)?;
                *self.cache.borrow_mut() = None;
            }
        }
        Ok(())
    }

    pub fn clear(&self) {
        if let Err(err) = self.writer(None) {
            debug!("clearing reference {} failed: {}", self.name(), err);
        }
    }

    pub fn reload(&self) -> Result<Option<Instance>> {
        self.reset();
        self.reader()
    }

    pub(crate) fn reset(&self) {
        *self.cache.borrow_mut() = None;
    }

    fn not_found(&self, owner: &Instance, key: &Value) -> InlayError {
        InlayError::RecordNotFound {
            model: self.reflection.target_name.clone(),
            key: self
                .reflection
                .reference_key
                .clone()
                .unwrap_or_default(),
            value: key.to_string(),
            owner: owner.model_name(),
        }
    }

    fn key_name(&self) -> Result<&str> {
        self.reflection.reference_key.as_deref().ok_or_else(|| {
            InlayError::Config(format!("reference `{}` has no key attribute", self.name()))
        })
    }

    fn finder(&self) -> Result<Rc<dyn Finder>> {
        self.reflection.finder.clone().ok_or_else(|| {
            InlayError::Config(format!("reference `{}` has no finder", self.name()))
        })
    }

    fn owner(&self) -> Result<Instance> {
        self.owner.upgrade().ok_or_else(|| {
            InlayError::Config(format!("owner record of `{}` is gone", self.name()))
        })
    }
}

pub struct ReferencesMany {
    owner: WeakInstance,
    registry: Rc<Registry>,
    reflection: Rc<AssociationReflection>,
    cache: RefCell<Option<(Value, Vec<Instance>)>>,
}

impl ReferencesMany {
    pub(crate) fn new(owner: &Instance, reflection: Rc<AssociationReflection>) -> ReferencesMany {
        ReferencesMany {
            owner: owner.downgrade(),
            registry: Rc::clone(owner.registry()),
            reflection,
            cache: RefCell::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.reflection.name
    }

    pub fn reflection(&self) -> &AssociationReflection {
        &self.reflection
    }

    /// The cast key collection.
    pub fn keys(&self) -> Result<Value> {
        let owner = self.owner()?;
        owner.get(self.key_name()?)
    }

    pub fn count(&self) -> usize {
        let Ok(keys) = self.keys() else {
            return 0;
        };
        keys.as_array()
            .map(|items| items.iter().filter(|key| !key.is_null()).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Resolves every non-nil key in order. One unresolvable key fails the
    /// whole read unless the association allows missing targets, in which
    /// case it is skipped.
    pub fn members(&self) -> Result<Vec<Instance>> {
        let owner = self.owner()?;
        let keys = owner.get(self.key_name()?)?;
        if let Some((cached_keys, cached)) = &*self.cache.borrow() {
            if *cached_keys == keys {
                return Ok(cached.clone());
            }
        }
        let key_list: Vec<Value> = keys
            .as_array()
            .map(|items| items.to_vec())
            .unwrap_or_default();
        let mut members = Vec::new();
        if !key_list.iter().all(Value::is_null) {
            let finder = self.finder()?;
            for key in &key_list {
                if key.is_null() {
                    continue;
                }
                match finder.find_by_primary_key(
                    &self.registry,
                    self.reflection.target_model,
                    key,
                ) {
                    Some(found) => members.push(found),
                    None if self.reflection.allow_missing => {}
                    None => return Err(self.not_found(&owner, key)),
                }
            }
        }
        *self.cache.borrow_mut() = Some((keys, members.clone()));
        Ok(members)
    }

    /// Replaces the key collection with the primaries of `members`.
    pub fn writer(&self, members: Vec<Instance>) -> Result<()> {
        let owner = self.owner()?;
        let key_name = self.key_name()?.to_string();
        let keys = self.primaries_of(&members)?;
        owner.set(&key_name, Value::Array(keys))?;
        let cached_keys = owner.get(&key_name)?;
        *self.cache.borrow_mut() = Some((cached_keys, members));
        Ok(())
    }

    /// Appends the primaries of `members` to the key collection.
    pub fn concat(&self, members: Vec<Instance>) -> Result<()> {
        let owner = self.owner()?;
        let key_name = self.key_name()?.to_string();
        let appended = self.primaries_of(&members)?;
        let mut keys: Vec<Value> = owner
            .get(&key_name)?
            .as_array()
            .map(|items| items.to_vec())
            .unwrap_or_default();
        keys.extend(appended);
        owner.set(&key_name, Value::Array(keys))?;
        self.reset();
        Ok(())
    }

    pub fn push(&self, member: Instance) -> Result<()> {
        self.concat(vec![member])
    }

    pub fn clear(&self) {
        let result = self
            .owner()
            .and_then(|owner| owner.set(self.key_name()?, Value::Array(Vec::new())));
        if let Err(err) = result {
            debug!("clearing reference {} failed: {}", self.name(), err);
        }
        self.reset();
    }

    pub fn reload(&self) -> Result<Vec<Instance>> {
        self.reset();
        self.members()
    }

    pub(crate) fn reset(&self) {
        *self.cache.borrow_mut() = None;
    }

    fn primaries_of(&self, members: &[Instance]) -> Result<Vec<Value>> {
        for member in members {
            ensure_member_kind(&self.registry, &self.reflection, member)?;
        }
        let mut keys = Vec::with_capacity(members.len());
        for member in members {
            let primary = member.primary_value();
            if primary.is_null() {
                return Err(InlayError::AssociationNotSaved(self.name().to_string()));
            }
            keys.push(primary);
        }
        Ok(keys)
    }

    fn not_found(&self, owner: &Instance, key: &Value) -> InlayError {
        InlayError::RecordNotFound {
            model: self.reflection.target_name.clone(),
            key: self
                .reflection
                .reference_key
                .clone()
                .unwrap_or_default(),
            value: key.to_string(),
            owner: owner.model_name(),
        }
    }

    fn key_name(&self) -> Result<&str> {
        self.reflection.reference_key.as_deref().ok_or_else(|| {
            InlayError::Config(format!("reference `{}` has no key attribute", self.name()))
        })
    }

    fn finder(&self) -> Result<Rc<dyn Finder>> {
        self.reflection.finder.clone().ok_or_else(|| {
            InlayError::Config(format!("reference `{}` has no finder", self.name()))
        })
    }

    fn owner(&self) -> Result<Instance> {
        self.owner.upgrade().ok_or_else(|| {
            InlayError::Config(format!("owner record of `{}` is gone", self.name()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttrType, ModelId, RegistryBuilder};
    use std::collections::HashMap;

    /// In-memory author table keyed by integer primary.
    struct Table {
        rows: HashMap<i64, Value>,
    }

    impl Table {
        fn new(rows: &[(i64, &str)]) -> Rc<Table> {
            Rc::new(Table {
                rows: rows
                    .iter()
                    .map(|(id, name)| {
                        (
                            *id,
                            Value::Map(vec![
                                ("id".to_string(), Value::Int(*id)),
                                ("name".to_string(), Value::Str(name.to_string())),
                            ]),
                        )
                    })
                    .collect(),
            })
        }
    }

    impl Finder for Table {
        fn find_by_primary_key(
            &self,
            registry: &Rc<Registry>,
            model: ModelId,
            key: &Value,
        ) -> Option<Instance> {
            let id = key.as_i64()?;
            let attrs = self.rows.get(&id)?;
            let name = registry.model_name(model).to_string();
            Instance::instantiate(registry, &name, attrs).ok()
        }
    }

    fn registry(table: Rc<Table>) -> Rc<Registry> {
        let mut builder = RegistryBuilder::new();
        builder.model("Author", |m| {
            m.primary_attribute("id", AttrType::Integer);
            m.attribute("name", AttrType::String);
        });
        builder.model("Book", |m| {
            m.attribute("title", AttrType::String);
            m.references_one("author").finder(table.clone());
            m.references_many("reviewers")
                .class_name("Author")
                .finder(table)
                .allow_missing();
        });
        builder.finish().unwrap()
    }

    #[test]
    fn reader_resolves_the_key_through_the_finder() {
        let registry = registry(Table::new(&[(1, "Ursula"), (2, "Joe")]));
        let book = Instance::build(&registry, "Book").unwrap();
        let author = book.references_one("author").unwrap();

        assert_eq!(author.reader().unwrap(), None);
        book.set("author_id", 1).unwrap();
        let found = author.reader().unwrap().unwrap();
        assert_eq!(found.get("name").unwrap(), Value::Str("Ursula".into()));

        book.set("author_id", 404).unwrap();
        let err = author.reader().unwrap_err();
        assert!(matches!(err, InlayError::RecordNotFound { .. }));
        assert_eq!(
            err.to_string(),
            "Couldn't find Author with author_id = 404 for Book"
        );
    }

    #[test]
    fn writer_stores_the_primary_in_the_key_attribute() {
        let table = Table::new(&[(7, "Greta")]);
        let registry = registry(table.clone());
        let book = Instance::build(&registry, "Book").unwrap();
        let author_assoc = book.references_one("author").unwrap();
        let greta = table
            .find_by_primary_key(&registry, registry.model_id("Author").unwrap(), &Value::Int(7))
            .unwrap();

        author_assoc.writer(Some(greta)).unwrap();
        assert_eq!(book.get("author_id").unwrap(), Value::Int(7));

        author_assoc.writer(None).unwrap();
        assert_eq!(book.get("author_id").unwrap(), Value::Null);
    }

    #[test]
    fn unsaved_targets_cannot_be_referenced() {
        let registry = registry(Table::new(&[]));
        let book = Instance::build(&registry, "Book").unwrap();
        let fresh = Instance::build(&registry, "Author").unwrap();
        fresh.set("name", "no id yet").unwrap();
        let err = book
            .references_one("author")
            .unwrap()
            .writer(Some(fresh))
            .unwrap_err();
        assert!(matches!(err, InlayError::AssociationNotSaved(_)));
    }

    #[test]
    fn many_resolves_in_key_order_and_skips_missing_when_allowed() {
        let registry = registry(Table::new(&[(1, "Ursula"), (2, "Joe")]));
        let book = Instance::build(&registry, "Book").unwrap();
        book.set(
            "reviewer_ids",
            Value::Array(vec![Value::Int(2), Value::Int(404), Value::Int(1)]),
        )
        .unwrap();
        let reviewers = book.references_many("reviewers").unwrap();
        assert_eq!(reviewers.count(), 3);
        let members = reviewers.members().unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].get("name").unwrap(), Value::Str("Joe".into()));
        assert_eq!(members[1].get("name").unwrap(), Value::Str("Ursula".into()));
    }

    #[test]
    fn missing_finder_is_a_configuration_error() {
        let mut builder = RegistryBuilder::new();
        builder.model("Author", |m| {
            m.primary_attribute("id", AttrType::Integer);
        });
        builder.model("Book", |m| {
            m.references_one("author");
        });
        let registry = builder.finish().unwrap();
        let book = Instance::build(&registry, "Book").unwrap();
        book.set("author_id", 1).unwrap();
        let err = book.references_one("author").unwrap().reader().unwrap_err();
        assert!(matches!(err, InlayError::Config(_)));
    }
}
