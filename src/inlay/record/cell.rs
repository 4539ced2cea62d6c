//! Attribute storage and the read pipeline.
//!
//! Each written attribute occupies one [`AttributeCell`]: the raw value as
//! written, plus two memos. `effective` pins the defaulted raw form so a
//! generated default is resolved once per record; `cached` holds the fully
//! cast value. Both memos are dropped on write.
//!
//! Reading runs `default -> cast -> enum filter -> normalize`, with
//! collections casting element-wise and normalizing once over the whole
//! array. A value the caster cannot handle becomes `Null` rather than an
//! error, and so does a value outside the declared enum set.

use super::Instance;
use crate::error::Result;
use crate::schema::attribute::{AttrKind, AttributeReflection, CastRule};
use crate::value::Value;
use std::rc::Rc;

#[derive(Default)]
pub(crate) struct AttributeCell {
    raw: Option<Value>,
    effective: Option<Value>,
    cached: Option<Value>,
}

impl Instance {
    /// The cast value of an attribute, resolving aliases.
    pub fn get(&self, name: &str) -> Result<Value> {
        let reflection = self.attr_reflection(name)?;
        Ok(self.read_of(&reflection))
    }

    /// Writes an attribute and tracks the change against the value the
    /// record started from.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let reflection = self.attr_reflection(name)?;
        self.write_of(&reflection, value.into());
        Ok(())
    }

    pub fn present(&self, name: &str) -> Result<bool> {
        Ok(self.get(name)?.is_present())
    }

    /// The defaulted raw value, before any casting.
    pub fn get_before_type_cast(&self, name: &str) -> Result<Value> {
        let reflection = self.attr_reflection(name)?;
        Ok(self.effective_raw_of(&reflection))
    }

    /// The raw slot exactly as written. Association sources live here.
    pub fn read_attribute(&self, name: &str) -> Result<Value> {
        let reflection = self.attr_reflection(name)?;
        Ok(self.raw_of(&reflection))
    }

    /// Writes the raw slot without casting and without touching dirty state.
    pub fn write_attribute(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let reflection = self.attr_reflection(name)?;
        self.raw_write_of(&reflection, value.into());
        Ok(())
    }

    pub fn changed(&self) -> bool {
        !self.0.original.borrow().is_empty()
    }

    pub fn attribute_changed(&self, name: &str) -> Result<bool> {
        let reflection = self.attr_reflection(name)?;
        Ok(self.0.original.borrow().contains_key(&reflection.name))
    }

    /// The value the attribute held before the first unsaved change, or the
    /// current value when it is clean.
    pub fn attribute_was(&self, name: &str) -> Result<Value> {
        let reflection = self.attr_reflection(name)?;
        let was = self.0.original.borrow().get(&reflection.name).cloned();
        Ok(match was {
            Some(value) => value,
            None => self.read_of(&reflection),
        })
    }

    /// `(name, was, now)` for every dirty attribute, in declaration order.
    pub fn changes(&self) -> Vec<(String, Value, Value)> {
        let reflections: Vec<Rc<AttributeReflection>> = self.descriptor().attributes.clone();
        reflections
            .iter()
            .filter_map(|reflection| {
                let was = self.0.original.borrow().get(&reflection.name).cloned();
                was.map(|was| (reflection.name.clone(), was, self.read_of(reflection)))
            })
            .collect()
    }

    pub(crate) fn clear_dirty(&self) {
        self.0.original.borrow_mut().clear();
    }

    pub(crate) fn read_of(&self, reflection: &Rc<AttributeReflection>) -> Value {
        {
            let cells = self.0.cells.borrow();
            if let Some(cached) = cells
                .get(&reflection.name)
                .and_then(|cell| cell.cached.clone())
            {
                return cached;
            }
        }
        let effective = self.effective_raw_of(reflection);
        let value = match reflection.kind {
            AttrKind::Collection => {
                let items = match effective {
                    Value::Array(items) => items,
                    _ => Vec::new(),
                };
                let cast = items
                    .iter()
                    .map(|item| self.cast_one(reflection, item))
                    .collect();
                self.normalize_of(reflection, Value::Array(cast))
            }
            AttrKind::Scalar | AttrKind::Source => {
                let cast = self.cast_one(reflection, &effective);
                self.normalize_of(reflection, cast)
            }
        };
        self.0
            .cells
            .borrow_mut()
            .entry(reflection.name.clone())
            .or_default()
            .cached = Some(value.clone());
        value
    }

    pub(crate) fn write_of(&self, reflection: &Rc<AttributeReflection>, value: Value) {
        let previous = self.read_of(reflection);
        {
            let mut cells = self.0.cells.borrow_mut();
            let cell = cells.entry(reflection.name.clone()).or_default();
            cell.raw = Some(value);
            cell.effective = None;
            cell.cached = None;
        }
        let current = self.read_of(reflection);
        self.track_change(&reflection.name, previous, current);
    }

    pub(crate) fn raw_of(&self, reflection: &Rc<AttributeReflection>) -> Value {
        self.0
            .cells
            .borrow()
            .get(&reflection.name)
            .and_then(|cell| cell.raw.clone())
            .unwrap_or(Value::Null)
    }

    pub(crate) fn raw_write_of(&self, reflection: &Rc<AttributeReflection>, value: Value) {
        let mut cells = self.0.cells.borrow_mut();
        let cell = cells.entry(reflection.name.clone()).or_default();
        cell.raw = Some(value);
        cell.effective = None;
        cell.cached = None;
    }

    /// The raw value with defaults applied. Collections wrap scalars and
    /// substitute the default into nil elements, resolving a generated
    /// default once for the whole pass. No cell borrow is held while a
    /// default factory runs, so factories may read the instance.
    pub(crate) fn effective_raw_of(&self, reflection: &Rc<AttributeReflection>) -> Value {
        let (raw, memo) = {
            let cells = self.0.cells.borrow();
            match cells.get(&reflection.name) {
                Some(cell) => (cell.raw.clone(), cell.effective.clone()),
                None => (None, None),
            }
        };
        if let Some(memo) = memo {
            return memo;
        }
        let computed = match reflection.kind {
            AttrKind::Collection => {
                let items = match raw {
                    Some(Value::Array(items)) => items,
                    Some(Value::Null) | None => Vec::new(),
                    Some(other) => vec![other],
                };
                let mut substitute: Option<Value> = None;
                let defaulted = items
                    .into_iter()
                    .map(|item| {
                        if item.is_null() {
                            if let Some(spec) = &reflection.default {
                                return substitute
                                    .get_or_insert_with(|| spec.resolve(self))
                                    .clone();
                            }
                        }
                        item
                    })
                    .collect();
                Value::Array(defaulted)
            }
            AttrKind::Scalar | AttrKind::Source => match raw {
                Some(value) if !value.is_null() => value,
                _ => match &reflection.default {
                    Some(spec) => spec.resolve(self),
                    None => Value::Null,
                },
            },
        };
        self.0
            .cells
            .borrow_mut()
            .entry(reflection.name.clone())
            .or_default()
            .effective = Some(computed.clone());
        computed
    }

    fn cast_one(&self, reflection: &Rc<AttributeReflection>, value: &Value) -> Value {
        let cast = match &reflection.cast {
            CastRule::Raw => value.clone(),
            CastRule::Fn(caster) => caster(value).unwrap_or(Value::Null),
            CastRule::Model(target) => self.cast_model(target, value),
        };
        match &reflection.enum_values {
            Some(allowed) if !allowed.contains(&cast) => Value::Null,
            _ => cast,
        }
    }

    fn cast_model(&self, target: &str, value: &Value) -> Value {
        let Ok(target_id) = self.0.registry.model_id(target) else {
            return Value::Null;
        };
        match value {
            Value::Record(instance)
                if self
                    .0
                    .registry
                    .is_descendant(instance.model_id(), target_id) =>
            {
                value.clone()
            }
            Value::Map(_) => {
                Value::Record(Instance::build_by_id_with(&self.0.registry, target_id, value))
            }
            _ => Value::Null,
        }
    }

    fn normalize_of(&self, reflection: &Rc<AttributeReflection>, value: Value) -> Value {
        match reflection.normalize {
            Some(normalizer) => normalizer(value),
            None => value,
        }
    }

    fn track_change(&self, name: &str, previous: Value, current: Value) {
        let mut original = self.0.original.borrow_mut();
        match original.get(name) {
            Some(first) if *first == current => {
                original.remove(name);
            }
            Some(_) => {}
            None if previous != current => {
                original.insert(name.to_string(), previous);
            }
            None => {}
        }
    }
}
