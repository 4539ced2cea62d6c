//! Running a model's validators against one record.

use super::errors::Errors;
use super::Instance;
use crate::schema::Validator;
use log::debug;

impl Instance {
    /// Clears the error bag and reruns every declared validator, inherited
    /// ones included. Custom validators write into a scratch bag so they may
    /// freely read the record they are checking.
    pub fn valid(&self) -> bool {
        self.0.errors.borrow_mut().clear();
        let validators: Vec<Validator> = self.descriptor().validators.clone();
        for validator in validators {
            match validator {
                Validator::Presence(name) => {
                    let present = self
                        .get(&name)
                        .map(|value| value.is_present())
                        .unwrap_or(false);
                    if !present {
                        self.add_error(&name, "can't be blank");
                    }
                }
                Validator::Associated(name) => self.validate_associated(&name),
                Validator::With(check) => {
                    let mut scratch = Errors::default();
                    check(self, &mut scratch);
                    for entry in scratch.entries() {
                        self.add_error(&entry.attribute, &entry.message);
                    }
                }
            }
        }
        self.0.errors.borrow().is_empty()
    }

    /// Adds `is invalid` on the association name when any live target fails
    /// its own validation. Targets already destroyed or marked for
    /// destruction are about to leave and are not checked.
    fn validate_associated(&self, name: &str) {
        let Ok(assoc) = self.association(name) else {
            debug!(
                "validates_associated {} on {} matches no association",
                name,
                self.model_name()
            );
            return;
        };
        let invalid = assoc
            .validation_targets()
            .iter()
            .filter(|target| !target.destroyed() && !target.marked_for_destruction())
            .any(|target| !target.valid());
        if invalid {
            self.add_error(name, "is invalid");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Errors, Instance};
    use crate::schema::{AttrType, Registry, RegistryBuilder};
    use crate::value::Value;
    use std::rc::Rc;

    fn checks_span(record: &Instance, errors: &mut Errors) {
        let from = record.get("from").unwrap_or(Value::Null);
        let to = record.get("to").unwrap_or(Value::Null);
        if let (Value::Int(from), Value::Int(to)) = (from, to) {
            if from > to {
                errors.add("from", "must not exceed to");
            }
        }
    }

    fn registry() -> Rc<Registry> {
        let mut builder = RegistryBuilder::new();
        builder.model("Span", |model| {
            model.attribute("from", AttrType::Integer);
            model.attribute("to", AttrType::Integer);
            model.validates_presence("from");
            model.validate_with(checks_span);
        });
        builder.finish().unwrap()
    }

    #[test]
    fn presence_treats_blank_values_as_missing() {
        let registry = registry();
        let span = Instance::build(&registry, "Span").unwrap();
        assert!(!span.valid());
        assert_eq!(span.errors().on("from"), vec!["can't be blank"]);
        span.set("from", 3).unwrap();
        assert!(span.valid());
        assert!(span.errors().is_empty());
    }

    #[test]
    fn custom_validators_merge_their_findings() {
        let registry = registry();
        let span = Instance::build(&registry, "Span").unwrap();
        span.set("from", 9).unwrap();
        span.set("to", 4).unwrap();
        assert!(!span.valid());
        assert_eq!(span.errors().on("from"), vec!["must not exceed to"]);
        assert_eq!(
            span.errors().full_messages(),
            vec!["from must not exceed to"]
        );
    }

    #[test]
    fn each_run_starts_from_a_clean_bag() {
        let registry = registry();
        let span = Instance::build(&registry, "Span").unwrap();
        assert!(!span.valid());
        assert_eq!(span.errors().len(), 1);
        assert!(!span.valid());
        assert_eq!(span.errors().len(), 1);
    }
}
