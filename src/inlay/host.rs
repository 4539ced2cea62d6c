//! # Host column bridge
//!
//! Embedded associations serialize into a raw slot on the owner. When the
//! owner is itself a row in an external store, that slot is usually a TEXT
//! column holding JSON, not a structured value. The accessor pair here swaps
//! into an association declaration to bridge the two shapes:
//!
//! ```ignore
//! registry.model("User", |m| {
//!     m.embeds_many_inline("projects", |p| {
//!         p.attribute("title", AttrType::String);
//!     })
//!     .source(host::json_column_read, host::json_column_write);
//! });
//! ```
//!
//! Rehydrate a row with [`crate::record::Instance::instantiate`], passing the
//! column text through untouched; call
//! [`crate::record::Instance::save_associations`] before handing the row
//! back to the store so every slot holds current JSON text. The write side
//! always produces a string, `"null"` included, so the column never mixes
//! representations.

use crate::record::Instance;
use crate::value::Value;
use log::debug;

/// Source reader for a JSON text column. Unparseable text reads as nil; a
/// slot already holding structured data passes through, so fixtures may mix
/// both forms.
pub fn json_column_read(owner: &Instance, name: &str) -> Value {
    let raw = owner.read_attribute(name).unwrap_or(Value::Null);
    match raw {
        Value::Str(text) => match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(json) => Value::from_json(json),
            Err(err) => {
                debug!("column {} holds invalid JSON: {}", name, err);
                Value::Null
            }
        },
        other => other,
    }
}

/// Source writer for a JSON text column.
pub fn json_column_write(owner: &Instance, name: &str, value: Value) {
    let text = value.to_json().to_string();
    let _ = owner.write_attribute(name, Value::Str(text));
}

#[cfg(test)]
mod tests {
    use super::{json_column_read, json_column_write};
    use crate::record::Instance;
    use crate::schema::{AttrType, Registry, RegistryBuilder};
    use crate::value::Value;
    use std::rc::Rc;

    fn registry() -> Rc<Registry> {
        let mut builder = RegistryBuilder::new();
        builder.model("User", |m| {
            m.attribute("name", AttrType::String);
            m.embeds_many_inline("projects", |p| {
                p.attribute("title", AttrType::String);
            })
            .source(json_column_read, json_column_write);
        });
        builder.finish().unwrap()
    }

    #[test]
    fn members_persist_as_json_text() {
        let registry = registry();
        let user = Instance::build(&registry, "User").unwrap();
        let projects = user.embeds_many("projects").unwrap();
        projects.create(&Value::Map(vec![(
            "title".to_string(),
            Value::Str("first".to_string()),
        )]));

        let column = user.read_attribute("projects").unwrap();
        assert_eq!(
            column,
            Value::Str(r#"[{"title":"first"}]"#.to_string())
        );
    }

    #[test]
    fn rows_rehydrate_from_column_text() {
        let registry = registry();
        let user = Instance::instantiate(
            &registry,
            "User",
            &Value::Map(vec![(
                "projects".to_string(),
                Value::Str(r#"[{"title":"a"},{"title":"b"}]"#.to_string()),
            )]),
        )
        .unwrap();
        let members = user.embeds_many("projects").unwrap().members();
        assert_eq!(members.len(), 2);
        assert_eq!(members[1].get("title").unwrap(), Value::Str("b".into()));
    }

    #[test]
    fn unparseable_column_text_reads_as_empty() {
        let registry = registry();
        let user = Instance::instantiate(
            &registry,
            "User",
            &Value::Map(vec![(
                "projects".to_string(),
                Value::Str("{oops".to_string()),
            )]),
        )
        .unwrap();
        assert!(user.embeds_many("projects").unwrap().is_empty());
    }
}
