//! End-to-end coverage of the attribute surface on one realistic model:
//! declaration, casting, defaults, enum restriction, normalizers, aliases,
//! dirty tracking, record equality and the describe/display output.

use chrono::{TimeZone, Utc};
use inlay::error::InlayError;
use inlay::record::Instance;
use inlay::schema::{AttrType, Registry, RegistryBuilder};
use inlay::typecast::{register_normalizer, register_typecaster};
use inlay::value::Value;
use std::rc::Rc;
use uuid::Uuid;

fn compact_unique(value: Value) -> Value {
    match value {
        Value::Array(items) => {
            let mut kept: Vec<Value> = Vec::new();
            for item in items {
                if !item.is_null() && !kept.contains(&item) {
                    kept.push(item);
                }
            }
            Value::Array(kept)
        }
        other => other,
    }
}

fn listing_registry() -> Rc<Registry> {
    register_normalizer("compact_unique", compact_unique);
    let mut builder = RegistryBuilder::new();
    builder.model("Listing", |m| {
        m.primary_uuid();
        m.attribute("title", AttrType::String);
        m.attribute("kind", AttrType::String)
            .one_of(["auction", "fixed"])
            .default("fixed");
        m.attribute("price", AttrType::Float);
        m.attribute("quantity", AttrType::Integer).default(1);
        m.attribute("active", AttrType::Boolean).default(true);
        m.attribute("published_at", AttrType::Time);
        m.collection("tags", AttrType::String)
            .normalized_by("compact_unique");
        m.alias_attribute("name", "title");
        m.validates_presence("title");
    });
    builder.finish().unwrap()
}

#[test]
fn typecasts_follow_the_declared_types() {
    let registry = listing_registry();
    let listing = Instance::build(&registry, "Listing").unwrap();

    listing.set("price", "19.99").unwrap();
    listing.set("quantity", "3").unwrap();
    listing.set("active", "no").unwrap();
    listing.set("published_at", "2026-03-02T10:00:00Z").unwrap();

    assert_eq!(listing.get("price").unwrap(), Value::Float(19.99));
    assert_eq!(listing.get("quantity").unwrap(), Value::Int(3));
    assert_eq!(listing.get("active").unwrap(), Value::Bool(false));
    let expected = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).single().unwrap();
    assert_eq!(listing.get("published_at").unwrap(), Value::Time(expected));

    // An uncastable value reads as nil while the raw form stays reachable.
    listing.set("price", "a bargain").unwrap();
    assert_eq!(listing.get("price").unwrap(), Value::Null);
    assert_eq!(
        listing.get_before_type_cast("price").unwrap(),
        Value::Str("a bargain".to_string())
    );
}

#[test]
fn defaults_enums_and_normalizers_compose() {
    let registry = listing_registry();
    let listing = Instance::build(&registry, "Listing").unwrap();

    assert_eq!(listing.get("kind").unwrap(), Value::Str("fixed".into()));
    assert_eq!(listing.get("quantity").unwrap(), Value::Int(1));
    assert_eq!(listing.get("active").unwrap(), Value::Bool(true));

    listing.set("kind", "auction").unwrap();
    assert_eq!(listing.get("kind").unwrap(), Value::Str("auction".into()));
    listing.set("kind", "raffle").unwrap();
    assert_eq!(listing.get("kind").unwrap(), Value::Null);

    listing
        .set(
            "tags",
            Value::Array(vec![
                Value::from("lamp"),
                Value::Null,
                Value::from("decor"),
                Value::from("lamp"),
            ]),
        )
        .unwrap();
    assert_eq!(
        listing.get("tags").unwrap(),
        Value::Array(vec![Value::from("lamp"), Value::from("decor")])
    );

    // A bare scalar wraps into a one-element collection.
    listing.set("tags", "single").unwrap();
    assert_eq!(
        listing.get("tags").unwrap(),
        Value::Array(vec![Value::from("single")])
    );
}

fn uniq(value: Value) -> Value {
    match value {
        Value::Array(items) => {
            let mut kept: Vec<Value> = Vec::new();
            for item in items {
                if !kept.contains(&item) {
                    kept.push(item);
                }
            }
            Value::Array(kept)
        }
        other => other,
    }
}

#[test]
fn collection_raw_and_cast_views_diverge() {
    let mut builder = RegistryBuilder::new();
    builder.model("Poll", |m| {
        m.collection("choices", AttrType::String)
            .one_of(["hello", "42"])
            .default("world")
            .normalize_with(uniq);
        m.collection("fallbacks", AttrType::String)
            .default("world")
            .normalize_with(uniq);
    });
    let registry = builder.finish().unwrap();
    let poll = Instance::build(&registry, "Poll").unwrap();

    poll.set("choices", Value::Null).unwrap();
    assert_eq!(poll.get("choices").unwrap(), Value::Array(vec![]));

    // A nil slot picks up the default, which then fails the enum: the slot
    // reads as nil again while the raw view keeps the substitution.
    poll.set("choices", Value::Array(vec![Value::Null])).unwrap();
    assert_eq!(
        poll.get("choices").unwrap(),
        Value::Array(vec![Value::Null])
    );
    assert_eq!(
        poll.get_before_type_cast("choices").unwrap(),
        Value::Array(vec![Value::from("world")])
    );

    // Out-of-enum elements degrade to nil per slot; the normalizer then
    // collapses the duplicates.
    poll.set("choices", Value::Array(vec![Value::Int(43), Value::Int(44)]))
        .unwrap();
    assert_eq!(
        poll.get("choices").unwrap(),
        Value::Array(vec![Value::Null])
    );
    assert_eq!(
        poll.get_before_type_cast("choices").unwrap(),
        Value::Array(vec![Value::Int(43), Value::Int(44)])
    );

    poll.set("choices", Value::Array(vec![Value::Int(42), Value::Int(43)]))
        .unwrap();
    assert_eq!(
        poll.get("choices").unwrap(),
        Value::Array(vec![Value::from("42"), Value::Null])
    );

    // Without an enum the substituted defaults survive the cast and dedupe.
    poll.set("fallbacks", Value::Array(vec![Value::Null, Value::Null]))
        .unwrap();
    assert_eq!(
        poll.get("fallbacks").unwrap(),
        Value::Array(vec![Value::from("world")])
    );
    assert_eq!(
        poll.get_before_type_cast("fallbacks").unwrap(),
        Value::Array(vec![Value::from("world"), Value::from("world")])
    );
}

#[test]
fn aliases_reach_the_canonical_attribute() {
    let registry = listing_registry();
    let listing = Instance::build(&registry, "Listing").unwrap();

    listing.set("name", "Arc Lamp").unwrap();
    assert_eq!(listing.get("title").unwrap(), Value::Str("Arc Lamp".into()));
    assert_eq!(listing.get("name").unwrap(), Value::Str("Arc Lamp".into()));
    assert!(listing.attribute_changed("name").unwrap());
    assert!(listing.attribute_changed("title").unwrap());

    let err = listing.get("label").unwrap_err();
    assert!(matches!(err, InlayError::UnknownAttribute { .. }));
    assert_eq!(
        err.to_string(),
        "Unknown attribute `label` for model `Listing`"
    );
}

#[test]
fn generated_primaries_survive_mass_assignment() {
    let registry = listing_registry();
    let foreign = Uuid::new_v4();
    let listing = Instance::build_with(
        &registry,
        "Listing",
        &Value::Map(vec![
            ("title".to_string(), Value::from("Side Table")),
            ("id".to_string(), Value::Uuid(foreign)),
            ("smuggled".to_string(), Value::from("ignored")),
        ]),
    )
    .unwrap();

    assert_eq!(listing.get("title").unwrap(), Value::Str("Side Table".into()));
    // The primary keeps its generated default; the unknown key vanished.
    let id = listing.get("id").unwrap();
    assert!(matches!(id, Value::Uuid(_)));
    assert_ne!(id, Value::Uuid(foreign));
    assert!(listing.get("smuggled").is_err());
}

#[test]
fn records_with_a_primary_compare_by_its_value() {
    let registry = listing_registry();
    let original = Instance::build(&registry, "Listing").unwrap();
    let sibling = Instance::build(&registry, "Listing").unwrap();
    assert_ne!(original, sibling);

    // Same primary trumps every other attribute difference.
    let copy = Instance::build(&registry, "Listing").unwrap();
    copy.set("id", original.get("id").unwrap()).unwrap();
    copy.set("title", "renamed").unwrap();
    assert_eq!(original, copy);

    let mut builder = RegistryBuilder::new();
    builder.model("Draft", |m| {
        m.primary_attribute("id", AttrType::Integer);
        m.attribute("body", AttrType::String);
    });
    let drafts = builder.finish().unwrap();

    let left = Instance::build(&drafts, "Draft").unwrap();
    let right = Instance::build(&drafts, "Draft").unwrap();
    left.set("body", "same").unwrap();
    right.set("body", "same").unwrap();
    // A nil primary matches nothing but the record itself.
    assert_eq!(left, left.clone());
    assert_ne!(left, right);

    left.set("id", 7).unwrap();
    right.set("id", 7).unwrap();
    assert_eq!(left, right);
}

#[test]
fn dirty_state_tracks_across_save() {
    let registry = listing_registry();
    let listing = Instance::build(&registry, "Listing").unwrap();
    listing.set("title", "Shelf").unwrap();
    listing.set("quantity", 4).unwrap();

    let changes = listing.changes();
    assert_eq!(
        changes,
        vec![
            ("title".to_string(), Value::Null, Value::Str("Shelf".into())),
            ("quantity".to_string(), Value::Int(1), Value::Int(4)),
        ]
    );
    assert_eq!(listing.attribute_was("quantity").unwrap(), Value::Int(1));

    assert!(listing.save());
    assert!(!listing.changed());
    assert_eq!(listing.attribute_was("quantity").unwrap(), Value::Int(4));

    listing.set("quantity", 4).unwrap();
    assert!(!listing.changed());
}

fn cast_cents(value: &Value) -> Option<Value> {
    match value {
        Value::Int(n) => Some(Value::Int(*n)),
        Value::Float(f) => Some(Value::Int((f * 100.0).round() as i64)),
        Value::Str(s) => s
            .parse::<f64>()
            .ok()
            .map(|f| Value::Int((f * 100.0).round() as i64)),
        _ => None,
    }
}

#[test]
fn custom_typecasters_extend_the_type_table() {
    register_typecaster("Cents", cast_cents);
    let mut builder = RegistryBuilder::new();
    builder.model("Fee", |m| {
        m.attribute("amount", AttrType::Custom("Cents".to_string()));
    });
    let registry = builder.finish().unwrap();

    let fee = Instance::build(&registry, "Fee").unwrap();
    fee.set("amount", "12.34").unwrap();
    assert_eq!(fee.get("amount").unwrap(), Value::Int(1234));
    fee.set("amount", Value::Float(0.5)).unwrap();
    assert_eq!(fee.get("amount").unwrap(), Value::Int(50));
}

#[test]
fn describe_and_display_list_attributes_in_declaration_order() {
    let registry = listing_registry();
    assert_eq!(
        registry.describe("Listing").unwrap(),
        "Listing(*id: UUID, title: String, kind: String, price: Float, \
         quantity: Integer, active: Boolean, published_at: Time, tags: [String])"
    );

    let listing = Instance::build(&registry, "Listing").unwrap();
    listing.set("title", "Lamp").unwrap();
    let shown = format!("{}", listing);
    assert!(shown.starts_with("#<Listing *id: "));
    assert!(shown.contains("title: \"Lamp\""));
    assert!(shown.contains("tags: []"));
    assert!(shown.ends_with('>'));
}

#[test]
fn attributes_snapshot_keeps_declaration_order() {
    let registry = listing_registry();
    let listing = Instance::build(&registry, "Listing").unwrap();
    listing.set("title", "Desk").unwrap();

    let snapshot = listing.attributes();
    let keys: Vec<&str> = snapshot
        .as_map()
        .unwrap()
        .iter()
        .map(|(name, _)| name.as_str())
        .collect();
    assert_eq!(
        keys,
        vec![
            "id",
            "title",
            "kind",
            "price",
            "quantity",
            "active",
            "published_at",
            "tags"
        ]
    );
    assert_eq!(snapshot.map_get("kind"), Some(&Value::Str("fixed".into())));
}
