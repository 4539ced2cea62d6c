//! Referenced associations against an in-memory catalog: key attributes typed
//! after the target's primary, finder resolution, allow_missing and the
//! writer/reader round trip.

use inlay::error::InlayError;
use inlay::record::Instance;
use inlay::schema::{AttrType, Finder, ModelId, Registry, RegistryBuilder};
use inlay::value::Value;
use std::collections::HashMap;
use std::rc::Rc;
use uuid::Uuid;

/// Author rows keyed by UUID primary, standing in for the host's store.
struct Catalog {
    rows: HashMap<Uuid, Value>,
}

impl Catalog {
    fn new(names: &[&str]) -> (Rc<Catalog>, Vec<Uuid>) {
        let mut rows = HashMap::new();
        let mut ids = Vec::new();
        for name in names {
            let id = Uuid::new_v4();
            rows.insert(
                id,
                Value::Map(vec![
                    ("id".to_string(), Value::Uuid(id)),
                    ("name".to_string(), Value::from(*name)),
                ]),
            );
            ids.push(id);
        }
        (Rc::new(Catalog { rows }), ids)
    }
}

impl Finder for Catalog {
    fn find_by_primary_key(
        &self,
        registry: &Rc<Registry>,
        model: ModelId,
        key: &Value,
    ) -> Option<Instance> {
        let id = key.as_uuid()?;
        let attrs = self.rows.get(&id)?;
        let name = registry.model_name(model).to_string();
        Instance::instantiate(registry, &name, attrs).ok()
    }
}

fn shelf_registry(catalog: Rc<Catalog>) -> Rc<Registry> {
    let mut builder = RegistryBuilder::new();
    builder.model("Author", |m| {
        m.primary_uuid();
        m.attribute("name", AttrType::String);
    });
    builder.model("Book", |m| {
        m.attribute("title", AttrType::String);
        m.references_one("author").finder(catalog.clone());
        m.references_many("co_authors")
            .class_name("Author")
            .finder(catalog)
            .allow_missing();
    });
    builder.finish().unwrap()
}

#[test]
fn key_attributes_follow_the_targets_primary_type() {
    let (catalog, ids) = Catalog::new(&["Ursula"]);
    let registry = shelf_registry(catalog);
    assert!(registry
        .describe("Book")
        .unwrap()
        .contains("author_id: UUID"));

    let book = Instance::build(&registry, "Book").unwrap();
    book.set("author_id", ids[0].to_string()).unwrap();
    assert_eq!(book.get("author_id").unwrap(), Value::Uuid(ids[0]));
}

#[test]
fn writer_and_reader_stay_in_sync_through_the_key() {
    let (catalog, ids) = Catalog::new(&["Ursula", "Joe"]);
    let registry = shelf_registry(catalog.clone());
    let book = Instance::build(&registry, "Book").unwrap();
    let author_assoc = book.references_one("author").unwrap();

    let author_model = registry.model_id("Author").unwrap();
    let ursula = catalog
        .find_by_primary_key(&registry, author_model, &Value::Uuid(ids[0]))
        .unwrap();
    author_assoc.writer(Some(ursula)).unwrap();
    assert_eq!(book.get("author_id").unwrap(), Value::Uuid(ids[0]));
    assert_eq!(
        author_assoc.reader().unwrap().unwrap().get("name").unwrap(),
        Value::Str("Ursula".into())
    );

    // Rewriting the key by hand retargets the next read.
    book.set("author_id", ids[1]).unwrap();
    assert_eq!(
        author_assoc.reader().unwrap().unwrap().get("name").unwrap(),
        Value::Str("Joe".into())
    );
}

#[test]
fn dangling_references_error_unless_allowed() {
    let (catalog, ids) = Catalog::new(&["Ursula"]);
    let registry = shelf_registry(catalog);
    let book = Instance::build(&registry, "Book").unwrap();

    let stray = Uuid::new_v4();
    book.set("author_id", stray).unwrap();
    let err = book.references_one("author").unwrap().reader().unwrap_err();
    assert!(matches!(err, InlayError::RecordNotFound { .. }));
    assert_eq!(
        err.to_string(),
        format!("Couldn't find Author with author_id = {} for Book", stray)
    );

    book.set(
        "co_author_ids",
        Value::Array(vec![Value::Uuid(ids[0]), Value::Uuid(stray)]),
    )
    .unwrap();
    let co_authors = book.references_many("co_authors").unwrap();
    assert_eq!(co_authors.count(), 2);
    let members = co_authors.members().unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].get("name").unwrap(), Value::Str("Ursula".into()));
}

#[test]
fn many_writer_replaces_and_concat_appends() {
    let (catalog, ids) = Catalog::new(&["Ursula", "Joe", "Greta"]);
    let registry = shelf_registry(catalog.clone());
    let book = Instance::build(&registry, "Book").unwrap();
    let co_authors = book.references_many("co_authors").unwrap();
    let author_model = registry.model_id("Author").unwrap();
    let author = |idx: usize| {
        catalog
            .find_by_primary_key(&registry, author_model, &Value::Uuid(ids[idx]))
            .unwrap()
    };

    co_authors.writer(vec![author(0), author(1)]).unwrap();
    assert_eq!(
        book.get("co_author_ids").unwrap(),
        Value::Array(vec![Value::Uuid(ids[0]), Value::Uuid(ids[1])])
    );

    co_authors.push(author(2)).unwrap();
    assert_eq!(co_authors.count(), 3);
    let names: Vec<Value> = co_authors
        .members()
        .unwrap()
        .iter()
        .map(|member| member.get("name").unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            Value::from("Ursula"),
            Value::from("Joe"),
            Value::from("Greta")
        ]
    );

    // Only authors can be pointed at, whatever their primary says.
    let not_an_author = Instance::build(&registry, "Book").unwrap();
    let err = co_authors.writer(vec![not_an_author]).unwrap_err();
    assert!(matches!(err, InlayError::AssociationTypeMismatch { .. }));
    assert_eq!(err.to_string(), "Expected `Author`, but got `Book`");
}

#[test]
fn clearing_references_nils_the_keys_but_saves_never_block() {
    let (catalog, ids) = Catalog::new(&["Ursula"]);
    let registry = shelf_registry(catalog);
    let book = Instance::build(&registry, "Book").unwrap();
    book.set("title", "The Dispossessed").unwrap();
    book.set("author_id", ids[0]).unwrap();
    book.set("co_author_ids", Value::Array(vec![Value::Uuid(ids[0])]))
        .unwrap();

    // References flush nothing on save; a set key is enough.
    assert!(book.save_associations());
    assert!(book.save());

    assert!(book.association("author").unwrap().clear());
    assert_eq!(book.get("author_id").unwrap(), Value::Null);
    book.references_many("co_authors").unwrap().clear();
    assert_eq!(book.get("co_author_ids").unwrap(), Value::Array(vec![]));
    assert_eq!(
        book.references_one("author").unwrap().reader().unwrap(),
        None
    );
}
