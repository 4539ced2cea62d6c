//! # Inlay Architecture
//!
//! Inlay is a **schema-driven attribute and embedded-document layer** for
//! plain Rust records. It is not an ORM: nothing here talks to a database.
//! Records live in memory, embedded records persist by serializing into a
//! slot on their owner, and a host row (which may well belong to an ORM)
//! carries that slot as one of its columns.
//!
//! ## The Three Layers
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Schema Layer (schema/)                                      │
//! │  - RegistryBuilder: the declaration surface (models,         │
//! │    attributes, associations, validators, guards)             │
//! │  - Registry: frozen reflection tables shared by all records  │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Record Layer (record/)                                      │
//! │  - Instance: a cheap shared handle over one record           │
//! │  - Attribute cells and the read pipeline                     │
//! │  - Lifecycle flags, dirty tracking, validation               │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Association Layer (assoc/)                                  │
//! │  - EmbedsOne / EmbedsMany: members serialized into the       │
//! │    owner's slot, spliced in and out by member performers     │
//! │  - ReferencesOne / ReferencesMany: a key attribute on the    │
//! │    owner, resolved through a host-supplied Finder            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## The Read Pipeline
//!
//! Every typed read runs the same stages over the raw slot:
//! default → typecast → enum filter → normalize. Collections run the cast
//! stages per element and normalize once over the whole array. A value the
//! caster cannot handle reads as nil, never as an error; schema mistakes
//! (unknown typecaster, unresolvable association target, duplicate model)
//! fail loudly when the registry builder finishes, not at read time.
//!
//! ## Members Persist Themselves
//!
//! An embedded member carries a back-pointer to the association that owns
//! it. Saving the member splices its serialized attributes into the owner's
//! slot at the member's own position; destroying it splices them out.
//! Association-level operations (writer, clear, the save flush) are
//! choreography over those two performers, with slot snapshots to roll back
//! vetoed destructions.
//!
//! ## Single-Threaded Model
//!
//! A record is `Rc`-shared and `Cell`/`RefCell`-mutable: handles clone
//! cheaply and are never `Send`. No internal borrow is held across a user
//! callback, so defaults, guards and validators are free to read the record
//! they run against.
//!
//! ## Module Overview
//!
//! - [`schema`]: Declarations, reflection tables, the registry builder
//! - [`record`]: Instances, attribute cells, lifecycle, validation
//! - [`assoc`]: The four association runtimes
//! - [`host`]: JSON text column bridge for rows living in external stores
//! - [`value`]: The dynamically typed attribute value
//! - [`typecast`]: Builtin and registered typecasters and normalizers
//! - [`error`]: Error types

pub mod assoc;
pub mod error;
pub mod host;
pub mod record;
pub mod schema;
pub mod typecast;
pub mod value;
