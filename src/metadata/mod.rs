//! Entity mapping metadata consumed by the compiler.
//!
//! The compiler never loads mappings itself. A collaborator (usually a
//! metadata factory with its own cache) hands out [`EntityMetadata`] through
//! the [`MetadataProvider`] trait:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MetadataProvider                           │
//! │   entity("User") -> Arc<EntityMetadata>                         │
//! │     table, columns, identifier, relations, inheritance          │
//! └─────────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │   Query compiler (alias registry, join graph, select fields)    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`MetadataRegistry`] is an in-memory provider that can be built in code or
//! deserialized from TOML/JSON.
//!
//! # Example
//!
//! ```ignore
//! use dqlc::metadata::{ColumnType, EntityMetadata, MetadataRegistry, Relation};
//!
//! let registry = MetadataRegistry::new()
//!     .with(
//!         EntityMetadata::new("User", "user")
//!             .column("id", ColumnType::Integer)
//!             .column("name", ColumnType::String)
//!             .identifier(["id"])
//!             .relation(Relation::one_to_many("Phonenumbers", "Phonenumber", "id", "user_id")),
//!     );
//! ```

mod provider;
mod types;

pub use provider::{MetadataError, MetadataProvider, MetadataRegistry};
pub use types::*;
