pub mod associations;
pub mod changeset;
pub mod config;
pub mod error;
pub mod multi;
pub mod query;
pub mod raw;
pub mod record;
pub mod repo;
pub mod schema;
pub mod util;

#[cfg(test)]
mod testing;

pub use associations::{Association, AssociationKind, Cardinality};
pub use changeset::{Changeset, Length, Schemaless};
pub use config::{Config, Profile};
pub use error::{DataMapperError, Result};
pub use multi::{Action, Multi, MultiContext};
pub use query::{Condition, Query, Selection, Statement};
pub use raw::{Raw, RawRow};
pub use record::{Loaded, Record};
pub use repo::{Queryable, Repo};
pub use schema::{Model, Schema, SchemaDefinition};
