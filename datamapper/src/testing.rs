//! Shared fixtures for unit tests.

use crate::repo::Repo;
use crate::schema::Schema;

pub const SCHEMA_YAML: &str = r#"
models:
  User:
    fields:
      name: { type: string }
      email: { type: string }
    associations:
      home: { kind: has_one, model: Home, foreign_key: owner_id }
      pets: { kind: has_many, model: Pet, foreign_key: owner_id }

  Home:
    fields:
      name: { type: string }
      owner_id: { type: integer }
    associations:
      owner: { kind: belongs_to, model: User, foreign_key: owner_id }

  Pet:
    fields:
      name: { type: string, required: true }
      owner_id: { type: integer }
    associations:
      owner: { kind: belongs_to, model: User, foreign_key: owner_id }

  Person:
    fields:
      name: { type: string }

  Book:
    fields:
      title: { type: string, required: true }
      author: { type: string }
      pages: { type: integer }
      rating: { type: float }
      published: { type: boolean }
      released_on: { type: date }
      person_id: { type: integer }
    associations:
      person: { kind: belongs_to, model: Person, foreign_key: person_id }
"#;

pub fn schema() -> Schema {
    Schema::from_yaml_str(SCHEMA_YAML).unwrap()
}

/// In-memory repo with every table created.
pub fn repo() -> Repo {
    let repo = Repo::open_in_memory(schema()).unwrap();
    repo.create_tables().unwrap();
    repo
}
