//! Relationships between models.
//!
//! Every association is reduced to a pair of keys: `owner_key` is the column on
//! the declaring model, `related_key` the column on the associated model. Rows
//! are related when `owner.owner_key == related.related_key`.

use crate::record::{Loaded, Record};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    BelongsTo,
    HasOne,
    HasMany,
}

impl AssociationKind {
    pub fn cardinality(&self) -> Cardinality {
        match self {
            AssociationKind::BelongsTo | AssociationKind::HasOne => Cardinality::One,
            AssociationKind::HasMany => Cardinality::Many,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    name: String,
    kind: AssociationKind,
    owner: String,
    related: String,
    owner_key: String,
    related_key: String,
}

impl Association {
    pub fn new(
        name: &str,
        kind: AssociationKind,
        owner: &str,
        related: &str,
        owner_key: &str,
        related_key: &str,
    ) -> Self {
        Association {
            name: name.to_string(),
            kind,
            owner: owner.to_string(),
            related: related.to_string(),
            owner_key: owner_key.to_string(),
            related_key: related_key.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AssociationKind {
        self.kind
    }

    pub fn cardinality(&self) -> Cardinality {
        self.kind.cardinality()
    }

    /// Name of the declaring model.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Name of the associated model.
    pub fn related(&self) -> &str {
        &self.related
    }

    pub fn owner_key(&self) -> &str {
        &self.owner_key
    }

    pub fn related_key(&self) -> &str {
        &self.related_key
    }

    /// Distinct, non-null `owner_key` values of `owners`, in first-seen order.
    pub fn owner_values(&self, owners: &[Record]) -> Vec<Value> {
        let mut seen = std::collections::HashSet::new();
        owners
            .iter()
            .filter_map(|owner| owner.attributes().get(&self.owner_key))
            .filter(|value| !value.is_null())
            .filter(|value| seen.insert(value.to_string()))
            .cloned()
            .collect()
    }

    /// Distribute `related` records onto `owners`.
    ///
    /// Owners without a match get `None` (one) or an empty list (many).
    pub fn populate(&self, owners: &mut [Record], related: Vec<Record>) {
        let mut grouped: HashMap<String, Vec<Record>> = HashMap::new();
        for record in related {
            let key = match record.attributes().get(&self.related_key) {
                Some(value) if !value.is_null() => value.to_string(),
                _ => continue,
            };
            grouped.entry(key).or_default().push(record);
        }

        for owner in owners.iter_mut() {
            let matches = owner
                .attributes()
                .get(&self.owner_key)
                .filter(|value| !value.is_null())
                .and_then(|value| grouped.get(&value.to_string()));

            let loaded = match self.cardinality() {
                Cardinality::One => Loaded::One(
                    matches
                        .and_then(|records| records.first())
                        .cloned()
                        .map(Box::new),
                ),
                Cardinality::Many => Loaded::Many(matches.cloned().unwrap_or_default()),
            };
            owner.put_loaded(&self.name, loaded);
        }
    }
}
