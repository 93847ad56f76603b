use crate::error::{DataMapperError, Result};
use crate::schema::Model;
use std::collections::HashMap;
use std::sync::Arc;

/// Hands out table aliases for one compilation and remembers which model
/// each alias points at.
#[derive(Debug, Default)]
pub struct AliasTracker {
    aliases: HashMap<String, Arc<Model>>,
    counters: HashMap<String, usize>,
}

impl AliasTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next generated alias for a table: first letter plus a counter, `u0`, `u1`, ...
    pub fn generate(&mut self, table: &str) -> String {
        let prefix: String = table.chars().take(1).collect::<String>().to_lowercase();
        let prefix = if prefix.is_empty() { "t".to_string() } else { prefix };
        loop {
            let counter = self.counters.entry(prefix.clone()).or_insert(0);
            let alias = format!("{prefix}{counter}");
            *counter += 1;
            if !self.aliases.contains_key(&alias) {
                return alias;
            }
        }
    }

    /// Register `model` under `alias`, or under a generated one.
    pub fn put(&mut self, model: Arc<Model>, alias: Option<&str>) -> Result<String> {
        let alias = match alias {
            Some(alias) if self.aliases.contains_key(alias) => {
                return Err(DataMapperError::ConflictingAlias(alias.to_string()))
            }
            Some(alias) => alias.to_string(),
            None => self.generate(model.table()),
        };
        self.aliases.insert(alias.clone(), model);
        Ok(alias)
    }

    pub fn fetch(&self, alias: &str) -> Result<&Arc<Model>> {
        self.aliases
            .get(alias)
            .ok_or_else(|| DataMapperError::UnknownAlias(alias.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_counts_per_prefix() {
        let mut tracker = AliasTracker::new();
        assert_eq!(tracker.generate("users"), "u0");
        assert_eq!(tracker.generate("users"), "u1");
        assert_eq!(tracker.generate("pets"), "p0");
    }

    #[test]
    fn test_put_and_fetch() {
        let schema = crate::testing::schema();
        let pet = schema.model("Pet").unwrap();
        let mut tracker = AliasTracker::new();

        assert_eq!(tracker.put(pet.clone(), None).unwrap(), "p0");
        assert_eq!(tracker.put(pet.clone(), Some("o")).unwrap(), "o");
        assert_eq!(tracker.fetch("o").unwrap().name(), "Pet");

        assert!(matches!(
            tracker.fetch("x"),
            Err(DataMapperError::UnknownAlias(_))
        ));
        assert!(matches!(
            tracker.put(pet, Some("o")),
            Err(DataMapperError::ConflictingAlias(_))
        ));
    }

    #[test]
    fn test_generated_alias_skips_explicit_ones() {
        let schema = crate::testing::schema();
        let pet = schema.model("Pet").unwrap();
        let mut tracker = AliasTracker::new();

        tracker.put(pet.clone(), Some("p0")).unwrap();
        assert_eq!(tracker.put(pet, None).unwrap(), "p1");
    }
}
