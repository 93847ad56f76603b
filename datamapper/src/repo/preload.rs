use super::Repo;
use crate::error::{DataMapperError, Result};
use crate::query::Query;
use crate::record::Record;
use crate::util::{expand_preloads, PreloadTree};
use serde_json::Value;

impl Repo {
    /// Load associations onto already fetched records. Paths are association
    /// names, nested with dots: `"pets.owner"`.
    ///
    /// One query runs per association level, no matter how many records.
    pub fn preload<S: AsRef<str>>(&self, records: &mut [Record], paths: &[S]) -> Result<()> {
        let tree = expand_preloads(paths);
        if tree.is_empty() || records.is_empty() {
            return Ok(());
        }
        let model = records[0].model().name().to_string();
        if let Some(other) = records.iter().find(|r| r.model().name() != model) {
            return Err(DataMapperError::Unsupported(format!(
                "can't preload across models '{model}' and '{}'",
                other.model().name()
            )));
        }
        self.preload_tree(records, &tree)
    }

    pub fn preload_record<S: AsRef<str>>(&self, record: Record, paths: &[S]) -> Result<Record> {
        let mut records = [record];
        self.preload(&mut records, paths)?;
        let [record] = records;
        Ok(record)
    }

    fn preload_tree(&self, owners: &mut [Record], tree: &PreloadTree) -> Result<()> {
        let Some(first) = owners.first() else {
            return Ok(());
        };
        let model = first.model().clone();

        for (name, children) in tree.iter() {
            let association = model.association(name)?.clone();
            let values = association.owner_values(owners);

            let mut related = if values.is_empty() {
                Vec::new()
            } else {
                let related_model = self.schema.model(association.related())?;
                let order = related_model.primary_key().to_string();
                let query = Query::new(related_model)
                    .filter(&format!("{}__in", association.related_key()), Value::Array(values))
                    .order_by(&order);
                self.all(&query)?
            };
            log::debug!(
                "preloaded {} '{}' records for {}.{name}",
                related.len(),
                association.related(),
                model.name()
            );

            if !children.is_empty() {
                self.preload_tree(&mut related, children)?;
            }
            association.populate(owners, related);
        }
        Ok(())
    }
}
