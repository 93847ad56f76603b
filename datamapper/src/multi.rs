//! Named write operations run together in one transaction.

use crate::changeset::Changeset;
use crate::error::{DataMapperError, Result};
use crate::record::Record;
use crate::repo::Repo;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Insert => "insert",
            Action::Update => "update",
            Action::Delete => "delete",
        })
    }
}

type Resolver<T> = Box<dyn FnOnce(&MultiContext) -> Result<T>>;

enum Step {
    Write(Action, Resolver<Changeset<Record>>),
    Delete(Resolver<Record>),
}

struct Operation {
    name: String,
    step: Step,
}

/// Ordered list of named operations. Values are given up front or computed
/// from the results of earlier operations.
#[derive(Default)]
pub struct Multi {
    operations: Vec<Operation>,
}

impl Multi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(self, name: &str, value: impl Into<Changeset<Record>>) -> Result<Self> {
        let changeset = value.into();
        self.add(name, Step::Write(Action::Insert, Box::new(move |_| Ok(changeset))))
    }

    pub fn insert_with<F, C>(self, name: &str, f: F) -> Result<Self>
    where
        F: FnOnce(&MultiContext) -> Result<C> + 'static,
        C: Into<Changeset<Record>>,
    {
        self.add(
            name,
            Step::Write(Action::Insert, Box::new(move |ctx| f(ctx).map(Into::into))),
        )
    }

    pub fn update(self, name: &str, changeset: Changeset<Record>) -> Result<Self> {
        self.add(name, Step::Write(Action::Update, Box::new(move |_| Ok(changeset))))
    }

    pub fn update_with<F>(self, name: &str, f: F) -> Result<Self>
    where
        F: FnOnce(&MultiContext) -> Result<Changeset<Record>> + 'static,
    {
        self.add(name, Step::Write(Action::Update, Box::new(f)))
    }

    pub fn delete(self, name: &str, record: Record) -> Result<Self> {
        self.add(name, Step::Delete(Box::new(move |_| Ok(record))))
    }

    pub fn delete_with<F>(self, name: &str, f: F) -> Result<Self>
    where
        F: FnOnce(&MultiContext) -> Result<Record> + 'static,
    {
        self.add(name, Step::Delete(Box::new(f)))
    }

    fn add(mut self, name: &str, step: Step) -> Result<Self> {
        if self.operations.iter().any(|op| op.name == name) {
            return Err(DataMapperError::DuplicateOperation(name.to_string()));
        }
        self.operations.push(Operation {
            name: name.to_string(),
            step,
        });
        Ok(self)
    }

    /// `(name, action)` for every operation, in the order they will run.
    pub fn operations(&self) -> Vec<(&str, Action)> {
        self.operations
            .iter()
            .map(|op| {
                let action = match &op.step {
                    Step::Write(action, _) => *action,
                    Step::Delete(_) => Action::Delete,
                };
                (op.name.as_str(), action)
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Run every operation against `repo`. The caller owns the transaction.
    pub(crate) fn run(self, repo: &Repo) -> Result<MultiContext> {
        let mut context = MultiContext::default();
        for operation in self.operations {
            log::debug!("multi: running '{}'", operation.name);
            let record = match operation.step {
                Step::Write(Action::Insert, resolve) => repo.insert(resolve(&context)?)?,
                Step::Write(_, resolve) => repo.update(resolve(&context)?)?,
                Step::Delete(resolve) => repo.delete(resolve(&context)?)?,
            };
            context.results.insert(operation.name, record);
        }
        Ok(context)
    }
}

impl fmt::Debug for Multi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multi")
            .field("operations", &self.operations())
            .finish()
    }
}

/// Results of the operations that have run so far, by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiContext {
    results: BTreeMap<String, Record>,
}

impl MultiContext {
    pub fn get(&self, name: &str) -> Option<&Record> {
        self.results.get(name)
    }

    /// Like `get`, failing with `UnknownOperation` for names that haven't run.
    pub fn record(&self, name: &str) -> Result<&Record> {
        self.results
            .get(name)
            .ok_or_else(|| DataMapperError::UnknownOperation(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn into_map(self) -> BTreeMap<String, Record> {
        self.results
    }
}
