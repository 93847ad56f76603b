use super::Repo;
use crate::error::{DataMapperError, Result};
use crate::multi::{Multi, MultiContext};

impl Repo {
    /// Run every operation of `multi` inside one transaction. The first
    /// failure rolls everything back and is returned.
    pub fn transaction(&self, multi: Multi) -> Result<MultiContext> {
        let operations = multi.operations().len();
        let context = self.transaction_with(|repo| multi.run(repo))?;
        log::info!("multi committed {operations} operations");
        Ok(context)
    }

    /// Run `f` inside a transaction, committing when it returns `Ok`.
    pub fn transaction_with<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Repo) -> Result<T>,
    {
        if self.in_transaction.replace(true) {
            return Err(DataMapperError::Transaction(
                "a transaction is already open on this repo".into(),
            ));
        }
        let result = self.run_in_transaction(f);
        self.in_transaction.set(false);
        result
    }

    fn run_in_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Repo) -> Result<T>,
    {
        self.begin_transaction()?;
        log::debug!("transaction started");

        let result = f(self).and_then(|value| {
            self.commit_transaction()?;
            log::debug!("transaction committed");
            Ok(value)
        });
        // a failed COMMIT leaves the transaction open, so it is rolled back too
        if let Err(e) = &result {
            log::warn!("rolling back transaction: {e}");
            if let Err(rollback) = self.rollback_transaction() {
                log::error!("rollback failed: {rollback}");
            }
        }
        result
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction.get()
    }
}
