//! Named, lock-guarded table shared by the engine components.
//!
//! Request paths recover a poisoned lock since every table holds plain maps and counters that
//! stay structurally valid. Sweeps instead report the poisoning so the janitor can log it and
//! move on to the next table.

use crate::error_handling::types::EngineError;
use log::warn;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
pub struct Table<T> {
    name: &'static str,
    inner: Mutex<T>,
}

impl<T> Table<T> {
    pub fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            inner: Mutex::new(value),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("Recovering poisoned table '{}'", self.name);
            poisoned.into_inner()
        })
    }

    /// Locks the table for a sweep pass.
    ///
    /// A poisoned table fails this pass and has its poison flag cleared, so the next scheduled
    /// sweep runs normally.
    pub fn lock_for_sweep(&self) -> Result<MutexGuard<'_, T>, EngineError> {
        if self.inner.is_poisoned() {
            self.inner.clear_poison();
            return Err(EngineError::TablePoisoned(self.name));
        }
        Ok(self.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_poisoned_table_is_reported_to_sweeps_only() {
        let table = Arc::new(Table::new("numbers", vec![1, 2, 3]));

        let poisoner = Arc::clone(&table);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock();
            panic!("poison the table");
        })
        .join();

        assert_eq!(
            table.lock_for_sweep().err(),
            Some(EngineError::TablePoisoned("numbers"))
        );
        assert!(table.lock_for_sweep().is_ok());
        assert_eq!(table.lock().len(), 3);
    }
}
