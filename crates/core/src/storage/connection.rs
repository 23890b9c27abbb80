use once_cell::sync::OnceCell;
use redb::{Database, ReadTransaction, WriteTransaction};
use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// Handle to the registry's redb file.
///
/// The file is opened on first use and closed when the handle is closed or
/// dropped.
pub struct Connection {
    path: PathBuf,
    db: OnceCell<Database>,
}

impl Connection {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            db: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.db.get().is_some()
    }

    /// Get the database, opening (and creating) it if needed
    pub fn database(&self) -> Result<&Database, StoreError> {
        self.db.get_or_try_init(|| {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            tracing::debug!("Opening database at {}", self.path.display());
            Ok(Database::create(&self.path)?)
        })
    }

    /// Begin a read-only snapshot
    pub fn read(&self) -> Result<ReadTransaction, StoreError> {
        Ok(self.database()?.begin_read()?)
    }

    /// Run `f` inside one write transaction.
    ///
    /// Commits when `f` returns `Ok` and aborts when it returns `Err`. If `f`
    /// panics the transaction is dropped uncommitted, which redb also treats
    /// as an abort. Nothing written inside `f` is visible unless the commit
    /// succeeds.
    pub fn transaction<T, E>(
        &self,
        f: impl FnOnce(&WriteTransaction) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let txn = self
            .database()?
            .begin_write()
            .map_err(StoreError::from)?;

        match f(&txn) {
            Ok(value) => {
                txn.commit().map_err(StoreError::from)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort_err) = txn.abort() {
                    tracing::warn!("Failed to abort transaction: {}", abort_err);
                }
                Err(e)
            }
        }
    }

    /// Close the database file. The next operation reopens it.
    pub fn close(&mut self) {
        if self.db.take().is_some() {
            tracing::debug!("Closed database at {}", self.path.display());
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .finish()
    }
}
