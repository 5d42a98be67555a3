mod sql;
mod sqlite;

#[cfg(test)]
mod tests;

pub mod config;
pub mod types;

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use log::warn;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::errors::Error;

pub use sqlite::Sqlite;
pub use types::Transaction;

pub struct Database {
    conn: Mutex<Sqlite>,

    /// Admission control for storage sessions. Acquisition never waits:
    /// when every slot is taken the request is rejected immediately.
    sessions: Arc<Semaphore>,
}

/// A storage session, holding one slot of the pool until dropped.
pub struct Session<'a> {
    db: &'a Database,
    _permit: OwnedSemaphorePermit,
}

impl Database {
    pub fn new(conn: Sqlite, max_sessions: usize) -> Self {
        Self {
            conn: Mutex::new(conn),
            sessions: Arc::new(Semaphore::new(max_sessions)),
        }
    }

    #[cfg(test)]
    pub fn new_test() -> Self {
        let conn = Sqlite::memory().unwrap();
        Self::new(conn, 16)
    }

    pub fn session(&self) -> Result<Session<'_>, Error> {
        match self.sessions.clone().try_acquire_owned() {
            Ok(permit) => Ok(Session {
                db: self,
                _permit: permit,
            }),
            Err(_) => {
                warn!("Storage session pool exhausted, rejecting request");
                Err(Error::ServiceUnavailable(String::from("too many sessions")))
            }
        }
    }

    pub fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn Transaction) -> Result<T>,
    {
        self.transact(f)
    }

    /// Like `with_transaction`, for closures that return classified errors.
    /// The transaction is rolled back on any error.
    pub fn execute<T, F>(&self, f: F) -> crate::errors::Result<T>
    where
        F: FnOnce(&dyn Transaction) -> crate::errors::Result<T>,
    {
        self.transact(f)
    }

    fn transact<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<anyhow::Error>,
        F: FnOnce(&dyn Transaction) -> std::result::Result<T, E>,
    {
        let mut conn = match self.conn.lock() {
            Ok(conn) => conn,
            Err(e) => return Err(anyhow!("failed to lock connection: {:#}", e).into()),
        };
        let tx = conn.transaction()?;

        let result = f(&tx);

        if result.is_ok() {
            tx.commit()
        } else {
            tx.rollback()
        }?;

        result
    }
}

impl Session<'_> {
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn Transaction) -> Result<T>,
    {
        self.db.with_transaction(f)
    }

    pub fn execute<T, F>(&self, f: F) -> crate::errors::Result<T>
    where
        F: FnOnce(&dyn Transaction) -> crate::errors::Result<T>,
    {
        self.db.execute(f)
    }
}
