mod base_entity;
mod blob;
mod entity;

use std::path::Path;

use anyhow::Result;
use rusqlite::Connection as RawConnection;
use rusqlite::Transaction as RawTransaction;

use crate::charm::{Channel, CharmUrl};

use super::types::{AclField, BaseEntityRecord, EntityRecord, Transaction};

/// SQLite-backed document store. Supports both file-based and in-memory
/// databases; the latter is used by tests.
pub struct Sqlite {
    conn: RawConnection,
}

pub struct SqliteTransaction<'a> {
    tx: RawTransaction<'a>,
}

impl Sqlite {
    /// Opens a SQLite database file, creating it and its tables if needed.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = RawConnection::open(path)?;
        Self::init_tables(&conn)?;
        Ok(Self { conn })
    }

    pub fn memory() -> Result<Self> {
        let conn = RawConnection::open_in_memory()?;
        Self::init_tables(&conn)?;
        Ok(Self { conn })
    }

    fn init_tables(db: &RawConnection) -> Result<()> {
        entity::create_table(db)?;
        base_entity::create_table(db)?;
        blob::create_table(db)?;
        Ok(())
    }

    pub fn transaction(&mut self) -> Result<SqliteTransaction<'_>> {
        let tx = self.conn.transaction()?;
        Ok(SqliteTransaction { tx })
    }
}

impl SqliteTransaction<'_> {
    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }

    pub fn rollback(self) -> Result<()> {
        self.tx.rollback()?;
        Ok(())
    }
}

impl Transaction for SqliteTransaction<'_> {
    fn create_entity(&self, entity: &EntityRecord) -> Result<()> {
        entity::create(&self.tx, entity)
    }

    fn list_entities(&self, name: &str, user: Option<&str>) -> Result<Vec<EntityRecord>> {
        entity::list(&self.tx, name, user)
    }

    fn list_entities_by_names(&self, names: &[String]) -> Result<Vec<EntityRecord>> {
        entity::list_by_names(&self.tx, names)
    }

    fn update_entity_channels(
        &self,
        url: &CharmUrl,
        development: bool,
        stable: bool,
    ) -> Result<()> {
        entity::update_channels(&self.tx, url, development, stable)
    }

    fn update_promulgated_revision(&self, url: &CharmUrl, revision: u32) -> Result<()> {
        entity::update_promulgated_revision(&self.tx, url, revision)
    }

    fn max_promulgated_revision(&self, name: &str, series: &str) -> Result<Option<u32>> {
        entity::max_promulgated_revision(&self.tx, name, series)
    }

    fn create_base_entity(&self, base: &BaseEntityRecord) -> Result<()> {
        base_entity::create(&self.tx, base)
    }

    fn get_base_entity(&self, user: &str, name: &str) -> Result<Option<BaseEntityRecord>> {
        base_entity::get(&self.tx, user, name)
    }

    fn update_channel_acl(
        &self,
        user: &str,
        name: &str,
        channel: Channel,
        field: AclField,
        principals: &[String],
    ) -> Result<()> {
        base_entity::update_channel_acl(&self.tx, user, name, channel, field, principals)
    }

    fn update_base_public(&self, user: &str, name: &str, public: bool) -> Result<()> {
        base_entity::update_public(&self.tx, user, name, public)
    }

    fn update_base_promulgated(&self, user: &str, name: &str, promulgated: bool) -> Result<()> {
        base_entity::update_promulgated(&self.tx, user, name, promulgated)
    }

    fn unpromulgate_others(&self, name: &str, keep_user: &str) -> Result<Vec<String>> {
        base_entity::unpromulgate_others(&self.tx, name, keep_user)
    }

    fn put_blob(&self, name: &str, data: &[u8]) -> Result<()> {
        blob::put(&self.tx, name, data)
    }

    fn get_blob(&self, name: &str) -> Result<Option<Vec<u8>>> {
        blob::get(&self.tx, name)
    }
}
