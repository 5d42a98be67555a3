use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::charm::Channel;
use crate::db::types::{Acl, AclField, BaseEntityRecord};

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS base_entity (
    user TEXT NOT NULL,
    name TEXT NOT NULL,
    promulgated INTEGER NOT NULL,
    public INTEGER NOT NULL,
    PRIMARY KEY (user, name)
);

CREATE TABLE IF NOT EXISTS channel_acl (
    user TEXT NOT NULL,
    name TEXT NOT NULL,
    channel TEXT NOT NULL,
    read TEXT NOT NULL,
    write TEXT NOT NULL,
    PRIMARY KEY (user, name, channel)
);

CREATE INDEX IF NOT EXISTS idx_base_entity_name ON base_entity(name);
"#;

pub fn create_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_TABLE_SQL)?;
    Ok(())
}

pub fn create(tx: &Transaction, base: &BaseEntityRecord) -> Result<()> {
    let sql = "INSERT INTO base_entity (user, name, promulgated, public) VALUES (?, ?, ?, ?)";
    debug!("Database create_base_entity: {sql}, {}/{}", base.user, base.name);
    tx.execute(
        sql,
        params![base.user, base.name, base.promulgated, base.public],
    )?;

    let sql = "INSERT INTO channel_acl (user, name, channel, read, write) VALUES (?, ?, ?, ?, ?)";
    for channel in Channel::ALL {
        let acl = base.acl(channel);
        let read = serde_json::to_string(&acl.read).context("encode read acl")?;
        let write = serde_json::to_string(&acl.write).context("encode write acl")?;
        tx.execute(
            sql,
            params![base.user, base.name, channel.as_str(), read, write],
        )?;
    }
    Ok(())
}

pub fn get(tx: &Transaction, user: &str, name: &str) -> Result<Option<BaseEntityRecord>> {
    let sql = "SELECT promulgated, public FROM base_entity WHERE user = ? AND name = ?";
    debug!("Database get_base_entity: {sql}, {user}, {name}");
    let flags: Option<(bool, bool)> = tx
        .query_row(sql, params![user, name], |row| Ok((row.get(0)?, row.get(1)?)))
        .optional()?;
    let (promulgated, public) = match flags {
        Some(flags) => flags,
        None => return Ok(None),
    };

    let sql = "SELECT channel, read, write FROM channel_acl WHERE user = ? AND name = ?";
    let mut stmt = tx.prepare(sql)?;
    let rows = stmt.query_map(params![user, name], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut channel_acls = BTreeMap::new();
    for row in rows {
        let (channel, read, write) = row?;
        let channel: Channel = channel
            .parse()
            .with_context(|| format!("invalid stored channel for ~{user}/{name}"))?;
        let acl = Acl {
            read: serde_json::from_str(&read).context("decode read acl")?,
            write: serde_json::from_str(&write).context("decode write acl")?,
        };
        channel_acls.insert(channel, acl);
    }

    Ok(Some(BaseEntityRecord {
        user: user.to_string(),
        name: name.to_string(),
        promulgated,
        public,
        channel_acls,
    }))
}

/// Replaces one list of one channel. Other channels' rows are not touched.
pub fn update_channel_acl(
    tx: &Transaction,
    user: &str,
    name: &str,
    channel: Channel,
    field: AclField,
    principals: &[String],
) -> Result<()> {
    let sql = format!(
        "UPDATE channel_acl SET {} = ? WHERE user = ? AND name = ? AND channel = ?",
        field.column()
    );
    let value = serde_json::to_string(principals).context("encode acl")?;
    debug!("Database update_channel_acl: {sql}, {value}, {user}, {name}, {channel}");
    let count = tx.execute(&sql, params![value, user, name, channel.as_str()])?;
    if count == 0 {
        bail!("no acl row for ~{user}/{name} channel {channel}");
    }
    Ok(())
}

pub fn update_public(tx: &Transaction, user: &str, name: &str, public: bool) -> Result<()> {
    let sql = "UPDATE base_entity SET public = ? WHERE user = ? AND name = ?";
    debug!("Database update_base_public: {sql}, {public}, {user}, {name}");
    tx.execute(sql, params![public, user, name])?;
    Ok(())
}

pub fn update_promulgated(tx: &Transaction, user: &str, name: &str, promulgated: bool) -> Result<()> {
    let sql = "UPDATE base_entity SET promulgated = ? WHERE user = ? AND name = ?";
    debug!("Database update_base_promulgated: {sql}, {promulgated}, {user}, {name}");
    tx.execute(sql, params![promulgated, user, name])?;
    Ok(())
}

/// Clears the promulgated flag of every base entity named `name` except
/// `~keep_user/name`, returning the affected owners.
pub fn unpromulgate_others(tx: &Transaction, name: &str, keep_user: &str) -> Result<Vec<String>> {
    let sql = "SELECT user FROM base_entity WHERE name = ? AND user != ? AND promulgated = 1";
    let mut stmt = tx.prepare(sql)?;
    let users = stmt
        .query_map(params![name, keep_user], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let sql = "UPDATE base_entity SET promulgated = 0 WHERE name = ? AND user != ?";
    debug!("Database unpromulgate_others: {sql}, {name}, {keep_user}");
    tx.execute(sql, params![name, keep_user])?;
    Ok(users)
}
