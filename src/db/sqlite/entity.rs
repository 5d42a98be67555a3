use anyhow::{Context, Result};
use log::debug;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction};

use crate::charm::CharmUrl;
use crate::db::sql::{Select, Update, Value};
use crate::db::types::EntityRecord;

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS entity (
    user TEXT NOT NULL,
    series TEXT NOT NULL,
    name TEXT NOT NULL,
    revision INTEGER NOT NULL,
    promulgated_revision INTEGER DEFAULT NULL,
    development INTEGER NOT NULL,
    stable INTEGER NOT NULL,
    terms TEXT NOT NULL,
    blob_name TEXT NOT NULL,
    upload_time INTEGER NOT NULL,
    PRIMARY KEY (user, series, name, revision)
);

CREATE INDEX IF NOT EXISTS idx_entity_name ON entity(name);
CREATE INDEX IF NOT EXISTS idx_entity_promulgated ON entity(name, series, promulgated_revision);
"#;

const FIELDS: &[&str] = &[
    "user",
    "series",
    "name",
    "revision",
    "promulgated_revision",
    "development",
    "stable",
    "terms",
    "blob_name",
    "upload_time",
];

pub fn create_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_TABLE_SQL)?;
    Ok(())
}

pub fn create(tx: &Transaction, entity: &EntityRecord) -> Result<()> {
    let sql = r#"
    INSERT INTO entity (user, series, name, revision, promulgated_revision, development, stable, terms, blob_name, upload_time)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#;
    debug!("Database create_entity: {}", entity.url());
    let terms = serde_json::to_string(&entity.terms).context("encode terms")?;
    tx.execute(
        sql,
        params![
            entity.user,
            entity.series,
            entity.name,
            entity.revision,
            entity.promulgated_revision,
            entity.development,
            entity.stable,
            terms,
            entity.blob_name,
            entity.upload_time as i64,
        ],
    )?;
    Ok(())
}

pub fn list(tx: &Transaction, name: &str, user: Option<&str>) -> Result<Vec<EntityRecord>> {
    let mut select = Select::new(FIELDS, "entity");
    select.add_where("name = ?", Value::Text(name.to_string()));
    if let Some(user) = user {
        select.add_where("user = ?", Value::Text(user.to_string()));
    }
    select.add_order_by("revision DESC");
    query(tx, select)
}

pub fn list_by_names(tx: &Transaction, names: &[String]) -> Result<Vec<EntityRecord>> {
    let mut select = Select::new(FIELDS, "entity");
    let names = names.iter().map(|n| Value::Text(n.clone())).collect();
    select.add_where_in("name", names);
    select.add_order_by("revision DESC");
    query(tx, select)
}

pub fn update_channels(
    tx: &Transaction,
    url: &CharmUrl,
    development: bool,
    stable: bool,
) -> Result<()> {
    let mut update = Update::new("entity");
    update.add_field("development", Value::Bool(development));
    update.add_field("stable", Value::Bool(stable));
    add_url_where(&mut update, url);
    execute_update(tx, update, "update_entity_channels")
}

pub fn update_promulgated_revision(tx: &Transaction, url: &CharmUrl, revision: u32) -> Result<()> {
    let mut update = Update::new("entity");
    update.add_field("promulgated_revision", Value::Integer(revision as u64));
    add_url_where(&mut update, url);
    execute_update(tx, update, "update_promulgated_revision")
}

pub fn max_promulgated_revision(tx: &Transaction, name: &str, series: &str) -> Result<Option<u32>> {
    let sql = "SELECT MAX(promulgated_revision) FROM entity WHERE name = ? AND series = ?";
    debug!("Database max_promulgated_revision: {sql}, {name}, {series}");
    let mut stmt = tx.prepare(sql)?;
    let max: Option<u32> = stmt.query_row(params![name, series], |row| row.get(0))?;
    Ok(max)
}

fn add_url_where(update: &mut Update, url: &CharmUrl) {
    update.add_where(
        "user = ?",
        Value::Text(url.user.clone().unwrap_or_default()),
    );
    update.add_where(
        "series = ?",
        Value::Text(url.series.clone().unwrap_or_default()),
    );
    update.add_where("name = ?", Value::Text(url.name.clone()));
    update.add_where(
        "revision = ?",
        Value::Integer(url.revision.unwrap_or_default() as u64),
    );
}

fn execute_update(tx: &Transaction, update: Update, op: &str) -> Result<()> {
    let (sql, values) = update.build();
    debug!("Database {op}: {sql}, {values:?}");
    tx.execute(&sql, params_from_iter(values.iter()))?;
    Ok(())
}

fn query(tx: &Transaction, select: Select) -> Result<Vec<EntityRecord>> {
    let (sql, values) = select.build();
    debug!("Database list_entities: {sql}, {values:?}");

    let mut stmt = tx.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), parse_row)?;

    let mut entities = Vec::new();
    for row in rows {
        let (mut entity, terms) = row?;
        entity.terms = serde_json::from_str(&terms).context("decode entity terms")?;
        entities.push(entity);
    }
    Ok(entities)
}

fn parse_row(row: &Row) -> rusqlite::Result<(EntityRecord, String)> {
    let entity = EntityRecord {
        user: row.get(0)?,
        series: row.get(1)?,
        name: row.get(2)?,
        revision: row.get(3)?,
        promulgated_revision: row.get(4)?,
        development: row.get(5)?,
        stable: row.get(6)?,
        terms: Vec::new(),
        blob_name: row.get(8)?,
        upload_time: row.get::<_, i64>(9)? as u64,
    };
    let terms: String = row.get(7)?;
    Ok((entity, terms))
}
