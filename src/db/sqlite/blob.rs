use anyhow::Result;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS blob (
    name TEXT PRIMARY KEY NOT NULL,
    data BLOB NOT NULL
);
"#;

pub fn create_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_TABLE_SQL)?;
    Ok(())
}

pub fn put(tx: &Transaction, name: &str, data: &[u8]) -> Result<()> {
    let sql = "INSERT OR REPLACE INTO blob (name, data) VALUES (?, ?)";
    debug!("Database put_blob: {name}, size {}", data.len());
    tx.execute(sql, params![name, data])?;
    Ok(())
}

pub fn get(tx: &Transaction, name: &str) -> Result<Option<Vec<u8>>> {
    let sql = "SELECT data FROM blob WHERE name = ?";
    debug!("Database get_blob: {name}");
    let data = tx
        .query_row(sql, params![name], |row| row.get(0))
        .optional()?;
    Ok(data)
}
