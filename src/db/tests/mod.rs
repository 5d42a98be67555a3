
use anyhow::{bail, Result};

use super::types::BaseEntityRecord;
use super::Database;

pub fn run_all_db_tests(db: &Database) {
    entity::run_entity_tests(db);
    base_entity::run_base_entity_tests(db);

    test_blob(db);
    test_rollback(db);
}

fn test_blob(db: &Database) {
    db.with_transaction(|tx| {
        assert_eq!(tx.get_blob("missing")?, None);
        tx.put_blob("wordpress-3", b"zip data")?;
        assert_eq!(tx.get_blob("wordpress-3")?, Some(b"zip data".to_vec()));
        tx.put_blob("wordpress-3", b"new data")?;
        assert_eq!(tx.get_blob("wordpress-3")?, Some(b"new data".to_vec()));
        Ok(())
    })
    .unwrap();
}

fn test_rollback(db: &Database) {
    let result: Result<()> = db.with_transaction(|tx| {
        tx.create_base_entity(&BaseEntityRecord::new("rollback", "none"))
            .unwrap();

        bail!("rollback");
    });
    assert!(result.is_err());

    db.with_transaction(|tx| {
        assert!(tx.get_base_entity("rollback", "none")?.is_none());
        Ok(())
    })
    .unwrap();
}
