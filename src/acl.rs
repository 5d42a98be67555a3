use std::collections::BTreeMap;

use log::info;

use crate::charm::Channel;
use crate::db::types::{Acl, AclField, BaseEntityRecord, EVERYONE};
use crate::db::Transaction;
use crate::errors::{Error, Result};
use crate::resolve::ResolvedUrl;

pub fn get_base_entity(tx: &dyn Transaction, user: &str, name: &str) -> Result<BaseEntityRecord> {
    match tx.get_base_entity(user, name)? {
        Some(base) => Ok(base),
        None => Err(Error::NotFound(format!("base entity ~{user}/{name} not found"))),
    }
}

/// The ACL governing `id`: the one of the channel it was resolved in.
pub fn effective_acl(tx: &dyn Transaction, id: &ResolvedUrl) -> Result<Acl> {
    let base = get_base_entity(tx, id.user(), id.name())?;
    Ok(base.acl(id.channel))
}

/// Replaces `field` of `channel`'s ACL. Writing the stable read list also
/// recomputes the base entity's `public` flag.
pub fn set_acl(
    tx: &dyn Transaction,
    id: &ResolvedUrl,
    channel: Channel,
    field: AclField,
    principals: &[String],
) -> Result<()> {
    get_base_entity(tx, id.user(), id.name())?;
    tx.update_channel_acl(id.user(), id.name(), channel, field, principals)?;
    if field == AclField::Read && channel == Channel::Stable {
        let public = principals.iter().any(|p| p == EVERYONE);
        tx.update_base_public(id.user(), id.name(), public)?;
    }
    Ok(())
}

/// Sets or clears promulgation of `id`'s base entity.
///
/// Promulgating takes the canonical name away from every other owner,
/// assigns fresh promulgated revisions to the newest revision of each series
/// and leaves only `promulgators` able to write to the resolved channel.
pub fn promulgate(tx: &dyn Transaction, id: &ResolvedUrl, promulgate: bool, promulgators: &str) -> Result<()> {
    let base = get_base_entity(tx, id.user(), id.name())?;
    if !promulgate {
        tx.update_base_promulgated(id.user(), id.name(), false)?;
        return Ok(());
    }

    let others = tx.unpromulgate_others(id.name(), id.user())?;
    if !others.is_empty() {
        info!("Unpromulgated {:?} for {}", others, id.name());
    }
    if !base.promulgated {
        tx.update_base_promulgated(id.user(), id.name(), true)?;
    }

    let mut newest = BTreeMap::new();
    for entity in tx.list_entities(id.name(), Some(id.user()))? {
        let cur = newest.entry(entity.series.clone()).or_insert_with(|| entity.clone());
        if entity.revision > cur.revision {
            *cur = entity;
        }
    }
    for (series, entity) in newest {
        if entity.promulgated_revision.is_some() {
            continue;
        }
        let next = match tx.max_promulgated_revision(id.name(), &series)? {
            Some(rev) => rev + 1,
            None => 0,
        };
        tx.update_promulgated_revision(&entity.url(), next)?;
    }

    tx.update_channel_acl(
        id.user(),
        id.name(),
        id.channel,
        AclField::Write,
        &[promulgators.to_string()],
    )?;
    Ok(())
}

/// Publishes the resolved revision to `channels`.
pub fn publish(tx: &dyn Transaction, id: &ResolvedUrl, channels: &[Channel]) -> Result<()> {
    if channels.is_empty() {
        return Err(Error::BadRequest(String::from("no channels provided")));
    }
    let mut development = id.entity.development;
    let mut stable = id.entity.stable;
    for channel in channels {
        match channel {
            Channel::Development => development = true,
            Channel::Stable => stable = true,
            Channel::Unpublished => {
                return Err(Error::BadRequest(String::from(
                    "cannot publish to the unpublished channel",
                )))
            }
        }
    }
    tx.update_entity_channels(&id.url, development, stable)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::charm::CharmUrl;
    use crate::db::types::EntityRecord;
    use crate::db::Database;
    use crate::resolve::resolve;

    use super::*;

    fn setup() -> Database {
        let db = Database::new_test();
        db.with_transaction(|tx| {
            for (user, series, rev) in [
                ("bob", "trusty", 0),
                ("bob", "trusty", 1),
                ("bob", "xenial", 0),
                ("alice", "trusty", 5),
            ] {
                tx.create_entity(&EntityRecord {
                    user: user.to_string(),
                    series: series.to_string(),
                    name: String::from("wordpress"),
                    revision: rev,
                    ..Default::default()
                })?;
            }
            tx.create_base_entity(&BaseEntityRecord::new("bob", "wordpress"))?;
            let mut alice = BaseEntityRecord::new("alice", "wordpress");
            alice.promulgated = true;
            tx.create_base_entity(&alice)?;
            tx.update_promulgated_revision(
                &CharmUrl::new(Some("alice"), Some("trusty"), "wordpress", Some(5)),
                3,
            )?;
            Ok(())
        })
        .unwrap();
        db
    }

    fn resolved(db: &Database, s: &str) -> ResolvedUrl {
        let url: CharmUrl = s.parse().unwrap();
        db.execute(|tx| resolve(tx, &url, None)).unwrap()
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_effective_acl() {
        let db = setup();
        let id = resolved(&db, "~bob/trusty/wordpress");
        assert_eq!(id.channel, Channel::Unpublished);

        db.execute(|tx| {
            set_acl(tx, &id, Channel::Stable, AclField::Read, &strings(&["everyone"]))?;
            set_acl(tx, &id, Channel::Unpublished, AclField::Read, &strings(&["alice"]))
        })
        .unwrap();

        // The stable ACL does not apply until the entity is in stable.
        let acl = db.execute(|tx| effective_acl(tx, &id)).unwrap();
        assert_eq!(acl.read, strings(&["alice"]));

        db.execute(|tx| publish(tx, &id, &[Channel::Stable])).unwrap();
        let id = resolved(&db, "~bob/trusty/wordpress");
        assert_eq!(id.channel, Channel::Stable);
        let acl = db.execute(|tx| effective_acl(tx, &id)).unwrap();
        assert_eq!(acl.read, strings(&["everyone"]));

        let mut missing = id.clone();
        missing.entity.user = String::from("carol");
        let err = db.execute(|tx| effective_acl(tx, &missing)).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_set_acl_public_flag() {
        let db = setup();
        let id = resolved(&db, "~bob/trusty/wordpress");
        let base = |db: &Database| {
            db.execute(|tx| get_base_entity(tx, "bob", "wordpress"))
                .unwrap()
        };

        db.execute(|tx| set_acl(tx, &id, Channel::Development, AclField::Read, &strings(&["everyone"])))
            .unwrap();
        assert!(!base(&db).public);

        db.execute(|tx| set_acl(tx, &id, Channel::Stable, AclField::Write, &strings(&["everyone"])))
            .unwrap();
        assert!(!base(&db).public);

        db.execute(|tx| set_acl(tx, &id, Channel::Stable, AclField::Read, &strings(&["bob", "everyone"])))
            .unwrap();
        assert!(base(&db).public);

        db.execute(|tx| set_acl(tx, &id, Channel::Stable, AclField::Read, &strings(&["bob"])))
            .unwrap();
        let after = base(&db);
        assert!(!after.public);
        assert_eq!(after.acl(Channel::Development).read, strings(&["everyone"]));
        assert_eq!(after.acl(Channel::Unpublished).read, strings(&["bob"]));
    }

    #[test]
    fn test_promulgate() {
        let db = setup();
        let id = resolved(&db, "~bob/trusty/wordpress");

        db.execute(|tx| {
            set_acl(tx, &id, Channel::Unpublished, AclField::Write, &strings(&["bob", "carol"]))
        })
        .unwrap();
        db.execute(|tx| promulgate(tx, &id, true, "charmers")).unwrap();

        let (bob, alice) = db
            .execute(|tx| {
                Ok((
                    get_base_entity(tx, "bob", "wordpress")?,
                    get_base_entity(tx, "alice", "wordpress")?,
                ))
            })
            .unwrap();
        assert!(bob.promulgated);
        assert!(!alice.promulgated);
        assert_eq!(bob.acl(Channel::Unpublished).write, strings(&["charmers"]));
        assert_eq!(bob.acl(Channel::Stable).write, strings(&["bob"]));

        // Newest revision per series got the next promulgated revision.
        let r = resolved(&db, "trusty/wordpress-4");
        assert_eq!(r.url.to_string(), "cs:~bob/trusty/wordpress-1");
        let r = resolved(&db, "xenial/wordpress-0");
        assert_eq!(r.url.to_string(), "cs:~bob/xenial/wordpress-0");

        // Promulgating again changes nothing but the write ACL.
        db.execute(|tx| promulgate(tx, &id, true, "charmers")).unwrap();
        let r = resolved(&db, "trusty/wordpress");
        assert_eq!(r.promulgated_revision, Some(4));

        db.execute(|tx| promulgate(tx, &id, false, "charmers")).unwrap();
        let bob = db
            .execute(|tx| get_base_entity(tx, "bob", "wordpress"))
            .unwrap();
        assert!(!bob.promulgated);
    }

    #[test]
    fn test_publish() {
        let db = setup();
        let id = resolved(&db, "~bob/xenial/wordpress");
        let err = db.execute(|tx| publish(tx, &id, &[])).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
        let err = db
            .execute(|tx| publish(tx, &id, &[Channel::Unpublished]))
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));

        db.execute(|tx| publish(tx, &id, &[Channel::Development]))
            .unwrap();
        let id = resolved(&db, "~bob/xenial/wordpress");
        assert_eq!(id.channel, Channel::Development);
        assert!(!id.entity.stable);
    }
}
