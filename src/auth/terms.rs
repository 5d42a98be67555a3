use std::collections::BTreeSet;

use actix_web::HttpRequest;
use log::debug;

use crate::acl;
use crate::bakery::{checkers, Caveat};
use crate::db::types::EVERYONE;
use crate::db::Database;
use crate::errors::{Error, Result};
use crate::resolve::ResolvedUrl;

use super::{Authorization, Authorizer, OP_GET_WITH_TERMS, OP_OTHER};

pub const COND_HAS_AGREED: &str = "has-agreed";

/// Union of the terms required by `entities`, deduplicated and sorted.
pub fn required_terms(entities: &[ResolvedUrl]) -> Vec<String> {
    let terms: BTreeSet<&String> = entities.iter().flat_map(|e| e.entity.terms.iter()).collect();
    terms.into_iter().cloned().collect()
}

impl Authorizer {
    /// Authorizes reading every one of `entities`. When any of them requires
    /// terms, access additionally needs a discharge from the terms service
    /// proving the user agreed to all of them.
    pub async fn authorize_entities_and_terms(
        &self,
        req: &HttpRequest,
        db: &Database,
        entities: &[ResolvedUrl],
    ) -> Result<Authorization> {
        let acls = db.session()?.execute(|tx| {
            let mut acls = Vec::with_capacity(entities.len());
            for entity in entities {
                let acl = acl::effective_acl(tx, entity)
                    .map_err(|e| e.mask(format!("cannot get ACL for {}", entity.url)))?;
                acls.push(acl.read);
            }
            Ok(acls)
        })?;
        let terms = required_terms(entities);

        let public = acls.iter().all(|acl| acl.iter().any(|p| p == EVERYONE));
        if public && terms.is_empty() {
            return Ok(Authorization::default());
        }

        let terms_location = match self.cfg.terms_location {
            Some(ref location) => location.as_str(),
            None if !terms.is_empty() => {
                return Err(Error::Unauthorized(String::from(
                    "charmstore not configured to serve charms with terms and conditions",
                )))
            }
            None => "",
        };

        let operation = if terms.is_empty() {
            OP_OTHER
        } else {
            OP_GET_WITH_TERMS
        };
        let auth = match self.check_request(req, entities, operation, &terms) {
            Ok(auth) => auth,
            Err(Error::Verification(msg)) => {
                debug!("Macaroon verification failed for {operation}, minting new one: {msg}");
                if terms.is_empty() {
                    return Err(self.discharge_required(true, Vec::new()));
                }
                let caveats = vec![
                    Caveat::third_party(
                        terms_location,
                        format!("{COND_HAS_AGREED} {}", terms.join(" ")),
                    ),
                    checkers::agreed_terms(&terms),
                ];
                return Err(self.discharge_required(false, caveats));
            }
            Err(err) => return Err(err),
        };

        for acl in acls.iter() {
            self.check_acl_membership(&auth, acl).await?;
        }
        Ok(auth)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use actix_web::test::TestRequest;
    use anyhow::bail;
    use macaroon::Macaroon;

    use crate::bakery::discharge_all;
    use crate::charm::{Channel, CharmUrl};
    use crate::db::types::{AclField, BaseEntityRecord, EntityRecord};
    use crate::resolve::resolve;

    use super::super::tests::{minted, with_macaroons, TestAuthorizer};
    use super::*;

    fn setup() -> Database {
        let db = Database::new_test();
        let terms = HashMap::from([
            ("wordpress", vec!["bob/terms/1"]),
            ("mysql", vec![]),
            ("haproxy", vec!["bob/terms/1", "canonical/eula"]),
            ("secret", vec![]),
        ]);
        db.with_transaction(|tx| {
            for (name, terms) in terms.iter() {
                tx.create_entity(&EntityRecord {
                    user: String::from("bob"),
                    series: String::from("trusty"),
                    name: name.to_string(),
                    revision: 0,
                    terms: terms.iter().map(|t| t.to_string()).collect(),
                    ..Default::default()
                })?;
                tx.create_base_entity(&BaseEntityRecord::new("bob", name))?;
                if *name != "secret" {
                    tx.update_channel_acl(
                        "bob",
                        name,
                        Channel::Unpublished,
                        AclField::Read,
                        &[String::from("everyone")],
                    )?;
                }
            }
            Ok(())
        })
        .unwrap();
        db
    }

    fn resolved(db: &Database, names: &[&str]) -> Vec<ResolvedUrl> {
        names
            .iter()
            .map(|name| {
                let url = CharmUrl::new(Some("bob"), None, name, None);
                db.execute(|tx| resolve(tx, &url, None)).unwrap()
            })
            .collect()
    }

    /// Discharges every third-party caveat: the identity service declares
    /// `username`, the terms service agrees to what it is asked.
    fn discharge(t: &TestAuthorizer, m: &Macaroon, username: &str, agreed: &[&str]) -> Vec<Macaroon> {
        discharge_all(m, |location, id| {
            if location == t.identity.location() {
                return t
                    .identity
                    .discharge(id, |_| Ok(vec![format!("declared username {username}")]));
            }
            t.terms.discharge(id, |cond| {
                let Some(terms) = cond.strip_prefix("has-agreed ") else {
                    bail!("unexpected condition {cond:?}");
                };
                if terms.split(' ').any(|t| !agreed.contains(&t)) {
                    bail!("terms not agreed");
                }
                Ok(Vec::new())
            })
        })
        .unwrap()
    }

    fn terms_condition(t: &TestAuthorizer, m: &Macaroon) -> Option<String> {
        for caveat in m.third_party_caveats() {
            let macaroon::Caveat::ThirdParty(tp) = caveat else {
                continue;
            };
            if tp.location() == crate::bakery::tests::TERMS_LOCATION {
                let mut cond = None;
                t.terms
                    .discharge(&tp.id().0, |c| {
                        cond = Some(c.to_string());
                        Ok(Vec::new())
                    })
                    .unwrap();
                return cond;
            }
        }
        None
    }

    #[actix_web::test]
    async fn test_public_without_terms() {
        let t = TestAuthorizer::new();
        let db = setup();
        let entities = resolved(&db, &["mysql"]);
        let req = TestRequest::default().to_http_request();
        let auth = t
            .authorizer
            .authorize_entities_and_terms(&req, &db, &entities)
            .await
            .unwrap();
        assert!(auth.is_anonymous());
    }

    #[actix_web::test]
    async fn test_public_with_terms_needs_agreement() {
        let t = TestAuthorizer::new();
        let db = setup();
        let entities = resolved(&db, &["wordpress", "mysql"]);

        let req = TestRequest::default().to_http_request();
        let err = t
            .authorizer
            .authorize_entities_and_terms(&req, &db, &entities)
            .await
            .unwrap_err();
        let m = minted(err);
        assert_eq!(terms_condition(&t, &m).unwrap(), "has-agreed bob/terms/1");

        // Discharged and agreed.
        let ms = discharge(&t, &m, "alice", &["bob/terms/1"]);
        let req = with_macaroons(&ms).to_http_request();
        let auth = t
            .authorizer
            .authorize_entities_and_terms(&req, &db, &entities)
            .await
            .unwrap();
        assert_eq!(auth.username, "alice");

        // The agreement does not extend to terms it did not cover.
        let more = resolved(&db, &["haproxy"]);
        let err = t
            .authorizer
            .authorize_entities_and_terms(&req, &db, &more)
            .await
            .unwrap_err();
        let m = minted(err);
        assert_eq!(
            terms_condition(&t, &m).unwrap(),
            "has-agreed bob/terms/1 canonical/eula"
        );
    }

    #[actix_web::test]
    async fn test_plain_macaroon_cannot_bypass_terms() {
        let t = TestAuthorizer::new();
        let db = setup();
        let entities = resolved(&db, &["wordpress"]);

        let m = t.authorizer.new_macaroon(true, Vec::new()).unwrap();
        let ms = discharge(&t, &m, "alice", &[]);
        let req = with_macaroons(&ms).to_http_request();
        let err = t
            .authorizer
            .authorize_entities_and_terms(&req, &db, &entities)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DischargeRequired { .. }));

        // The plain path never looks at terms.
        let auth = t
            .authorizer
            .authorize(&req, &[String::from("alice")], false, Some(&entities[0]))
            .await
            .unwrap();
        assert_eq!(auth.username, "alice");
    }

    #[actix_web::test]
    async fn test_all_acls_must_pass() {
        let t = TestAuthorizer::new();
        let db = setup();
        let entities = resolved(&db, &["mysql", "secret"]);

        let req = TestRequest::default().to_http_request();
        let err = t
            .authorizer
            .authorize_entities_and_terms(&req, &db, &entities)
            .await
            .unwrap_err();
        let m = minted(err);
        assert!(terms_condition(&t, &m).is_none());

        let req = with_macaroons(&discharge(&t, &m, "alice", &[])).to_http_request();
        let err = t
            .authorizer
            .authorize_entities_and_terms(&req, &db, &entities)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "access denied for user alice");

        let req = with_macaroons(&discharge(&t, &m, "bob", &[])).to_http_request();
        let auth = t
            .authorizer
            .authorize_entities_and_terms(&req, &db, &entities)
            .await
            .unwrap();
        assert_eq!(auth.username, "bob");
    }

    #[actix_web::test]
    async fn test_terms_not_configured() {
        let mut t = TestAuthorizer::new();
        t.authorizer.cfg.terms_location = None;
        let db = setup();

        let req = TestRequest::default().to_http_request();
        let err = t
            .authorizer
            .authorize_entities_and_terms(&req, &db, &resolved(&db, &["wordpress"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        assert!(t
            .authorizer
            .authorize_entities_and_terms(&req, &db, &resolved(&db, &["mysql"]))
            .await
            .is_ok());
    }

    #[test]
    fn test_required_terms() {
        let db = setup();
        let entities = resolved(&db, &["haproxy", "wordpress", "mysql"]);
        assert_eq!(
            required_terms(&entities),
            vec![String::from("bob/terms/1"), String::from("canonical/eula")]
        );
    }
}
