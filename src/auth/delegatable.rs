use actix_web::HttpRequest;
use chrono::Utc;
use macaroon::Macaroon;

use crate::bakery::checkers;
use crate::db::Database;
use crate::errors::{Error, Result};
use crate::resolve::ResolvedUrl;

use super::{Authorization, Authorizer, OP_GET_WITH_TERMS, USERNAME_ATTR};

impl Authorizer {
    /// Mints a short-lived macaroon declaring the caller, for handing to
    /// other tools. Without entities it can never fetch archives gated by
    /// terms; with entities it is valid for exactly those, once the caller
    /// passed the terms gate for all of them.
    pub async fn delegatable_macaroon(
        &self,
        req: &HttpRequest,
        db: &Database,
        entities: &[ResolvedUrl],
    ) -> Result<Macaroon> {
        let auth = if entities.is_empty() {
            self.authenticate(req)?
        } else {
            let auth = self.authorize_entities_and_terms(req, db, entities).await?;
            if auth.is_anonymous() {
                self.authenticate(req)?
            } else {
                auth
            }
        };
        let username = delegating_user(&auth)?;

        let mut caveats = vec![
            checkers::declared(USERNAME_ATTR, username),
            checkers::time_before(Utc::now() + self.cfg.delegatable_expiry),
        ];
        if entities.is_empty() {
            caveats.push(checkers::deny(&[OP_GET_WITH_TERMS]));
        } else {
            let ids: Vec<String> = entities.iter().map(|e| e.url.to_string()).collect();
            caveats.push(checkers::is_entity(&ids));
        }
        Ok(self.bakery.new_macaroon(&caveats)?)
    }
}

fn delegating_user(auth: &Authorization) -> Result<&str> {
    if auth.admin {
        return Err(Error::Forbidden(String::from(
            "delegatable macaroon is not obtainable using admin credentials",
        )));
    }
    if auth.username.is_empty() {
        return Err(Error::Unauthorized(String::from("no username declared")));
    }
    Ok(&auth.username)
}
