pub mod basic;
pub mod delegatable;
pub mod groups;
pub mod terms;

use std::sync::Arc;

use actix_web::HttpRequest;
use chrono::{Duration, Utc};
use log::{debug, error, warn};
use macaroon::Macaroon;

use crate::bakery::checkers::{self, CheckContext};
use crate::bakery::{cookie, Bakery, Caveat};
use crate::db::types::EVERYONE;
use crate::errors::{Error, Result};
use crate::resolve::ResolvedUrl;

use basic::BasicCredentials;
use groups::{GroupError, GroupResolver};

/// Operation tag for everything except archive access gated by terms.
pub const OP_OTHER: &str = "other";

/// Operation tag for fetching an archive of an entity that requires terms.
pub const OP_GET_WITH_TERMS: &str = "op-get-with-terms";

pub const USERNAME_ATTR: &str = "username";

pub const IS_AUTHENTICATED_USER: &str = "is-authenticated-user";

/// Who the request was authorized as. The zero value carries no privilege
/// and is what anonymous access to public resources yields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Authorization {
    pub admin: bool,
    pub username: String,
}

impl Authorization {
    pub fn admin(username: &str) -> Self {
        Self {
            admin: true,
            username: username.to_string(),
        }
    }

    pub fn user(username: &str) -> Self {
        Self {
            admin: false,
            username: username.to_string(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        !self.admin && self.username.is_empty()
    }
}

pub struct AuthConfig {
    /// Superuser credentials; `None` disables basic auth.
    pub basic: Option<BasicCredentials>,
    pub identity_location: String,
    pub terms_location: Option<String>,
    pub macaroon_expiry: Duration,
    pub delegatable_expiry: Duration,
}

pub struct Authorizer {
    bakery: Bakery,
    groups: Arc<dyn GroupResolver>,
    cfg: AuthConfig,
}

impl Authorizer {
    pub fn new(bakery: Bakery, groups: Arc<dyn GroupResolver>, cfg: AuthConfig) -> Self {
        Self {
            bakery,
            groups,
            cfg,
        }
    }

    pub fn bakery(&self) -> &Bakery {
        &self.bakery
    }

    pub fn groups(&self) -> &dyn GroupResolver {
        self.groups.as_ref()
    }

    /// Authorizes the request against `acl`. Public ACLs are granted without
    /// looking at credentials unless `always_auth` is set.
    pub async fn authorize(
        &self,
        req: &HttpRequest,
        acl: &[String],
        always_auth: bool,
        entity: Option<&ResolvedUrl>,
    ) -> Result<Authorization> {
        if !always_auth && acl.iter().any(|p| p == EVERYONE) {
            return Ok(Authorization::default());
        }
        let entities = match entity {
            Some(entity) => std::slice::from_ref(entity),
            None => &[],
        };
        let auth = self.check_or_mint(req, entities)?;
        self.check_acl_membership(&auth, acl).await?;
        Ok(auth)
    }

    /// Determines who the request comes from, minting a macaroon to be
    /// discharged when it carries no usable credentials.
    pub fn authenticate(&self, req: &HttpRequest) -> Result<Authorization> {
        self.check_or_mint(req, &[])
    }

    fn check_or_mint(&self, req: &HttpRequest, entities: &[ResolvedUrl]) -> Result<Authorization> {
        match self.check_request(req, entities, OP_OTHER, &[]) {
            Ok(auth) => Ok(auth),
            Err(Error::Verification(msg)) => {
                debug!("Macaroon verification failed, minting new one: {msg}");
                Err(self.discharge_required(true, Vec::new()))
            }
            Err(err) => Err(err),
        }
    }

    /// Checks the credentials carried by the request for `operation` on
    /// `entities`. Basic credentials take precedence; a wrong password is
    /// final. Macaroons that do not verify yield `Error::Verification`.
    pub fn check_request(
        &self,
        req: &HttpRequest,
        entities: &[ResolvedUrl],
        operation: &str,
        terms: &[String],
    ) -> Result<Authorization> {
        if let Some(auth) = basic::auth_basic(req, self.cfg.basic.as_ref())? {
            return Ok(auth);
        }

        let sets = cookie::request_macaroons(req)?;
        let ctx = CheckContext {
            now: Utc::now(),
            operation: operation.to_string(),
            entities: entities.iter().map(ResolvedUrl::ids).collect(),
            terms: terms.to_vec(),
        };
        let declared = self.bakery.check(&sets, &ctx)?;
        let username = declared.get(USERNAME_ATTR).unwrap_or_default();
        Ok(Authorization::user(username))
    }

    /// Admins pass. Anyone else must be named in `acl` directly or through
    /// one of their groups.
    pub async fn check_acl_membership(&self, auth: &Authorization, acl: &[String]) -> Result<()> {
        if auth.admin {
            return Ok(());
        }
        let username = auth.username.as_str();
        if username.is_empty() {
            return Err(Error::Unauthorized(String::from("no username declared")));
        }
        if acl.iter().any(|p| p == EVERYONE || p == username) {
            return Ok(());
        }

        let groups = match self.groups.groups_for_user(username).await {
            Ok(groups) => groups,
            Err(err @ GroupError::InvalidResponse(_)) => {
                error!("Resolve groups for user {username}: {err}");
                return Err(Error::Internal(anyhow::Error::new(err)));
            }
            Err(err) => {
                warn!("Resolve groups for user {username}, denying access: {err}");
                Vec::new()
            }
        };
        if groups.iter().any(|g| acl.contains(g)) {
            return Ok(());
        }
        debug!("Access denied for user {username}, acl {acl:?}, groups {groups:?}");
        Err(Error::Unauthorized(format!("access denied for user {username}")))
    }

    /// Mints the macaroon a client must discharge to authenticate: it needs
    /// the identity service to declare a username and expires after the
    /// configured period.
    pub fn new_macaroon(&self, deny_terms: bool, extra: Vec<Caveat>) -> Result<Macaroon> {
        let mut caveats = vec![
            checkers::need_declared(
                &self.cfg.identity_location,
                IS_AUTHENTICATED_USER,
                &[USERNAME_ATTR],
            ),
            checkers::time_before(Utc::now() + self.cfg.macaroon_expiry),
        ];
        if deny_terms {
            caveats.push(checkers::deny(&[OP_GET_WITH_TERMS]));
        }
        caveats.extend(extra);
        Ok(self.bakery.new_macaroon(&caveats)?)
    }

    fn discharge_required(&self, deny_terms: bool, extra: Vec<Caveat>) -> Error {
        let macaroon = match self.new_macaroon(deny_terms, extra) {
            Ok(m) => m,
            Err(err) => return err.mask("cannot mint macaroon"),
        };
        match Bakery::serialize(&macaroon) {
            Ok(macaroon) => Error::DischargeRequired {
                message: String::from("verification failed"),
                macaroon,
            },
            Err(err) => Error::Internal(err.context("cannot mint macaroon")),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use actix_web::cookie::Cookie;
    use actix_web::test::TestRequest;
    use macaroon::Macaroon;

    use crate::bakery::tests::{discharge_as, new_test_parties, IDENTITY_LOCATION, TERMS_LOCATION};
    use crate::bakery::Discharger;

    use super::groups::StaticGroups;
    use super::*;

    pub struct TestAuthorizer {
        pub authorizer: Authorizer,
        pub identity: Discharger,
        pub terms: Discharger,
    }

    impl TestAuthorizer {
        pub fn new() -> Self {
            Self::with_groups(StaticGroups::new().with("carol", &["wordpress-team"]))
        }

        pub fn with_groups(groups: StaticGroups) -> Self {
            let (bakery, identity, terms) = new_test_parties();
            let cfg = AuthConfig {
                basic: Some(BasicCredentials {
                    username: String::from("admin"),
                    password: String::from("hunter2"),
                }),
                identity_location: String::from(IDENTITY_LOCATION),
                terms_location: Some(String::from(TERMS_LOCATION)),
                macaroon_expiry: Duration::hours(24),
                delegatable_expiry: Duration::minutes(1),
            };
            Self {
                authorizer: Authorizer::new(bakery, Arc::new(groups), cfg),
                identity,
                terms,
            }
        }
    }

    pub fn minted(err: Error) -> Macaroon {
        match err {
            Error::DischargeRequired { macaroon, .. } => Macaroon::deserialize(macaroon.as_str()).unwrap(),
            err => panic!("expected discharge required, got {err:?}"),
        }
    }

    pub fn with_macaroons(ms: &[Macaroon]) -> TestRequest {
        let value = cookie::encode_macaroons(ms).unwrap();
        TestRequest::default().cookie(Cookie::new("macaroon-authn", value))
    }

    fn acl(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[actix_web::test]
    async fn test_public_fast_path() {
        let t = TestAuthorizer::new();
        let req = TestRequest::default().to_http_request();
        let auth = t
            .authorizer
            .authorize(&req, &acl(&["bob", "everyone"]), false, None)
            .await
            .unwrap();
        assert_eq!(auth, Authorization::default());
        assert!(auth.is_anonymous());

        // Garbage credentials are never looked at on the fast path.
        let req = TestRequest::default()
            .cookie(Cookie::new("macaroon-authn", "garbage"))
            .to_http_request();
        assert!(t
            .authorizer
            .authorize(&req, &acl(&["everyone"]), false, None)
            .await
            .is_ok());

        let req = TestRequest::default().to_http_request();
        let err = t
            .authorizer
            .authorize(&req, &acl(&["everyone"]), true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DischargeRequired { .. }));
    }

    #[actix_web::test]
    async fn test_discharge_round_trip() {
        let t = TestAuthorizer::new();
        let read = acl(&["bob"]);

        let req = TestRequest::default().to_http_request();
        let err = t.authorizer.authorize(&req, &read, false, None).await.unwrap_err();
        assert_eq!(err.status(), actix_web::http::StatusCode::UNAUTHORIZED);
        let m = minted(err);
        assert_eq!(m.third_party_caveats().len(), 1);

        let ms = discharge_as(&t.identity, &m, "alice");
        let req = with_macaroons(&ms).to_http_request();
        let err = t.authorizer.authorize(&req, &read, false, None).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
        assert_eq!(err.to_string(), "access denied for user alice");

        let ms = discharge_as(&t.identity, &m, "bob");
        let req = with_macaroons(&ms).to_http_request();
        let auth = t.authorizer.authorize(&req, &read, false, None).await.unwrap();
        assert_eq!(auth, Authorization::user("bob"));
    }

    #[actix_web::test]
    async fn test_group_membership() {
        let t = TestAuthorizer::new();
        let m = t.authorizer.new_macaroon(true, vec![]).unwrap();
        let ms = discharge_as(&t.identity, &m, "carol");
        let req = with_macaroons(&ms).to_http_request();

        let auth = t
            .authorizer
            .authorize(&req, &acl(&["wordpress-team"]), false, None)
            .await
            .unwrap();
        assert_eq!(auth.username, "carol");

        let err = t
            .authorizer
            .authorize(&req, &acl(&["charmers"]), false, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("carol"));
    }

    #[actix_web::test]
    async fn test_basic_auth() {
        let t = TestAuthorizer::new();
        let req = TestRequest::default()
            .insert_header(("Authorization", basic::basic_header("admin", "hunter2")))
            .to_http_request();
        let auth = t
            .authorizer
            .authorize(&req, &acl(&["bob"]), false, None)
            .await
            .unwrap();
        assert!(auth.admin);

        // A wrong password is final, even with a valid macaroon attached.
        let m = t.authorizer.new_macaroon(true, vec![]).unwrap();
        let ms = discharge_as(&t.identity, &m, "bob");
        let req = with_macaroons(&ms)
            .insert_header(("Authorization", basic::basic_header("admin", "nope")))
            .to_http_request();
        let err = t
            .authorizer
            .authorize(&req, &acl(&["bob"]), false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[actix_web::test]
    async fn test_malformed_cookie() {
        let t = TestAuthorizer::new();
        let req = TestRequest::default()
            .cookie(Cookie::new("macaroon-authn", "garbage"))
            .to_http_request();
        let err = t
            .authorizer
            .authorize(&req, &acl(&["bob"]), false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[actix_web::test]
    async fn test_minted_macaroon_denies_terms() {
        let t = TestAuthorizer::new();
        let m = t.authorizer.new_macaroon(true, vec![]).unwrap();
        let ms = discharge_as(&t.identity, &m, "bob");
        let req = with_macaroons(&ms).to_http_request();

        let auth = t.authorizer.check_request(&req, &[], OP_OTHER, &[]).unwrap();
        assert_eq!(auth.username, "bob");
        let err = t
            .authorizer
            .check_request(&req, &[], OP_GET_WITH_TERMS, &[])
            .unwrap_err();
        assert!(matches!(err, Error::Verification(_)));
    }

    #[actix_web::test]
    async fn test_group_service_failure_denies() {
        struct Failing;

        #[async_trait::async_trait]
        impl GroupResolver for Failing {
            async fn groups_for_user(&self, _: &str) -> std::result::Result<Vec<String>, GroupError> {
                Err(GroupError::Unavailable(String::from("connection refused")))
            }
        }

        let mut t = TestAuthorizer::new();
        t.authorizer.groups = Arc::new(Failing);
        let auth = Authorization::user("bob");
        let err = t
            .authorizer
            .check_acl_membership(&auth, &acl(&["charmers"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
        assert!(t
            .authorizer
            .check_acl_membership(&auth, &acl(&["bob"]))
            .await
            .is_ok());

        let err = t
            .authorizer
            .check_acl_membership(&Authorization::default(), &acl(&["charmers"]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "no username declared");
    }

    #[actix_web::test]
    async fn test_group_service_invalid_response() {
        struct Garbled;

        #[async_trait::async_trait]
        impl GroupResolver for Garbled {
            async fn groups_for_user(&self, _: &str) -> std::result::Result<Vec<String>, GroupError> {
                Err(GroupError::InvalidResponse(String::from("{\"groups\": 1}")))
            }
        }

        let mut t = TestAuthorizer::new();
        t.authorizer.groups = Arc::new(Garbled);
        let err = t
            .authorizer
            .check_acl_membership(&Authorization::user("bob"), &acl(&["charmers"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert_eq!(err.status(), actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);

        // Direct membership never asks the identity service.
        assert!(t
            .authorizer
            .check_acl_membership(&Authorization::user("bob"), &acl(&["bob"]))
            .await
            .is_ok());
    }
}
