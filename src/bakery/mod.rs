pub mod checkers;
pub mod cookie;
pub mod thirdparty;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::debug;
use macaroon::{ByteString, Format, Macaroon, MacaroonKey, Verifier};

use crate::code::random_string;
use crate::errors::Error;

use checkers::{CheckContext, Declared};
use thirdparty::ThirdPartyLocator;

pub use thirdparty::{discharge_all, Discharger, StaticLocator};

#[derive(Debug, Clone, PartialEq)]
pub enum Caveat {
    FirstParty(String),
    ThirdParty { location: String, condition: String },
}

impl Caveat {
    pub fn first_party(condition: impl Into<String>) -> Self {
        Self::FirstParty(condition.into())
    }

    pub fn third_party(location: &str, condition: impl Into<String>) -> Self {
        Self::ThirdParty {
            location: location.to_string(),
            condition: condition.into(),
        }
    }
}

/// Mints macaroons under the store's root key and verifies the macaroon
/// sets presented back by clients.
pub struct Bakery {
    location: String,
    root_key: MacaroonKey,
    locator: Arc<dyn ThirdPartyLocator>,
}

impl Bakery {
    const ID_LENGTH: usize = 24;

    pub fn new(location: &str, root_key: &[u8], locator: Arc<dyn ThirdPartyLocator>) -> Self {
        Self {
            location: location.to_string(),
            root_key: MacaroonKey::generate(root_key),
            locator,
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn new_macaroon(&self, caveats: &[Caveat]) -> Result<Macaroon> {
        let id = ByteString(random_string(Self::ID_LENGTH).into_bytes());
        let mut m = match Macaroon::create(Some(self.location.clone()), &self.root_key, id) {
            Ok(m) => m,
            Err(err) => bail!("create macaroon: {err:?}"),
        };
        for caveat in caveats {
            match caveat {
                Caveat::FirstParty(cond) => {
                    m.add_first_party_caveat(ByteString(cond.as_bytes().to_vec()))
                }
                Caveat::ThirdParty {
                    location,
                    condition,
                } => {
                    let Some(public_key) = self.locator.public_key(location) else {
                        bail!("no public key found for third party {location:?}");
                    };
                    let root_key = thirdparty::generate_caveat_root_key();
                    let id = thirdparty::encrypt_caveat_id(public_key, &root_key, condition)
                        .with_context(|| format!("add third party caveat for {location:?}"))?;
                    m.add_third_party_caveat(
                        location,
                        &MacaroonKey::generate(&root_key),
                        ByteString(id.into_bytes()),
                    );
                }
            }
        }
        Ok(m)
    }

    pub fn serialize(m: &Macaroon) -> Result<String> {
        match m.serialize(Format::V2) {
            Ok(s) => Ok(s),
            Err(err) => bail!("serialize macaroon: {err:?}"),
        }
    }

    /// Verifies the candidate macaroon sets in order and returns the
    /// declarations of the first set that passes. Every failure is an
    /// `Error::Verification`.
    pub fn check(&self, sets: &[Vec<Macaroon>], ctx: &CheckContext) -> Result<Declared, Error> {
        let mut last_err = String::from("no macaroons");
        for set in sets {
            match self.check_set(set, ctx) {
                Ok(declared) => return Ok(declared),
                Err(err) => {
                    debug!("Macaroon set rejected: {err}");
                    last_err = err;
                }
            }
        }
        Err(Error::Verification(last_err))
    }

    fn check_set(&self, set: &[Macaroon], ctx: &CheckContext) -> std::result::Result<Declared, String> {
        let Some((primary, discharges)) = set.split_first() else {
            return Err(String::from("no macaroons"));
        };

        let mut conditions = Vec::new();
        for m in set {
            for caveat in m.first_party_caveats() {
                let macaroon::Caveat::FirstParty(fp) = caveat else {
                    continue;
                };
                let predicate = fp.predicate();
                match String::from_utf8(predicate.0.clone()) {
                    Ok(cond) => conditions.push(cond),
                    Err(_) => return Err(String::from("caveat is not valid UTF-8")),
                }
            }
        }

        let declared = checkers::infer_declared(conditions.iter().map(String::as_str));
        for cond in conditions.iter() {
            if let Err(err) = checkers::check_condition(cond, ctx, &declared) {
                return Err(format!("caveat {cond:?} not satisfied: {err}"));
            }
        }

        let mut verifier = Verifier::default();
        for cond in conditions {
            verifier.satisfy_exact(ByteString(cond.into_bytes()));
        }
        if let Err(err) = verifier.verify(primary, &self.root_key, discharges.to_vec()) {
            return Err(format!("{err:?}"));
        }
        Ok(declared)
    }
}
