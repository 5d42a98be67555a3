use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Duration;
use log::info;
use openssl::ssl::{SslAcceptor, SslAcceptorBuilder, SslMethod};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::audit::LogAuditSink;
use crate::auth::basic::BasicCredentials;
use crate::auth::groups::IdentityClient;
use crate::auth::{AuthConfig, Authorizer};
use crate::bakery::{Bakery, StaticLocator};
use crate::config::{expandenv, CommonConfig, PathSet};
use crate::db::config::DbConfig;
use crate::logs::LogsConfig;

use super::context::ServerContext;
use super::restful::RestfulServer;

/// Public key of a third party that discharges caveats for us.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ThirdPartyConfig {
    pub location: String,
    pub public_key_path: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_bind")]
    pub bind: String,

    #[serde(default)]
    pub ssl: bool,

    pub keep_alive_secs: Option<u64>,

    pub workers: Option<u64>,

    pub payload_limit_mib: Option<u64>,

    /// Location recorded in every macaroon the store mints.
    #[serde(default = "ServerConfig::default_location")]
    pub location: String,

    /// Superuser name for HTTP basic auth. Empty disables basic auth.
    #[serde(default)]
    pub auth_username: String,

    #[serde(default)]
    pub auth_password: String,

    #[serde(default = "ServerConfig::default_identity_location")]
    pub identity_location: String,

    /// Base URL of the identity service API, used to resolve groups. Empty
    /// means nobody belongs to any group.
    #[serde(default)]
    pub identity_api_url: String,

    #[serde(default)]
    pub terms_location: String,

    #[serde(default)]
    pub third_parties: Vec<ThirdPartyConfig>,

    #[serde(default = "ServerConfig::default_macaroon_expiry_secs")]
    pub macaroon_expiry_secs: u64,

    #[serde(default = "ServerConfig::default_delegatable_expiry_secs")]
    pub delegatable_expiry_secs: u64,

    #[serde(default = "ServerConfig::default_promulgators_group")]
    pub promulgators_group: String,

    #[serde(default = "ServerConfig::default_db")]
    pub db: DbConfig,

    #[serde(default = "ServerConfig::default_logs")]
    pub logs: LogsConfig,

    #[serde(skip)]
    pki_dir: PathBuf,
}

impl CommonConfig for ServerConfig {
    fn default() -> Self {
        Self {
            bind: Self::default_bind(),
            ssl: false,
            keep_alive_secs: None,
            workers: None,
            payload_limit_mib: None,
            location: Self::default_location(),
            auth_username: String::new(),
            auth_password: String::new(),
            identity_location: Self::default_identity_location(),
            identity_api_url: String::new(),
            terms_location: String::new(),
            third_parties: Vec::new(),
            macaroon_expiry_secs: Self::default_macaroon_expiry_secs(),
            delegatable_expiry_secs: Self::default_delegatable_expiry_secs(),
            promulgators_group: Self::default_promulgators_group(),
            db: Self::default_db(),
            logs: Self::default_logs(),
            pki_dir: PathBuf::new(),
        }
    }

    fn complete(&mut self, ps: &PathSet) -> Result<()> {
        if self.bind.is_empty() {
            bail!("bind is required");
        }

        if let Some(keep_alive_secs) = self.keep_alive_secs {
            if keep_alive_secs == 0 {
                bail!("keep_alive_secs must be greater than 0");
            }
        }

        if let Some(workers) = self.workers {
            if workers == 0 {
                bail!("workers must be greater than 0");
            }
        }

        if let Some(payload_limit_mib) = self.payload_limit_mib {
            if payload_limit_mib == 0 {
                bail!("payload_limit_mib must be greater than 0");
            }
        }

        if self.location.is_empty() {
            bail!("location is required");
        }

        if !self.auth_username.is_empty() && self.auth_password.is_empty() {
            bail!("auth_password is required when auth_username is set");
        }
        self.auth_password = expandenv("auth_password", &self.auth_password)?;

        if self.identity_location.is_empty() {
            bail!("identity_location is required");
        }
        self.identity_api_url = expandenv("identity_api_url", &self.identity_api_url)?;

        for tp in self.third_parties.iter_mut() {
            if tp.location.is_empty() {
                bail!("third party location is required");
            }
            let path = expandenv("public_key_path", &tp.public_key_path)?;
            tp.public_key_path = if path.is_empty() {
                bail!("public_key_path is required for third party {:?}", tp.location);
            } else if PathBuf::from(&path).is_relative() {
                ps.pki_path.join(path).to_string_lossy().into_owned()
            } else {
                path
            };
        }
        if !self.has_third_party(&self.identity_location) {
            bail!(
                "no public key configured for identity location {:?}",
                self.identity_location
            );
        }
        if !self.terms_location.is_empty() && !self.has_third_party(&self.terms_location) {
            bail!(
                "no public key configured for terms location {:?}",
                self.terms_location
            );
        }

        if self.macaroon_expiry_secs < Self::MIN_EXPIRY_SECS
            || self.macaroon_expiry_secs > Self::MAX_EXPIRY_SECS
        {
            bail!(
                "macaroon_expiry_secs must be in range [{}, {}]",
                Self::MIN_EXPIRY_SECS,
                Self::MAX_EXPIRY_SECS
            );
        }
        if self.delegatable_expiry_secs < Self::MIN_EXPIRY_SECS
            || self.delegatable_expiry_secs > self.macaroon_expiry_secs
        {
            bail!(
                "delegatable_expiry_secs must be in range [{}, macaroon_expiry_secs]",
                Self::MIN_EXPIRY_SECS
            );
        }

        if self.promulgators_group.is_empty() {
            bail!("promulgators_group is required");
        }

        self.db.complete(ps).context("db")?;
        self.logs.complete(ps).context("logs")?;

        self.pki_dir = ps.pki_path.clone();

        Ok(())
    }
}

impl ServerConfig {
    const MIN_EXPIRY_SECS: u64 = 10;
    const MAX_EXPIRY_SECS: u64 = 60 * 60 * 24 * 30;

    const ROOT_KEY_LENGTH: usize = 32;

    pub fn build_ctx(&self) -> Result<Arc<ServerContext>> {
        let db = self.db.build().context("init database")?;

        let root_key = self.read_root_key()?;
        let mut locator = StaticLocator::new();
        for tp in self.third_parties.iter() {
            let pem = fs::read(&tp.public_key_path)
                .with_context(|| format!("read public key file {}", tp.public_key_path))?;
            locator.add_pem(&tp.location, &pem)?;
        }
        let bakery = Bakery::new(&self.location, &root_key, Arc::new(locator));

        let groups =
            IdentityClient::new(&self.identity_api_url).context("init identity client")?;

        let basic = if self.auth_username.is_empty() {
            None
        } else {
            Some(BasicCredentials {
                username: self.auth_username.clone(),
                password: self.auth_password.clone(),
            })
        };
        let terms_location = if self.terms_location.is_empty() {
            None
        } else {
            Some(self.terms_location.clone())
        };
        let auth_cfg = AuthConfig {
            basic,
            identity_location: self.identity_location.clone(),
            terms_location,
            macaroon_expiry: Duration::seconds(self.macaroon_expiry_secs as i64),
            delegatable_expiry: Duration::seconds(self.delegatable_expiry_secs as i64),
        };
        let authorizer = Authorizer::new(bakery, Arc::new(groups), auth_cfg);

        let ctx = ServerContext::new(
            db,
            authorizer,
            Box::new(LogAuditSink),
            &self.promulgators_group,
        );
        Ok(Arc::new(ctx))
    }

    pub fn build_restful_server(&self, ctx: Arc<ServerContext>) -> Result<RestfulServer> {
        let mut srv = RestfulServer::new(self.bind.clone(), ctx);
        if self.ssl {
            let ssl = self.build_ssl()?;
            srv.set_ssl(ssl);
        }

        if let Some(keep_alive_secs) = self.keep_alive_secs {
            srv.set_keep_alive_secs(keep_alive_secs);
        }

        if let Some(workers) = self.workers {
            srv.set_workers(workers);
        }

        if let Some(payload_limit_mib) = self.payload_limit_mib {
            srv.set_payload_limit_mib(payload_limit_mib);
        }

        Ok(srv)
    }

    fn has_third_party(&self, location: &str) -> bool {
        self.third_parties.iter().any(|tp| tp.location == location)
    }

    fn read_root_key(&self) -> Result<Vec<u8>> {
        let path = self.pki_dir.join("root_key");
        if path.exists() {
            let key = fs::read(&path).context("read macaroon root key")?;
            if key.len() < Self::ROOT_KEY_LENGTH {
                bail!("macaroon root key {} is too short", path.display());
            }
            return Ok(key);
        }

        info!("Macaroon root key not exists, try to generate a new one");
        let mut key = vec![0u8; Self::ROOT_KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut key);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)
            .context("create macaroon root key file")?;
        file.write_all(&key).context("write macaroon root key")?;

        Ok(key)
    }

    fn build_ssl(&self) -> Result<SslAcceptorBuilder> {
        let key_path = self.pki_dir.join("key.pem");
        if !key_path.exists() {
            bail!("ssl key file not exists: {:?}", key_path);
        }

        let cert_path = self.pki_dir.join("cert.pem");
        if !cert_path.exists() {
            bail!("ssl cert file not exists: {:?}", cert_path);
        }

        let mut builder =
            SslAcceptor::mozilla_intermediate(SslMethod::tls()).context("init ssl acceptor")?;

        builder
            .set_private_key_file(&key_path, openssl::ssl::SslFiletype::PEM)
            .context("load ssl key file")?;
        builder
            .set_certificate_chain_file(&cert_path)
            .context("load ssl cert file")?;

        Ok(builder)
    }

    fn default_bind() -> String {
        String::from("127.0.0.1:8080")
    }

    fn default_location() -> String {
        String::from("charmstore")
    }

    fn default_identity_location() -> String {
        String::from("https://api.jujucharms.com/identity")
    }

    fn default_macaroon_expiry_secs() -> u64 {
        60 * 60 * 24
    }

    fn default_delegatable_expiry_secs() -> u64 {
        60
    }

    fn default_promulgators_group() -> String {
        String::from("charmers")
    }

    fn default_db() -> DbConfig {
        CommonConfig::default()
    }

    fn default_logs() -> LogsConfig {
        CommonConfig::default()
    }
}
