use std::collections::HashMap;

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit, Nonce};
use anyhow::{bail, Context, Result};
use macaroon::{ByteString, Macaroon, MacaroonKey};
use openssl::pkey::{Private, Public};
use openssl::rsa::{Padding, Rsa};
use serde::{Deserialize, Serialize};

use crate::code::{base64_decode, base64_encode, base64_url_decode, base64_url_encode};

use super::checkers::{self, COND_NEED_DECLARED};

/// Finds the public key of a third party so caveats can be addressed to it.
pub trait ThirdPartyLocator: Send + Sync {
    fn public_key(&self, location: &str) -> Option<&Rsa<Public>>;
}

#[derive(Default)]
pub struct StaticLocator {
    keys: HashMap<String, Rsa<Public>>,
}

impl StaticLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pem(&mut self, location: &str, pem: &[u8]) -> Result<()> {
        let key = Rsa::public_key_from_pem(pem)
            .with_context(|| format!("parse public key for third party {location:?}"))?;
        self.keys.insert(location.to_string(), key);
        Ok(())
    }
}

impl ThirdPartyLocator for StaticLocator {
    fn public_key(&self, location: &str) -> Option<&Rsa<Public>> {
        self.keys.get(location)
    }
}

pub const CAVEAT_ROOT_KEY_LENGTH: usize = 32;

const NONCE_LENGTH: usize = 12;

#[derive(Serialize, Deserialize)]
struct CaveatInfo {
    root_key: String,
    condition: String,
}

#[derive(Serialize, Deserialize)]
struct EncryptedCaveat {
    /// AES key, wrapped with the third party's RSA public key.
    key: String,
    nonce: String,
    data: String,
}

pub fn generate_caveat_root_key() -> Vec<u8> {
    let mut key = vec![0u8; CAVEAT_ROOT_KEY_LENGTH];
    OsRng.fill_bytes(&mut key);
    key
}

/// Builds the id of a third-party caveat: the caveat root key and condition,
/// readable only by the holder of the matching private key.
pub fn encrypt_caveat_id(public_key: &Rsa<Public>, root_key: &[u8], condition: &str) -> Result<String> {
    let info = CaveatInfo {
        root_key: base64_encode(root_key),
        condition: condition.to_string(),
    };
    let plain = serde_json::to_vec(&info).context("encode caveat info")?;

    let mut rng = OsRng;
    let aes_key = Aes256Gcm::generate_key(&mut rng);
    let cipher = Aes256Gcm::new(&aes_key);
    let nonce = Aes256Gcm::generate_nonce(&mut rng);
    let data = match cipher.encrypt(&nonce, plain.as_slice()) {
        Ok(data) => data,
        Err(err) => bail!("use aes256gcm to encrypt caveat: {err}"),
    };

    let mut wrapped = vec![0u8; public_key.size() as usize];
    let n = public_key
        .public_encrypt(aes_key.as_slice(), &mut wrapped, Padding::PKCS1_OAEP)
        .context("encrypt caveat key")?;
    wrapped.truncate(n);

    let caveat = EncryptedCaveat {
        key: base64_encode(&wrapped),
        nonce: base64_encode(nonce.as_slice()),
        data: base64_encode(&data),
    };
    let id = serde_json::to_vec(&caveat).context("encode caveat id")?;
    Ok(base64_url_encode(id))
}

/// Returns the caveat root key and condition carried by a caveat id.
pub fn decrypt_caveat_id(private_key: &Rsa<Private>, id: &[u8]) -> Result<(Vec<u8>, String)> {
    let id = base64_url_decode(id).context("decode caveat id")?;
    let caveat: EncryptedCaveat = serde_json::from_slice(&id).context("parse caveat id")?;

    let wrapped = base64_decode(&caveat.key)?;
    let mut aes_key = vec![0u8; private_key.size() as usize];
    let n = private_key
        .private_decrypt(&wrapped, &mut aes_key, Padding::PKCS1_OAEP)
        .context("decrypt caveat key")?;
    aes_key.truncate(n);
    if aes_key.len() != 32 {
        bail!("caveat key has invalid length {}", aes_key.len());
    }

    let nonce = base64_decode(&caveat.nonce)?;
    if nonce.len() != NONCE_LENGTH {
        bail!("caveat nonce has invalid length {}", nonce.len());
    }
    let nonce = Nonce::from_slice(&nonce);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&aes_key));
    let data = base64_decode(&caveat.data)?;
    let plain = match cipher.decrypt(nonce, data.as_slice()) {
        Ok(plain) => plain,
        Err(err) => bail!("use aes256gcm to decrypt caveat: {err}"),
    };

    let info: CaveatInfo = serde_json::from_slice(&plain).context("parse caveat info")?;
    let root_key = base64_decode(&info.root_key)?;
    Ok((root_key, info.condition))
}

/// The third-party side of the protocol: checks a caveat condition and mints
/// the discharge macaroon proving it holds.
pub struct Discharger {
    location: String,
    private_key: Rsa<Private>,
}

impl Discharger {
    pub fn new(location: &str, private_key: Rsa<Private>) -> Self {
        Self {
            location: location.to_string(),
            private_key,
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Discharges the caveat with id `id`. `check` receives the condition
    /// (without any `need-declared` wrapper) and returns the first-party
    /// caveats to add to the discharge.
    pub fn discharge<F>(&self, id: &[u8], check: F) -> Result<Macaroon>
    where
        F: FnOnce(&str) -> Result<Vec<String>>,
    {
        let (root_key, condition) = decrypt_caveat_id(&self.private_key, id)?;

        let (name, arg) = checkers::parse_condition(&condition);
        let (need_keys, condition) = if name == COND_NEED_DECLARED {
            match arg.split_once(' ') {
                Some((keys, cond)) => (keys.split(',').collect::<Vec<_>>(), cond),
                None => bail!("need-declared caveat {condition:?} has no condition"),
            }
        } else {
            (Vec::new(), condition.as_str())
        };

        let caveats = check(condition).with_context(|| format!("check {condition:?}"))?;
        let declared = checkers::infer_declared(caveats.iter().map(String::as_str));
        for key in need_keys {
            if declared.get(key).is_none() {
                bail!("discharge does not declare {key:?}");
            }
        }

        let key = MacaroonKey::generate(&root_key);
        let mut discharge = match Macaroon::create(
            Some(self.location.clone()),
            &key,
            ByteString(id.to_vec()),
        ) {
            Ok(m) => m,
            Err(err) => bail!("create discharge macaroon: {err:?}"),
        };
        for caveat in caveats {
            discharge.add_first_party_caveat(ByteString(caveat.into_bytes()));
        }
        Ok(discharge)
    }
}

/// Acquires a discharge for every third-party caveat of `m` through
/// `get_discharge(location, caveat_id)`, binding each to `m`. Returns the
/// full set, primary macaroon first.
pub fn discharge_all<F>(m: &Macaroon, mut get_discharge: F) -> Result<Vec<Macaroon>>
where
    F: FnMut(&str, &[u8]) -> Result<Macaroon>,
{
    let mut ms = vec![m.clone()];
    for caveat in m.third_party_caveats() {
        let macaroon::Caveat::ThirdParty(tp) = caveat else {
            continue;
        };
        let location = tp.location();
        let id = tp.id();
        let mut discharge = get_discharge(&location, &id.0)?;
        m.bind(&mut discharge);
        ms.push(discharge);
    }
    Ok(ms)
}
