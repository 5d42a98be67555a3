use actix_web::HttpRequest;
use anyhow::{Context, Result};
use macaroon::Macaroon;
use serde::{Deserialize, Serialize};

use crate::code::{base64_url_decode, base64_url_encode};
use crate::errors::Error;

use super::Bakery;

pub const COOKIE_PREFIX: &str = "macaroon-";

/// Header carrying macaroons for clients that cannot set cookies.
pub const MACAROONS_HEADER: &str = "Macaroons";

pub const MACAROON_PATH: &str = "/";

pub const AUTHN_COOKIE_SUFFIX: &str = "authn";

/// Encodes a macaroon set (primary first) as a cookie value.
pub fn encode_macaroons(ms: &[Macaroon]) -> Result<String> {
    let mut items = Vec::with_capacity(ms.len());
    for m in ms {
        items.push(Bakery::serialize(m)?);
    }
    let data = serde_json::to_vec(&items).context("encode macaroons")?;
    Ok(base64_url_encode(data))
}

pub fn decode_macaroons(value: &str) -> Result<Vec<Macaroon>, Error> {
    let bad = |msg: String| Error::Unauthorized(format!("cannot decode macaroons: {msg}"));

    let data = base64_url_decode(value).map_err(|e| bad(e.to_string()))?;
    let items: Vec<String> = serde_json::from_slice(&data).map_err(|e| bad(e.to_string()))?;
    if items.is_empty() {
        return Err(bad(String::from("empty macaroon set")));
    }
    let mut ms = Vec::with_capacity(items.len());
    for item in items {
        let m = Macaroon::deserialize(item.as_str()).map_err(|e| bad(format!("{e:?}")))?;
        ms.push(m);
    }
    Ok(ms)
}

/// Collects every macaroon set the request carries, from `macaroon-*`
/// cookies and the `Macaroons` header. A value that cannot be decoded fails
/// the whole request.
pub fn request_macaroons(req: &HttpRequest) -> Result<Vec<Vec<Macaroon>>, Error> {
    let mut sets = Vec::new();
    if let Ok(cookies) = req.cookies() {
        for cookie in cookies.iter() {
            if cookie.name().starts_with(COOKIE_PREFIX) {
                sets.push(decode_macaroons(cookie.value())?);
            }
        }
    }
    for value in req.headers().get_all(MACAROONS_HEADER) {
        let value = value
            .to_str()
            .map_err(|_| Error::Unauthorized(String::from("invalid macaroons header")))?;
        for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            sets.push(decode_macaroons(item)?);
        }
    }
    Ok(sets)
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct DischargeInfo {
    pub macaroon: String,
    pub macaroon_path: String,
    pub cookie_name_suffix: String,
}

/// Body of a discharge-required response.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct DischargeRequiredBody {
    pub code: String,
    pub message: String,
    pub info: DischargeInfo,
}

impl DischargeRequiredBody {
    pub fn new(code: &str, message: &str, macaroon: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            info: DischargeInfo {
                macaroon: macaroon.to_string(),
                macaroon_path: String::from(MACAROON_PATH),
                cookie_name_suffix: String::from(AUTHN_COOKIE_SUFFIX),
            },
        }
    }
}
