use anyhow::{bail, Result};
use base64::prelude::{BASE64_STANDARD, BASE64_URL_SAFE_NO_PAD};
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

#[inline(always)]
pub fn base64_encode<T>(input: T) -> String
where
    T: AsRef<[u8]>,
{
    BASE64_STANDARD.encode(input)
}

#[inline(always)]
pub fn base64_decode<T>(input: T) -> Result<Vec<u8>>
where
    T: AsRef<[u8]>,
{
    match BASE64_STANDARD.decode(input) {
        Ok(data) => Ok(data),
        Err(_) => bail!("invalid base64 string"),
    }
}

#[inline(always)]
pub fn base64_decode_string<T>(input: T) -> Result<String>
where
    T: AsRef<[u8]>,
{
    let data = base64_decode(input)?;
    match String::from_utf8(data) {
        Ok(s) => Ok(s),
        Err(_) => bail!("invalid utf8 string"),
    }
}

/// URL-safe variant, used for values that travel inside cookies.
#[inline(always)]
pub fn base64_url_encode<T>(input: T) -> String
where
    T: AsRef<[u8]>,
{
    BASE64_URL_SAFE_NO_PAD.encode(input)
}

#[inline(always)]
pub fn base64_url_decode<T>(input: T) -> Result<Vec<u8>>
where
    T: AsRef<[u8]>,
{
    match BASE64_URL_SAFE_NO_PAD.decode(input) {
        Ok(data) => Ok(data),
        Err(_) => bail!("invalid base64 string"),
    }
}

pub fn random_string(length: usize) -> String {
    let mut rng = thread_rng();

    (0..length)
        .map(|_| rng.sample(Alphanumeric) as char)
        .collect()
}
