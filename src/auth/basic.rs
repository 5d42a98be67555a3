use actix_web::http::header;
use actix_web::HttpRequest;

use crate::code;
use crate::errors::{Error, Result};

use super::Authorization;

/// Superuser credentials accepted through HTTP basic auth.
#[derive(Debug, Clone)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

/// Extracts `(username, password)` from a basic `Authorization` header.
/// Returns `None` when the request carries no basic credentials at all.
pub fn parse_basic(req: &HttpRequest) -> Result<Option<(String, String)>> {
    let Some(value) = req.headers().get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| Error::Unauthorized(String::from("invalid authorization header value")))?;

    let fields = value.split_whitespace().collect::<Vec<&str>>();
    if fields.len() != 2 || !fields[0].eq_ignore_ascii_case("basic") {
        return Ok(None);
    }

    let decoded = code::base64_decode_string(fields[1])
        .map_err(|_| Error::Unauthorized(String::from("invalid basic auth credentials")))?;
    match decoded.split_once(':') {
        Some((username, password)) => Ok(Some((username.to_string(), password.to_string()))),
        None => Err(Error::Unauthorized(String::from(
            "basic auth missing password",
        ))),
    }
}

/// Checks basic credentials. `Ok(None)` means none were supplied; wrong
/// credentials fail permanently.
pub fn auth_basic(req: &HttpRequest, creds: Option<&BasicCredentials>) -> Result<Option<Authorization>> {
    let Some((username, password)) = parse_basic(req)? else {
        return Ok(None);
    };
    match creds {
        Some(creds) if creds.username == username && creds.password == password => {
            Ok(Some(Authorization::admin(&username)))
        }
        _ => Err(Error::Unauthorized(String::from(
            "invalid user name or password",
        ))),
    }
}

pub fn basic_header(username: &str, password: &str) -> String {
    format!("Basic {}", code::base64_encode(format!("{username}:{password}")))
}

#[cfg(test)]
mod tests {
    use actix_web::test::TestRequest;

    use super::*;

    #[test]
    fn test_auth_basic() {
        let creds = BasicCredentials {
            username: String::from("admin"),
            password: String::from("hunter2"),
        };

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, basic_header("admin", "hunter2")))
            .to_http_request();
        let auth = auth_basic(&req, Some(&creds)).unwrap().unwrap();
        assert!(auth.admin);
        assert_eq!(auth.username, "admin");

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, basic_header("admin", "wrong")))
            .to_http_request();
        let err = auth_basic(&req, Some(&creds)).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        // Basic auth disabled: every attempt is rejected.
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, basic_header("admin", "hunter2")))
            .to_http_request();
        assert!(auth_basic(&req, None).is_err());

        let req = TestRequest::default().to_http_request();
        assert!(auth_basic(&req, Some(&creds)).unwrap().is_none());

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer abc"))
            .to_http_request();
        assert!(auth_basic(&req, Some(&creds)).unwrap().is_none());

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Basic !!!"))
            .to_http_request();
        assert!(auth_basic(&req, Some(&creds)).is_err());
    }
}
