use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::{StatusCode, Url};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GroupError {
    /// The identity service could not answer. The caller denies access.
    #[error("identity service unavailable: {0}")]
    Unavailable(String),

    /// The identity service answered with something that is not a group
    /// list.
    #[error("identity service returned invalid groups: {0:?}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait GroupResolver: Send + Sync {
    async fn groups_for_user(&self, username: &str) -> Result<Vec<String>, GroupError>;
}

/// Looks up group membership at the identity service's
/// `/v1/u/<user>/groups` endpoint. Without a configured API URL every user
/// belongs to no groups.
pub struct IdentityClient {
    url: Option<Url>,
    client: reqwest::Client,
}

impl IdentityClient {
    const TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(api_url: &str) -> Result<Self> {
        let api_url = api_url.trim_end_matches('/');
        let url = if api_url.is_empty() {
            None
        } else {
            let parsed = match Url::parse(&format!("{api_url}/")) {
                Ok(url) => url,
                Err(_) => bail!("invalid identity api url '{api_url}'"),
            };
            match parsed.scheme() {
                "http" | "https" => {}
                scheme => bail!("invalid identity api url scheme '{scheme}'"),
            }
            Some(parsed)
        };
        let client = reqwest::Client::builder()
            .timeout(Self::TIMEOUT)
            .build()
            .context("build identity client")?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl GroupResolver for IdentityClient {
    async fn groups_for_user(&self, username: &str) -> Result<Vec<String>, GroupError> {
        let Some(ref base) = self.url else {
            return Ok(Vec::new());
        };
        let url = groups_url(base, username)?;
        debug!("Fetch groups for user {username} from {url}");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GroupError::Unavailable(format!("{e:#}")))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| GroupError::Unavailable(format!("read response: {e:#}")))?;
        if status != StatusCode::OK {
            return Err(GroupError::Unavailable(format!(
                "status {}, {}",
                status.as_u16(),
                body.trim()
            )));
        }

        serde_json::from_str(&body).map_err(|_| GroupError::InvalidResponse(body))
    }
}

/// `<base>/v1/u/<username>/groups`, with the username as a single encoded
/// path segment.
fn groups_url(base: &Url, username: &str) -> Result<Url, GroupError> {
    if username.is_empty() || username == "." || username == ".." {
        return Err(GroupError::Unavailable(format!("invalid username {username:?}")));
    }
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| GroupError::Unavailable(format!("cannot build groups url from {base}")))?
        .pop_if_empty()
        .extend(["v1", "u", username, "groups"]);
    Ok(url)
}

/// Fixed group memberships.
#[derive(Debug, Default, Clone)]
pub struct StaticGroups {
    groups: HashMap<String, Vec<String>>,
}

impl StaticGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, username: &str, groups: &[&str]) -> Self {
        self.groups.insert(
            username.to_string(),
            groups.iter().map(|g| g.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl GroupResolver for StaticGroups {
    async fn groups_for_user(&self, username: &str) -> Result<Vec<String>, GroupError> {
        Ok(self.groups.get(username).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{web, App, HttpResponse, HttpServer};

    use super::*;

    async fn groups_handler(user: web::Path<String>) -> HttpResponse {
        match user.as_str() {
            "bob" => HttpResponse::Ok().json(vec!["charmers", "wordpress-team"]),
            "broken" => HttpResponse::Ok().body("<html>oops</html>"),
            _ => HttpResponse::NotFound().body("user not found"),
        }
    }

    #[actix_web::test]
    async fn test_identity_client() {
        let srv = HttpServer::new(|| {
            App::new().route("/v1/u/{user}/groups", web::get().to(groups_handler))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = srv.addrs()[0];
        let srv = srv.run();
        let handle = srv.handle();
        actix_web::rt::spawn(srv);

        let client = IdentityClient::new(&format!("http://{addr}/")).unwrap();
        assert_eq!(
            client.groups_for_user("bob").await.unwrap(),
            vec![String::from("charmers"), String::from("wordpress-team")]
        );

        let err = client.groups_for_user("alice").await.unwrap_err();
        assert!(matches!(err, GroupError::Unavailable(_)));

        let err = client.groups_for_user("broken").await.unwrap_err();
        assert!(matches!(err, GroupError::InvalidResponse(_)));

        // A crafted name cannot walk to another user's groups.
        let err = client.groups_for_user("alice/../bob").await.unwrap_err();
        assert!(matches!(err, GroupError::Unavailable(_)));

        handle.stop(true).await;
    }

    #[test]
    fn test_groups_url() {
        let base = Url::parse("https://id.example.com/api/").unwrap();
        let url = |user: &str| groups_url(&base, user).map(|u| u.to_string());
        assert_eq!(
            url("bob").unwrap(),
            "https://id.example.com/api/v1/u/bob/groups"
        );
        assert_eq!(
            url("bob/../admin").unwrap(),
            "https://id.example.com/api/v1/u/bob%2F..%2Fadmin/groups"
        );
        assert_eq!(
            url("bob?admin=1#x").unwrap(),
            "https://id.example.com/api/v1/u/bob%3Fadmin=1%23x/groups"
        );
        for user in ["", ".", ".."] {
            assert!(matches!(url(user), Err(GroupError::Unavailable(_))), "{user:?}");
        }
    }

    #[actix_web::test]
    async fn test_no_identity_service() {
        let client = IdentityClient::new("").unwrap();
        assert!(client.groups_for_user("bob").await.unwrap().is_empty());

        assert!(IdentityClient::new("ftp://id.example.com").is_err());
        assert!(IdentityClient::new("not a url").is_err());
    }

    #[actix_web::test]
    async fn test_static_groups() {
        let groups = StaticGroups::new().with("bob", &["charmers"]);
        assert_eq!(
            groups.groups_for_user("bob").await.unwrap(),
            vec![String::from("charmers")]
        );
        assert!(groups.groups_for_user("alice").await.unwrap().is_empty());
    }
}
