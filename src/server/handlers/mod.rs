pub mod auth;
pub mod entity;
pub mod healthz;
pub mod meta;

use actix_web::http::Method;
use actix_web::HttpRequest;
use serde::de::DeserializeOwned;

use crate::acl;
use crate::auth::Authorization;
use crate::charm::Channel;
use crate::db::types::AclField;
use crate::errors::{Error, Result};
use crate::resolve::ResolvedUrl;
use crate::server::context::ServerContext;

/// All values of query parameter `key`, in order.
pub fn query_values(req: &HttpRequest, key: &str) -> Vec<String> {
    url::form_urlencoded::parse(req.query_string().as_bytes())
        .filter(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .collect()
}

pub fn query_channel(req: &HttpRequest) -> Result<Option<Channel>> {
    match query_values(req, "channel").first() {
        Some(channel) => Ok(Some(channel.parse()?)),
        None => Ok(None),
    }
}

pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| Error::BadRequest(format!("cannot parse body: {e}")))
}

/// Mutating methods need the write list, everything else the read list.
pub fn acl_field(method: &Method) -> AclField {
    if *method == Method::DELETE
        || *method == Method::PATCH
        || *method == Method::POST
        || *method == Method::PUT
    {
        AclField::Write
    } else {
        AclField::Read
    }
}

/// Authorizes the request against the ACL of the channel `id` resolved in,
/// picking the list that matches the request method.
pub async fn authorize_entity(
    req: &HttpRequest,
    ctx: &ServerContext,
    id: &ResolvedUrl,
) -> Result<Authorization> {
    let acl = ctx
        .db
        .session()?
        .execute(|tx| acl::effective_acl(tx, id))
        .map_err(|e| e.mask(format!("cannot get ACL for {}", id.url)))?;
    ctx.authorizer
        .authorize(req, acl.get(acl_field(req.method())), false, Some(id))
        .await
}
