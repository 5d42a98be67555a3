use std::sync::Arc;

use actix_web::web::Data;
use actix_web::{HttpRequest, HttpResponse};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::bakery::Bakery;
use crate::charm::CharmUrl;
use crate::errors::{Error, Result};
use crate::resolve;
use crate::server::context::ServerContext;
use crate::server::response::{convert_response, Response};

use super::{query_channel, query_values};

#[derive(Debug, Serialize, Deserialize)]
pub struct MacaroonResponse {
    pub macaroon: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WhoamiResponse {
    pub user: String,
    pub groups: Vec<String>,
}

impl MacaroonResponse {
    fn new(m: &macaroon::Macaroon) -> Result<Self> {
        Ok(Self {
            macaroon: Bakery::serialize(m)?,
        })
    }
}

pub async fn get_macaroon(_req: HttpRequest, ctx: Data<Arc<ServerContext>>) -> HttpResponse {
    let resp = ctx
        .authorizer
        .new_macaroon(true, Vec::new())
        .and_then(|m| MacaroonResponse::new(&m))
        .map(Response::json);
    convert_response(resp)
}

pub async fn get_delegatable_macaroon(
    req: HttpRequest,
    ctx: Data<Arc<ServerContext>>,
) -> HttpResponse {
    convert_response(delegatable_macaroon(&req, &ctx).await)
}

async fn delegatable_macaroon(req: &HttpRequest, ctx: &ServerContext) -> Result<Response> {
    let channel = query_channel(req)?;
    let names = query_values(req, "id");
    let urls = names
        .iter()
        .map(|s| s.parse::<CharmUrl>())
        .collect::<Result<Vec<_>>>()?;

    let mut rc = ctx.pool.get();
    if !urls.is_empty() {
        let resolved = ctx
            .db
            .session()?
            .execute(|tx| resolve::resolve_batch(tx, &urls, channel))?;
        for (name, id) in names.iter().zip(resolved) {
            match id {
                Some(id) => rc.ids.push(id),
                None => {
                    return Err(Error::NotFound(format!(
                        "no matching charm or bundle for {name:?}"
                    )))
                }
            }
        }
    }

    let m = ctx
        .authorizer
        .delegatable_macaroon(req, &ctx.db, &rc.ids)
        .await?;
    Ok(Response::json(MacaroonResponse::new(&m)?))
}

pub async fn get_whoami(req: HttpRequest, ctx: Data<Arc<ServerContext>>) -> HttpResponse {
    convert_response(whoami(&req, &ctx).await)
}

async fn whoami(req: &HttpRequest, ctx: &ServerContext) -> Result<Response> {
    let auth = ctx.authorizer.authenticate(req)?;
    if auth.admin {
        return Ok(Response::json(WhoamiResponse {
            user: auth.username,
            groups: Vec::new(),
        }));
    }
    if auth.username.is_empty() {
        return Err(Error::Unauthorized(String::from("no username declared")));
    }
    let groups = match ctx.authorizer.groups().groups_for_user(&auth.username).await {
        Ok(groups) => groups,
        Err(err) => {
            warn!("Resolve groups for user {}: {err}", auth.username);
            return Err(Error::ServiceUnavailable(format!(
                "cannot retrieve groups for {}",
                auth.username
            )));
        }
    };
    Ok(Response::json(WhoamiResponse {
        user: auth.username,
        groups,
    }))
}
