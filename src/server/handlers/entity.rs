use std::sync::Arc;

use actix_web::http::Method;
use actix_web::web::{Bytes, Data};
use actix_web::{HttpRequest, HttpResponse};
use log::info;
use serde::{Deserialize, Serialize};

use crate::acl;
use crate::audit::{AuditEntry, AuditEvent};
use crate::auth::Authorization;
use crate::charm::{Channel, CharmUrl};
use crate::errors::{Error, Result};
use crate::resolve::{self, ResolvedUrl};
use crate::server::context::ServerContext;
use crate::server::response::{convert_response, Response};

use super::{authorize_entity, meta, parse_json, query_channel};

#[derive(Debug, Serialize, Deserialize)]
pub struct PromulgateRequest {
    pub promulgated: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishRequest {
    pub channels: Vec<Channel>,
}

/// Entry point for every `/<id>/...` route: resolves the id once, then
/// dispatches on the sub-resource.
pub async fn handle_entity(
    req: HttpRequest,
    body: Bytes,
    ctx: Data<Arc<ServerContext>>,
) -> HttpResponse {
    convert_response(dispatch(&req, &body, &ctx).await)
}

async fn dispatch(req: &HttpRequest, body: &[u8], ctx: &ServerContext) -> Result<Response> {
    let path = req.match_info().get("path").unwrap_or_default();
    let (url, rest) = CharmUrl::parse_path_prefix(path)?;
    let channel = query_channel(req)?;

    let id = ctx
        .db
        .session()?
        .execute(|tx| resolve::resolve(tx, &url, channel))
        .map_err(|e| e.mask(format!("cannot resolve {url}")))?;

    let method = req.method();
    match (rest.split_once('/'), rest.as_str()) {
        (Some(("meta", endpoint)), _) => meta::serve_meta(req, ctx, &id, endpoint, body).await,
        (None, "archive") if *method == Method::GET => get_archive(req, ctx, &id).await,
        (None, "promulgate") if *method == Method::PUT => {
            put_promulgate(req, ctx, &id, parse_json(body)?).await
        }
        (None, "publish") if *method == Method::PUT => {
            put_publish(req, ctx, &id, parse_json(body)?).await
        }
        _ => Err(Error::NotFound(format!("no route to {method} {}", req.path()))),
    }
}

async fn get_archive(req: &HttpRequest, ctx: &ServerContext, id: &ResolvedUrl) -> Result<Response> {
    ctx.authorizer
        .authorize_entities_and_terms(req, &ctx.db, std::slice::from_ref(id))
        .await?;
    let data = ctx
        .db
        .session()?
        .execute(|tx| Ok(tx.get_blob(&id.entity.blob_name)?))?;
    match data {
        Some(data) => Ok(Response::binary(data)),
        None => Err(Error::NotFound(format!("archive for {} not found", id.url))),
    }
}

async fn put_promulgate(
    req: &HttpRequest,
    ctx: &ServerContext,
    id: &ResolvedUrl,
    body: PromulgateRequest,
) -> Result<Response> {
    let promulgators = [ctx.promulgators.clone()];
    let auth = ctx.authorizer.authorize(req, &promulgators, true, Some(id)).await?;

    ctx.db
        .session()?
        .execute(|tx| acl::promulgate(tx, id, body.promulgated, &ctx.promulgators))?;
    info!(
        "User {:?} set promulgated={} for {}",
        auth.username, body.promulgated, id.url
    );

    let event = if body.promulgated {
        AuditEvent::Promulgate {
            entity: id.url.to_string(),
        }
    } else {
        AuditEvent::Unpromulgate {
            entity: id.url.to_string(),
        }
    };
    audit(ctx, &auth, event);
    Ok(Response::ok())
}

async fn put_publish(
    req: &HttpRequest,
    ctx: &ServerContext,
    id: &ResolvedUrl,
    body: PublishRequest,
) -> Result<Response> {
    let auth = authorize_entity(req, ctx, id).await?;
    ctx.db
        .session()?
        .execute(|tx| acl::publish(tx, id, &body.channels))?;
    audit(
        ctx,
        &auth,
        AuditEvent::Publish {
            entity: id.url.to_string(),
            channels: body.channels,
        },
    );
    Ok(Response::ok())
}

fn audit(ctx: &ServerContext, auth: &Authorization, event: AuditEvent) {
    let mut rc = ctx.pool.get();
    rc.audit.push(AuditEntry::new(auth, event));
    rc.flush_audit(ctx.audit.as_ref());
}
