use std::collections::BTreeMap;
use std::sync::Arc;

use actix_web::http::Method;
use actix_web::web::{Bytes, Data};
use actix_web::{HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::acl;
use crate::audit::{AuditEntry, AuditEvent};
use crate::charm::{Channel, CharmUrl};
use crate::db::types::{AclField, BaseEntityRecord};
use crate::errors::{Error, Result};
use crate::resolve::{self, ResolvedUrl};
use crate::server::context::ServerContext;
use crate::server::response::{convert_response, Response};

use super::{authorize_entity, parse_json, query_channel, query_values};

/// Storage data a meta endpoint reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Identity of the resolved entity, always at hand after resolution.
    Id,
    Terms,
    Channels,
    BasePromulgated,
    /// Whether everyone may read the stable channel, kept in step with its
    /// read list.
    BasePublic,
    BaseAcls,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaEndpoint {
    Id,
    IdUser,
    IdSeries,
    IdName,
    IdRevision,
    Promulgated,
    Public,
    Published,
    Terms,
    Perm,
    PermRead,
    PermWrite,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct IdResponse {
    pub id: String,
    pub user: String,
    pub series: String,
    pub name: String,
    pub revision: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promulgated_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PublishedChannel {
    pub channel: Channel,
    pub current: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PublishedResponse {
    pub info: Vec<PublishedChannel>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PermResponse {
    pub read: Vec<String>,
    pub write: Vec<String>,
}

impl MetaEndpoint {
    pub const ALL: [MetaEndpoint; 12] = [
        Self::Id,
        Self::IdUser,
        Self::IdSeries,
        Self::IdName,
        Self::IdRevision,
        Self::Promulgated,
        Self::Public,
        Self::Published,
        Self::Terms,
        Self::Perm,
        Self::PermRead,
        Self::PermWrite,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::IdUser => "id-user",
            Self::IdSeries => "id-series",
            Self::IdName => "id-name",
            Self::IdRevision => "id-revision",
            Self::Promulgated => "promulgated",
            Self::Public => "public",
            Self::Published => "published",
            Self::Terms => "terms",
            Self::Perm => "perm",
            Self::PermRead => "perm/read",
            Self::PermWrite => "perm/write",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim_matches('/');
        match Self::ALL.iter().find(|ep| ep.name() == name) {
            Some(ep) => Ok(*ep),
            None => Err(Error::NotFound(format!("unknown metadata {name:?}"))),
        }
    }

    pub fn fields(&self) -> &'static [Field] {
        match self {
            Self::Id | Self::IdUser | Self::IdSeries | Self::IdName | Self::IdRevision => {
                &[Field::Id]
            }
            Self::Promulgated => &[Field::BasePromulgated],
            Self::Public => &[Field::BasePublic],
            Self::Published => &[Field::Channels],
            Self::Terms => &[Field::Terms],
            Self::Perm | Self::PermRead | Self::PermWrite => &[Field::BaseAcls],
        }
    }

    pub fn needs_base_entity(&self) -> bool {
        self.fields()
            .iter()
            .any(|f| matches!(f, Field::BasePromulgated | Field::BasePublic | Field::BaseAcls))
    }

    pub fn supports_put(&self) -> bool {
        matches!(self, Self::Perm | Self::PermRead | Self::PermWrite)
    }

    /// Renders the endpoint for `id`. `base` must be present when
    /// `needs_base_entity` says so.
    pub fn get(&self, id: &ResolvedUrl, base: Option<&BaseEntityRecord>) -> Result<Value> {
        let entity = &id.entity;
        let value = match self {
            Self::Id => serde_json::to_value(IdResponse {
                id: id.url.to_string(),
                user: entity.user.clone(),
                series: entity.series.clone(),
                name: entity.name.clone(),
                revision: entity.revision,
                promulgated_id: id.promulgated_url().map(|u| u.to_string()),
            }),
            Self::IdUser => Ok(serde_json::json!({ "User": entity.user })),
            Self::IdSeries => Ok(serde_json::json!({ "Series": entity.series })),
            Self::IdName => Ok(serde_json::json!({ "Name": entity.name })),
            Self::IdRevision => Ok(serde_json::json!({ "Revision": entity.revision })),
            Self::Published => {
                let current = entity.current_channel();
                let info = [Channel::Development, Channel::Stable]
                    .into_iter()
                    .filter(|ch| entity.in_channel(*ch))
                    .map(|channel| PublishedChannel {
                        channel,
                        current: channel == current,
                    })
                    .collect();
                serde_json::to_value(PublishedResponse { info })
            }
            Self::Terms => serde_json::to_value(&entity.terms),
            Self::Promulgated => {
                let base = Self::require_base(base)?;
                Ok(serde_json::json!({ "Promulgated": base.promulgated }))
            }
            Self::Public => {
                let base = Self::require_base(base)?;
                Ok(serde_json::json!({ "Public": base.public }))
            }
            Self::Perm | Self::PermRead | Self::PermWrite => {
                let acl = Self::require_base(base)?.acl(id.channel);
                match self {
                    Self::PermRead => serde_json::to_value(acl.read),
                    Self::PermWrite => serde_json::to_value(acl.write),
                    _ => serde_json::to_value(PermResponse {
                        read: acl.read,
                        write: acl.write,
                    }),
                }
            }
        };
        value.map_err(|e| Error::Internal(anyhow::Error::new(e).context("encode metadata")))
    }

    /// Parses a PUT body into the ACL lists it replaces.
    pub fn parse_put(&self, body: &[u8]) -> Result<Vec<(AclField, Vec<String>)>> {
        match self {
            Self::Perm => {
                let perm: PermResponse = parse_json(body)?;
                Ok(vec![(AclField::Read, perm.read), (AclField::Write, perm.write)])
            }
            Self::PermRead => Ok(vec![(AclField::Read, parse_json(body)?)]),
            Self::PermWrite => Ok(vec![(AclField::Write, parse_json(body)?)]),
            _ => Err(Error::BadRequest(format!(
                "metadata {:?} cannot be set",
                self.name()
            ))),
        }
    }

    fn require_base(base: Option<&BaseEntityRecord>) -> Result<&BaseEntityRecord> {
        base.ok_or_else(|| Error::Internal(anyhow::anyhow!("base entity not fetched")))
    }
}

fn fetch(ctx: &ServerContext, ep: MetaEndpoint, id: &ResolvedUrl) -> Result<Value> {
    let base = if ep.needs_base_entity() {
        let base = ctx
            .db
            .session()?
            .execute(|tx| acl::get_base_entity(tx, id.user(), id.name()))?;
        Some(base)
    } else {
        None
    };
    ep.get(id, base.as_ref())
}

pub async fn serve_meta(
    req: &HttpRequest,
    ctx: &ServerContext,
    id: &ResolvedUrl,
    endpoint: &str,
    body: &[u8],
) -> Result<Response> {
    let ep = MetaEndpoint::parse(endpoint)?;
    if *req.method() == Method::GET {
        authorize_entity(req, ctx, id).await?;
        return Ok(Response::json(fetch(ctx, ep, id)?));
    }
    if *req.method() != Method::PUT {
        return Err(Error::BadRequest(format!("method {} not allowed", req.method())));
    }
    if !ep.supports_put() {
        return Err(Error::BadRequest(format!(
            "metadata {:?} cannot be set",
            ep.name()
        )));
    }
    let lists = ep.parse_put(body)?;
    let auth = authorize_entity(req, ctx, id).await?;

    ctx.db.session()?.execute(|tx| {
        for (field, principals) in lists.iter() {
            acl::set_acl(tx, id, id.channel, *field, principals)?;
        }
        Ok(())
    })?;

    let mut rc = ctx.pool.get();
    let (mut read, mut write) = (None, None);
    for (field, principals) in lists {
        match field {
            AclField::Read => read = Some(principals),
            AclField::Write => write = Some(principals),
        }
    }
    rc.audit.push(AuditEntry::new(
        &auth,
        AuditEvent::SetPerms {
            entity: id.url.to_string(),
            channel: id.channel,
            read,
            write,
        },
    ));
    rc.flush_audit(ctx.audit.as_ref());
    Ok(Response::ok())
}

/// `GET /meta/<endpoint>?id=...`: the endpoint for several ids at once,
/// keyed by the ids as given. Ids that do not resolve are left out.
pub async fn get_bulk_meta(
    req: HttpRequest,
    _body: Bytes,
    ctx: Data<Arc<ServerContext>>,
) -> HttpResponse {
    convert_response(bulk_meta(&req, &ctx).await)
}

async fn bulk_meta(req: &HttpRequest, ctx: &ServerContext) -> Result<Response> {
    let endpoint = req.match_info().get("endpoint").unwrap_or_default();
    let ep = MetaEndpoint::parse(endpoint)?;
    let channel = query_channel(req)?;

    let names = query_values(req, "id");
    if names.is_empty() {
        return Err(Error::BadRequest(String::from("no ids specified")));
    }
    let urls = names
        .iter()
        .map(|s| s.parse::<CharmUrl>())
        .collect::<Result<Vec<_>>>()?;

    let resolved = ctx
        .db
        .session()?
        .execute(|tx| resolve::resolve_batch(tx, &urls, channel))?;

    let mut rc = ctx.pool.get();
    let mut keys = Vec::new();
    for (name, id) in names.into_iter().zip(resolved) {
        if let Some(id) = id {
            keys.push(name);
            rc.ids.push(id);
        }
    }

    let mut result = BTreeMap::new();
    for (name, id) in keys.into_iter().zip(rc.ids.iter()) {
        authorize_entity(req, ctx, id).await?;
        result.insert(name, fetch(ctx, ep, id)?);
    }
    Ok(Response::json(result))
}
