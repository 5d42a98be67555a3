use std::collections::HashMap;

use crate::charm::{series_rank, Channel, CharmUrl};
use crate::db::types::EntityRecord;
use crate::db::Transaction;
use crate::errors::{Error, Result};

/// A fully qualified identifier, produced once per request and passed on
/// unchanged as the subject of authorization.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUrl {
    /// Owner, series, name and revision are always set.
    pub url: CharmUrl,
    pub promulgated_revision: Option<u32>,
    pub channel: Channel,
    pub entity: EntityRecord,
}

impl ResolvedUrl {
    fn new(entity: EntityRecord, channel: Option<Channel>) -> Self {
        Self {
            url: entity.url(),
            promulgated_revision: entity.promulgated_revision,
            channel: channel.unwrap_or_else(|| entity.current_channel()),
            entity,
        }
    }

    pub fn user(&self) -> &str {
        &self.entity.user
    }

    pub fn name(&self) -> &str {
        &self.entity.name
    }

    pub fn promulgated_url(&self) -> Option<CharmUrl> {
        self.entity.promulgated_url()
    }

    /// Every spelling under which a caveat may name this entity.
    pub fn ids(&self) -> Vec<String> {
        let mut ids = vec![self.url.to_string()];
        if let Some(url) = self.promulgated_url() {
            ids.push(url.to_string());
        }
        ids
    }
}

/// Resolves `url` against the stored entities. Without an explicit channel or
/// revision the most published channel holding a match wins.
pub fn resolve(tx: &dyn Transaction, url: &CharmUrl, channel: Option<Channel>) -> Result<ResolvedUrl> {
    let entities = tx.list_entities(&url.name, url.user.as_deref())?;
    select(&entities, url, channel)
}

/// Resolves every url against one prefetch of all names involved. Urls that
/// do not resolve map to `None`; any other failure aborts the batch.
pub fn resolve_batch(
    tx: &dyn Transaction,
    urls: &[CharmUrl],
    channel: Option<Channel>,
) -> Result<Vec<Option<ResolvedUrl>>> {
    let mut names: Vec<String> = urls.iter().map(|u| u.name.clone()).collect();
    names.sort();
    names.dedup();

    let mut by_name: HashMap<String, Vec<EntityRecord>> = HashMap::new();
    for entity in tx.list_entities_by_names(&names)? {
        by_name.entry(entity.name.clone()).or_default().push(entity);
    }

    let empty = Vec::new();
    let mut resolved = Vec::with_capacity(urls.len());
    for url in urls {
        let entities = by_name.get(&url.name).unwrap_or(&empty);
        match select(entities, url, channel) {
            Ok(r) => resolved.push(Some(r)),
            Err(err) if err.is_not_found() => resolved.push(None),
            Err(err) => return Err(err),
        }
    }
    Ok(resolved)
}

fn select(entities: &[EntityRecord], url: &CharmUrl, channel: Option<Channel>) -> Result<ResolvedUrl> {
    let found = match (channel, url.revision) {
        (Some(ch), _) => newest(entities, url, ch),
        (None, Some(_)) => newest(entities, url, Channel::Unpublished),
        (None, None) => Channel::PREFERRED
            .iter()
            .find_map(|ch| newest(entities, url, *ch)),
    };
    match found {
        Some(entity) => Ok(ResolvedUrl::new(entity.clone(), channel)),
        None => Err(Error::NotFound(format!(
            "no matching charm or bundle for {:?}",
            url.to_string()
        ))),
    }
}

fn newest<'a>(entities: &'a [EntityRecord], url: &CharmUrl, channel: Channel) -> Option<&'a EntityRecord> {
    let revision_of = |e: &EntityRecord| match url.user {
        Some(_) => Some(e.revision),
        None => e.promulgated_revision,
    };
    entities
        .iter()
        .filter(|e| e.name == url.name)
        .filter(|e| match url.user {
            Some(ref user) => e.user == *user,
            None => e.promulgated_revision.is_some(),
        })
        .filter(|e| url.series.as_ref().map_or(true, |s| e.series == *s))
        .filter(|e| url.revision.is_none() || revision_of(e) == url.revision)
        .filter(|e| e.in_channel(channel))
        .min_by_key(|e| (series_rank(&e.series), std::cmp::Reverse(revision_of(e))))
}
