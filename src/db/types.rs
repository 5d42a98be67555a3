use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::charm::{Channel, CharmUrl};

/// Principal that matches every user, including anonymous ones.
pub const EVERYONE: &str = "everyone";

pub trait Transaction {
    fn create_entity(&self, entity: &EntityRecord) -> Result<()>;
    fn list_entities(&self, name: &str, user: Option<&str>) -> Result<Vec<EntityRecord>>;
    fn list_entities_by_names(&self, names: &[String]) -> Result<Vec<EntityRecord>>;
    fn update_entity_channels(&self, url: &CharmUrl, development: bool, stable: bool)
        -> Result<()>;
    fn update_promulgated_revision(&self, url: &CharmUrl, revision: u32) -> Result<()>;
    fn max_promulgated_revision(&self, name: &str, series: &str) -> Result<Option<u32>>;

    fn create_base_entity(&self, base: &BaseEntityRecord) -> Result<()>;
    fn get_base_entity(&self, user: &str, name: &str) -> Result<Option<BaseEntityRecord>>;
    fn update_channel_acl(
        &self,
        user: &str,
        name: &str,
        channel: Channel,
        field: AclField,
        principals: &[String],
    ) -> Result<()>;
    fn update_base_public(&self, user: &str, name: &str, public: bool) -> Result<()>;
    fn update_base_promulgated(&self, user: &str, name: &str, promulgated: bool) -> Result<()>;
    fn unpromulgate_others(&self, name: &str, keep_user: &str) -> Result<Vec<String>>;

    fn put_blob(&self, name: &str, data: &[u8]) -> Result<()>;
    fn get_blob(&self, name: &str) -> Result<Option<Vec<u8>>>;
}

/// One stored revision of a charm or bundle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityRecord {
    pub user: String,
    pub series: String,
    pub name: String,
    pub revision: u32,
    pub promulgated_revision: Option<u32>,
    pub development: bool,
    pub stable: bool,
    pub terms: Vec<String>,
    pub blob_name: String,
    pub upload_time: u64,
}

impl EntityRecord {
    pub fn url(&self) -> CharmUrl {
        CharmUrl::new(
            Some(&self.user),
            Some(&self.series),
            &self.name,
            Some(self.revision),
        )
    }

    pub fn promulgated_url(&self) -> Option<CharmUrl> {
        self.promulgated_revision
            .map(|rev| CharmUrl::new(None, Some(&self.series), &self.name, Some(rev)))
    }

    /// The most published channel the entity occupies.
    pub fn current_channel(&self) -> Channel {
        if self.stable {
            Channel::Stable
        } else if self.development {
            Channel::Development
        } else {
            Channel::Unpublished
        }
    }

    pub fn in_channel(&self, channel: Channel) -> bool {
        match channel {
            Channel::Unpublished => true,
            Channel::Development => self.development,
            Channel::Stable => self.stable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclField {
    Read,
    Write,
}

impl AclField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Acl {
    pub read: Vec<String>,
    pub write: Vec<String>,
}

impl Acl {
    pub fn get(&self, field: AclField) -> &[String] {
        match field {
            AclField::Read => &self.read,
            AclField::Write => &self.write,
        }
    }
}

/// Cross-revision policy shared by every revision and series of
/// `~user/name`.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseEntityRecord {
    pub user: String,
    pub name: String,
    pub promulgated: bool,
    pub public: bool,
    pub channel_acls: BTreeMap<Channel, Acl>,
}

impl BaseEntityRecord {
    /// Fresh base entity: only the owner may read or write on any channel.
    pub fn new(user: &str, name: &str) -> Self {
        let acl = Acl {
            read: vec![user.to_string()],
            write: vec![user.to_string()],
        };
        Self {
            user: user.to_string(),
            name: name.to_string(),
            promulgated: false,
            public: false,
            channel_acls: Channel::ALL.iter().map(|ch| (*ch, acl.clone())).collect(),
        }
    }

    pub fn acl(&self, channel: Channel) -> Acl {
        self.channel_acls.get(&channel).cloned().unwrap_or_default()
    }
}
