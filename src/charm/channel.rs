use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Publication channel. Every stored revision is at least `Unpublished`;
/// publishing moves it to `Development` and/or `Stable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Unpublished,
    Development,
    Stable,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Unpublished, Channel::Development, Channel::Stable];

    /// Most published first, the order used for preferred lookups.
    pub const PREFERRED: [Channel; 3] =
        [Channel::Stable, Channel::Development, Channel::Unpublished];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unpublished => "unpublished",
            Self::Development => "development",
            Self::Stable => "stable",
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Channel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpublished" => Ok(Self::Unpublished),
            "development" => Ok(Self::Development),
            "stable" => Ok(Self::Stable),
            _ => Err(Error::BadRequest(format!("invalid channel {s:?}"))),
        }
    }
}
