use std::fmt::Display;
use std::str::FromStr;

use crate::errors::Error;

const SCHEMA: &str = "cs:";

/// A possibly partial charm or bundle identifier.
///
/// `user == None` means the promulgated (canonical) namespace. A missing
/// series or revision is filled in by resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CharmUrl {
    pub user: Option<String>,
    pub series: Option<String>,
    pub name: String,
    pub revision: Option<u32>,
}

impl CharmUrl {
    pub fn new(user: Option<&str>, series: Option<&str>, name: &str, revision: Option<u32>) -> Self {
        Self {
            user: user.map(String::from),
            series: series.map(String::from),
            name: name.to_string(),
            revision,
        }
    }

    /// Parses the id part of an API path such as
    /// `~bob/trusty/wordpress-3/meta/perm`, returning the id and the remaining
    /// path. The id ends at the first element that cannot belong to it.
    pub fn parse_path_prefix(path: &str) -> Result<(CharmUrl, String), Error> {
        let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
        let mut take = 0;
        if parts.first().is_some_and(|p| p.starts_with('~')) {
            take += 1;
        }
        // series/name when the element after the next one is not a known
        // sub-resource.
        let rest_start = take;
        let has_series = parts.len() > rest_start + 1
            && !is_sub_resource(parts[rest_start + 1])
            && is_valid_series(parts[rest_start]);
        take += if has_series { 2 } else { 1 };
        if take > parts.len() {
            return Err(Error::BadRequest(format!("invalid charm or bundle id {path:?}")));
        }
        let id = parts[..take].join("/");
        let rest = parts[take..].join("/");
        Ok((id.parse()?, rest))
    }
}

fn is_sub_resource(part: &str) -> bool {
    matches!(part, "meta" | "archive" | "promulgate" | "publish")
}

fn is_valid_user(user: &str) -> bool {
    let mut chars = user.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    user.len() > 1
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '.' || c == '-')
}

fn is_valid_series(series: &str) -> bool {
    let mut chars = series.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

/// Names are hyphen-separated segments of lowercase letters and digits,
/// starting with a letter; every segment must contain a letter so that a
/// trailing `-N` is never part of the name.
fn is_valid_name(name: &str) -> bool {
    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        return false;
    }
    name.split('-').all(|seg| {
        !seg.is_empty()
            && seg.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            && seg.chars().any(|c| c.is_ascii_lowercase())
    })
}

impl FromStr for CharmUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = |reason: &str| Error::BadRequest(format!("cannot parse URL {s:?}: {reason}"));

        let rest = s.strip_prefix(SCHEMA).unwrap_or(s);
        let mut parts: Vec<&str> = rest.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(bad("empty path element"));
        }

        let mut user = None;
        if parts[0].starts_with('~') {
            let u = &parts[0][1..];
            if !is_valid_user(u) {
                return Err(bad("invalid user name"));
            }
            user = Some(u.to_string());
            parts.remove(0);
        }

        let (series, name_rev) = match parts.as_slice() {
            [name_rev] => (None, *name_rev),
            [series, name_rev] => {
                if !is_valid_series(series) {
                    return Err(bad("invalid series"));
                }
                (Some(series.to_string()), *name_rev)
            }
            _ => return Err(bad("too many path elements")),
        };

        let (name, revision) = match name_rev.rsplit_once('-') {
            Some((name, rev)) if !rev.is_empty() && rev.chars().all(|c| c.is_ascii_digit()) => {
                let rev: u32 = rev.parse().map_err(|_| bad("invalid revision"))?;
                (name, Some(rev))
            }
            _ => (name_rev, None),
        };
        if !is_valid_name(name) {
            return Err(bad("invalid name"));
        }

        Ok(CharmUrl {
            user,
            series,
            name: name.to_string(),
            revision,
        })
    }
}

impl Display for CharmUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{SCHEMA}")?;
        if let Some(ref user) = self.user {
            write!(f, "~{user}/")?;
        }
        if let Some(ref series) = self.series {
            write!(f, "{series}/")?;
        }
        write!(f, "{}", self.name)?;
        if let Some(rev) = self.revision {
            write!(f, "-{rev}")?;
        }
        Ok(())
    }
}
