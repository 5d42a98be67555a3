use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::{expandenv, CommonConfig, PathSet};

use super::{Database, Sqlite};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DbConfig {
    /// SQLite file path. Empty means `<data>/charmstore.db`; the special
    /// value `:memory:` keeps everything in memory.
    #[serde(default)]
    pub path: String,

    /// Maximum number of concurrent storage sessions.
    #[serde(default = "DbConfig::default_max_sessions")]
    pub max_sessions: usize,

    #[serde(skip)]
    resolved_path: Option<PathBuf>,
}

impl CommonConfig for DbConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            max_sessions: Self::default_max_sessions(),
            resolved_path: None,
        }
    }

    fn complete(&mut self, ps: &PathSet) -> Result<()> {
        if self.max_sessions == 0 {
            bail!("max_sessions must be greater than 0");
        }

        self.path = expandenv("path", &self.path)?;
        self.resolved_path = match self.path.as_str() {
            Self::MEMORY => None,
            "" => Some(ps.data_path.join("charmstore.db")),
            path => Some(PathBuf::from(path)),
        };
        Ok(())
    }
}

impl DbConfig {
    const MEMORY: &str = ":memory:";

    pub fn build(&self) -> Result<Arc<Database>> {
        let conn = match self.resolved_path {
            Some(ref path) => Sqlite::open(path)
                .with_context(|| format!("open sqlite database {}", path.display()))?,
            None => Sqlite::memory().context("open memory database")?,
        };
        Ok(Arc::new(Database::new(conn, self.max_sessions)))
    }

    fn default_max_sessions() -> usize {
        64
    }
}
