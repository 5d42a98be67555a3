use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use log::{error, info};
use serde::Serialize;

use crate::auth::Authorization;
use crate::charm::Channel;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum AuditEvent {
    SetPerms {
        entity: String,
        channel: Channel,
        read: Option<Vec<String>>,
        write: Option<Vec<String>>,
    },
    Promulgate {
        entity: String,
    },
    Unpromulgate {
        entity: String,
    },
    Publish {
        entity: String,
        channels: Vec<Channel>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub time: String,
    pub user: String,
    pub admin: bool,
    #[serde(flatten)]
    pub event: AuditEvent,
}

impl AuditEntry {
    pub fn new(auth: &Authorization, event: AuditEvent) -> Self {
        Self::at(Utc::now(), auth, event)
    }

    pub fn at(time: DateTime<Utc>, auth: &Authorization, event: AuditEvent) -> Self {
        Self {
            time: time.to_rfc3339_opts(SecondsFormat::Millis, true),
            user: auth.username.clone(),
            admin: auth.admin,
            event,
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn log(&self, entry: &AuditEntry);
}

/// Writes entries as JSON through the `audit` log target.
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn log(&self, entry: &AuditEntry) {
        match serde_json::to_string(entry) {
            Ok(line) => info!(target: "audit", "{line}"),
            Err(err) => error!("Encode audit entry: {err:#}"),
        }
    }
}

#[derive(Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn entries(&self) -> Vec<AuditEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(_) => Vec::new(),
        }
    }
}

impl AuditSink for MemoryAuditSink {
    fn log(&self, entry: &AuditEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_entry_json() {
        let time = Utc.with_ymd_and_hms(2016, 5, 4, 12, 0, 0).unwrap();
        let entry = AuditEntry::at(
            time,
            &Authorization::user("bob"),
            AuditEvent::SetPerms {
                entity: String::from("cs:~bob/trusty/wordpress-3"),
                channel: Channel::Stable,
                read: Some(vec![String::from("everyone")]),
                write: None,
            },
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "time": "2016-05-04T12:00:00.000Z",
                "user": "bob",
                "admin": false,
                "op": "set-perms",
                "entity": "cs:~bob/trusty/wordpress-3",
                "channel": "stable",
                "read": ["everyone"],
                "write": null,
            })
        );

        let sink = MemoryAuditSink::default();
        sink.log(&entry);
        LogAuditSink.log(&entry);
        assert_eq!(sink.entries(), vec![entry]);
    }
}
