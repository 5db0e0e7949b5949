pub mod render;

use chrono::{DateTime, Utc};
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub use render::{clean_name, render_status};

/// Label used when an ingest request carries no host segment
pub const UNKNOWN_HOST: &str = "Unknown";

/// Identifier for a reporting host (final segment of the ingest path)
pub type HostKey = String;

/// Keys accepted for the user count, compared ignoring ASCII case
const COUNT_KEYS: [&str; 2] = ["ActiveUserCount", "active_user_count"];

/// A single session reported by a host
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    /// Display name, taken from the key of the reported object
    #[serde(skip)]
    pub name: String,
    #[serde(rename = "ActiveUserCount")]
    pub active_users: u32,
    /// Fields the bridge does not interpret
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SessionRecord {
    pub fn new(name: impl Into<String>, active_users: u32) -> Self {
        Self {
            name: name.into(),
            active_users,
            extra: serde_json::Map::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active_users > 0
    }
}

/// Hosts are loose about casing and sometimes leave the count out. A missing
/// count reads as 0; a count that is present but not a valid `u32` is an error.
impl<'de> Deserialize<'de> for SessionRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut extra = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;

        let count_key = extra
            .keys()
            .find(|key| COUNT_KEYS.iter().any(|c| key.eq_ignore_ascii_case(c)))
            .cloned();
        let active_users = match count_key.and_then(|key| extra.remove(&key)) {
            Some(value) => u32::deserialize(value).map_err(de::Error::custom)?,
            None => 0,
        };

        Ok(Self {
            name: String::new(),
            active_users,
            extra,
        })
    }
}

/// All sessions reported by one host, in the order the host sent them.
///
/// Deserializes from a JSON object keyed by display name. Object key order is
/// kept because it decides the order of sessions with equal user counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionTable {
    sessions: Vec<SessionRecord>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session, replacing an existing one with the same name in place
    pub fn insert(&mut self, record: SessionRecord) {
        match self.sessions.iter_mut().find(|s| s.name == record.name) {
            Some(existing) => *existing = record,
            None => self.sessions.push(record),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SessionRecord> {
        self.sessions.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SessionRecord> {
        self.sessions.iter()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Decode a request body, falling back to an empty table on any error
    pub fn from_json_or_empty(body: &[u8]) -> Self {
        match serde_json::from_slice(body) {
            Ok(table) => table,
            Err(e) => {
                tracing::warn!("Failed to decode session data, treating as empty: {}", e);
                Self::default()
            }
        }
    }
}

impl FromIterator<SessionRecord> for SessionTable {
    fn from_iter<I: IntoIterator<Item = SessionRecord>>(iter: I) -> Self {
        let mut table = Self::new();
        for record in iter {
            table.insert(record);
        }
        table
    }
}

impl<'a> IntoIterator for &'a SessionTable {
    type Item = &'a SessionRecord;
    type IntoIter = std::slice::Iter<'a, SessionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.sessions.iter()
    }
}

impl<'de> Deserialize<'de> for SessionTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = SessionTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping session names to session data")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut table = SessionTable::new();
                while let Some((name, mut record)) = map.next_entry::<String, SessionRecord>()? {
                    record.name = name;
                    table.insert(record);
                }
                Ok(table)
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

/// Latest report received from a host
#[derive(Debug, Clone, PartialEq)]
pub struct HostReport {
    pub host: HostKey,
    pub sessions: SessionTable,
    pub received_at: DateTime<Utc>,
}

/// Latest session table per host.
///
/// Hosts keep the position of their first report; later reports replace the
/// table wholesale without moving the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateState {
    hosts: Vec<HostReport>,
}

impl AggregateState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the table for `host` with `sessions`
    pub fn replace(&mut self, host: HostKey, sessions: SessionTable, received_at: DateTime<Utc>) {
        match self.hosts.iter_mut().find(|r| r.host == host) {
            Some(report) => {
                report.sessions = sessions;
                report.received_at = received_at;
            }
            None => self.hosts.push(HostReport {
                host,
                sessions,
                received_at,
            }),
        }
    }

    pub fn host(&self, host: &str) -> Option<&HostReport> {
        self.hosts.iter().find(|r| r.host == host)
    }

    pub fn reports(&self) -> impl Iterator<Item = &HostReport> {
        self.hosts.iter()
    }

    /// All sessions across all hosts, host order first, then table order
    pub fn sessions(&self) -> impl Iterator<Item = &SessionRecord> {
        self.hosts.iter().flat_map(|r| r.sessions.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}
