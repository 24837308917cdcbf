//! Normalized set of remote endpoints
//!
//! A volume is identified by the ZooKeeper ensemble it talks to. Clients may
//! list the ensemble members in any order, so the set is normalized once at
//! the API boundary: entries are trimmed, de-duplicated, sorted and joined
//! with commas. Normalizing an already normalized value is a no-op.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HostSet {
    hosts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostSetError {
    #[error("host set is empty")]
    Empty,
    #[error("invalid host entry: {0:?}")]
    InvalidHost(String),
}

impl HostSet {
    /// Build a host set from individual entries
    pub fn new<I, S>(hosts: I) -> Result<Self, HostSetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized = Vec::new();
        for host in hosts {
            let host = host.as_ref().trim();
            if host.is_empty() {
                continue;
            }
            if host.contains(',') || host.chars().any(char::is_whitespace) {
                return Err(HostSetError::InvalidHost(host.to_string()));
            }
            normalized.push(host.to_string());
        }

        if normalized.is_empty() {
            return Err(HostSetError::Empty);
        }

        normalized.sort();
        normalized.dedup();
        Ok(Self { hosts: normalized })
    }

    /// Individual hosts in normalized order
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// The comma-joined form handed to the helper and persisted on disk
    pub fn to_arg(&self) -> String {
        self.hosts.join(",")
    }
}

impl FromStr for HostSet {
    type Err = HostSetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.split(','))
    }
}

impl TryFrom<String> for HostSet {
    type Error = HostSetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HostSet> for String {
    fn from(value: HostSet) -> Self {
        value.to_arg()
    }
}

impl fmt::Display for HostSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_arg())
    }
}
