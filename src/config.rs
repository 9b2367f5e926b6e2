//! Service configuration.
//!
//! [`Config`] is plain data: derive-deserializable so a host can load it
//! from whatever format it likes, with defaults for every field. It is
//! compiled once, when the [`Service`](crate::Service) is created.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid trace pattern `{pattern}`: {source}")]
    TracePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid endpoint `{0}`")]
    Endpoint(String),
}

pub(crate) const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prefix for log lines.
    pub name: String,
    /// Sent as `User-Agent` on every dispatched response when set.
    pub user_agent: Option<String>,
    /// `host:port` the server binds to.
    pub endpoint: String,
    /// Time allowed to receive request headers. 0 disables the limit.
    pub read_timeout_secs: u64,
    /// Time allowed to produce a response. 0 disables the limit.
    pub write_timeout_secs: u64,
    /// Time an open connection may sit between requests. 0 disables the limit.
    pub idle_timeout_secs: u64,
    /// Largest request body accepted; bigger ones get `413`. 0 disables the limit.
    pub max_body_bytes: usize,
    /// Requests whose path matches one of these are dumped at debug level.
    pub trace_patterns: Vec<String>,
    /// Headers whose values are hidden in request dumps. `["none"]` hides nothing.
    pub suppress_headers: Vec<String>,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "service".to_owned(),
            user_agent: None,
            endpoint: "0.0.0.0:8080".to_owned(),
            read_timeout_secs: 0,
            write_timeout_secs: 0,
            idle_timeout_secs: 0,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            trace_patterns: Vec::new(),
            suppress_headers: vec!["authorization".to_owned()],
            debug: false,
        }
    }
}

impl Config {
    pub fn endpoint_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.endpoint.parse().map_err(|_| ConfigError::Endpoint(self.endpoint.clone()))
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        secs(self.write_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        secs(self.idle_timeout_secs)
    }

    pub fn max_body_bytes(&self) -> Option<usize> {
        (self.max_body_bytes > 0).then_some(self.max_body_bytes)
    }

    pub(crate) fn compile(&self) -> Result<Settings, ConfigError> {
        let mut trace = Vec::new();
        for pattern in &self.trace_patterns {
            if trace.iter().any(|r: &Regex| r.as_str() == pattern) {
                continue;
            }
            let re = Regex::new(pattern).map_err(|source| ConfigError::TracePattern {
                pattern: pattern.clone(),
                source,
            })?;
            if self.debug {
                info!("{}: trace: {}", self.name, re);
            }
            trace.push(re);
        }

        let suppress = match self.suppress_headers.as_slice() {
            [only] if only.eq_ignore_ascii_case("none") => HashSet::new(),
            list => list.iter().map(|h| h.to_ascii_lowercase()).collect(),
        };

        Ok(Settings {
            name: self.name.clone(),
            user_agent: self.user_agent.clone().filter(|ua| !ua.is_empty()),
            trace,
            suppress,
        })
    }
}

fn secs(n: u64) -> Option<Duration> {
    (n > 0).then(|| Duration::from_secs(n))
}

/// Runtime form of the parts of [`Config`] the dispatcher uses.
#[derive(Debug)]
pub(crate) struct Settings {
    pub(crate) name: String,
    pub(crate) user_agent: Option<String>,
    pub(crate) trace: Vec<Regex>,
    pub(crate) suppress: HashSet<String>,
}

impl Settings {
    /// The first trace pattern matching `path`.
    pub(crate) fn trace_pattern(&self, path: &str) -> Option<&Regex> {
        self.trace.iter().find(|re| re.is_match(path))
    }

    pub(crate) fn is_suppressed(&self, header: &str) -> bool {
        self.suppress.contains(&header.to_ascii_lowercase())
    }
}
