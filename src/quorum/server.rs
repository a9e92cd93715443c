use crate::util::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Identifier of a cluster member (the value of its `myid` file).
pub type ServerId = u64;

/// Whether a member votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LearnerRole {
    Participant,
    Observer,
}

impl LearnerRole {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "participant" => Some(LearnerRole::Participant),
            "observer" => Some(LearnerRole::Observer),
            _ => None,
        }
    }

    pub fn is_voting(self) -> bool {
        matches!(self, LearnerRole::Participant)
    }
}

impl fmt::Display for LearnerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LearnerRole::Participant => write!(f, "participant"),
            LearnerRole::Observer => write!(f, "observer"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

/// Unresolved `host:port` pair. Hosts stay textual; no lookups are performed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let host = host
            .strip_prefix('[')
            .and_then(|inner| inner.strip_suffix(']'))
            .map(str::to_string)
            .unwrap_or(host);
        Self { host, port }
    }

    /// Endpoint listening on every local address.
    pub fn wildcard(port: u16) -> Self {
        Self::new("0.0.0.0", port)
    }

    /// Parses `host:port` or `[v6]:port`.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let parts = split_host_and_port(value)?;
        match parts.as_slice() {
            [host, port] => Self::from_parts(host, port, value),
            _ => Err(ConfigError::invalid(
                "endpoint",
                value,
                "expected host:port",
            )),
        }
    }

    fn from_parts(host: &str, port: &str, raw: &str) -> Result<Self, ConfigError> {
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::invalid("endpoint", raw, "port is not a number"))?;
        Ok(Self::new(host.trim(), port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }

    pub fn family(&self) -> Option<AddressFamily> {
        self.ip().map(|ip| match ip {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        })
    }

    pub fn is_wildcard(&self) -> bool {
        self.host.is_empty() || self.ip().map(|ip| ip.is_unspecified()).unwrap_or(false)
    }

    /// Whether a locally configured endpoint agrees with one declared in the
    /// membership. A wildcard local address only has to agree on the port.
    pub fn agrees_with(&self, declared: &Endpoint) -> bool {
        if self.is_wildcard() {
            self.port == declared.port
        } else {
            self == declared
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Splits on `:` while keeping bracketed IPv6 literals intact.
pub fn split_host_and_port(value: &str) -> Result<Vec<String>, ConfigError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '[' if current.is_empty() => {
                let mut literal = String::from("[");
                let mut closed = false;
                for inner in chars.by_ref() {
                    literal.push(inner);
                    if inner == ']' {
                        closed = true;
                        break;
                    }
                }
                if !closed || !matches!(chars.peek(), Some(':') | None) {
                    return Err(ConfigError::invalid(
                        "endpoint",
                        value,
                        "starts with '[' but has no matching ']:'",
                    ));
                }
                current = literal;
            }
            ':' => parts.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    parts.push(current);
    Ok(parts)
}

/// One member of the cluster as declared by a `server.<id>` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuorumServer {
    id: ServerId,
    election_addr: Option<Endpoint>,
    client_addr: Option<Endpoint>,
    role: LearnerRole,
}

impl QuorumServer {
    pub fn new(
        id: ServerId,
        election_addr: Option<Endpoint>,
        client_addr: Option<Endpoint>,
        role: LearnerRole,
    ) -> Self {
        Self {
            id,
            election_addr,
            client_addr,
            role,
        }
    }

    pub fn participant(id: ServerId, election_addr: Endpoint) -> Self {
        Self::new(id, Some(election_addr), None, LearnerRole::Participant)
    }

    pub fn observer(id: ServerId, election_addr: Endpoint) -> Self {
        Self::new(id, Some(election_addr), None, LearnerRole::Observer)
    }

    pub fn with_client_addr(mut self, client_addr: Endpoint) -> Self {
        self.client_addr = Some(client_addr);
        self
    }

    /// Parses the value of a `server.<id>` entry:
    /// `[host:electionPort[:clientHost:clientPort]][:role]`.
    pub fn parse(id: ServerId, value: &str) -> Result<Self, ConfigError> {
        let key = format!("server.{id}");
        let mut tokens = split_host_and_port(value.trim())?;
        let mut role = LearnerRole::Participant;
        if let Some(parsed) = tokens.last().and_then(|last| LearnerRole::parse(last)) {
            role = parsed;
            tokens.pop();
        } else if let Some(last) = tokens.last() {
            if !last.is_empty() && last.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(ConfigError::invalid(key, value, "unrecognised role"));
            }
        }
        if tokens.len() == 1 && tokens[0].is_empty() {
            tokens.clear();
        }

        let (election_addr, client_addr) = match tokens.as_slice() {
            [] => (None, None),
            [host, port] => (endpoint_pair(&key, value, host, port)?, None),
            [host, port, client_host, client_port] => (
                endpoint_pair(&key, value, host, port)?,
                endpoint_pair(&key, value, client_host, client_port)?,
            ),
            _ => {
                return Err(ConfigError::invalid(
                    key,
                    value,
                    "expected host:port[:clientHost:clientPort][:role]",
                ))
            }
        };

        Ok(Self {
            id,
            election_addr,
            client_addr,
            role,
        })
    }

    pub fn id(&self) -> ServerId {
        self.id
    }

    pub fn election_addr(&self) -> Option<&Endpoint> {
        self.election_addr.as_ref()
    }

    pub fn client_addr(&self) -> Option<&Endpoint> {
        self.client_addr.as_ref()
    }

    pub fn role(&self) -> LearnerRole {
        self.role
    }

    pub fn is_participant(&self) -> bool {
        self.role.is_voting()
    }
}

fn endpoint_pair(
    key: &str,
    raw: &str,
    host: &str,
    port: &str,
) -> Result<Option<Endpoint>, ConfigError> {
    if host.is_empty() && port.is_empty() {
        return Ok(None);
    }
    let port = port
        .trim()
        .parse::<u16>()
        .map_err(|_| ConfigError::invalid(key, raw, "port is not a number"))?;
    Ok(Some(Endpoint::new(host.trim(), port)))
}

impl fmt::Display for QuorumServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.election_addr, &self.client_addr) {
            (Some(election), Some(client)) => write!(f, "{election}:{client}:")?,
            (Some(election), None) => write!(f, "{election}:")?,
            (None, Some(client)) => write!(f, "::{client}:")?,
            (None, None) => {}
        }
        write!(f, "{}", self.role)
    }
}
