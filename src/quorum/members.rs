use super::server::{QuorumServer, ServerId};
use crate::config::properties::Properties;
use crate::util::error::ConfigError;
use std::collections::BTreeMap;

pub(crate) const SERVER_PREFIX: &str = "server.";
pub(crate) const GROUP_PREFIX: &str = "group.";
pub(crate) const WEIGHT_PREFIX: &str = "weight.";
pub(crate) const VERSION_KEY: &str = "version";

/// Every member plus its voting/observing partition. Each member lands in
/// exactly one of the two partitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct MemberSet {
    all: BTreeMap<ServerId, QuorumServer>,
    voting: BTreeMap<ServerId, QuorumServer>,
    observing: BTreeMap<ServerId, QuorumServer>,
}

impl MemberSet {
    pub(crate) fn from_servers(
        servers: impl IntoIterator<Item = QuorumServer>,
    ) -> Result<Self, ConfigError> {
        let mut members = MemberSet::default();
        for server in servers {
            members.insert(server)?;
        }
        Ok(members)
    }

    pub(crate) fn from_properties(props: &Properties) -> Result<Self, ConfigError> {
        let mut members = MemberSet::default();
        for (key, value) in props.iter() {
            if let Some(suffix) = key.strip_prefix(SERVER_PREFIX) {
                let id = parse_id(key, suffix)?;
                members.insert(QuorumServer::parse(id, value)?)?;
            }
        }
        Ok(members)
    }

    fn insert(&mut self, server: QuorumServer) -> Result<(), ConfigError> {
        let id = server.id();
        if self.all.contains_key(&id) {
            return Err(ConfigError::DuplicateServer { server: id });
        }
        if server.is_participant() {
            self.voting.insert(id, server.clone());
        } else {
            self.observing.insert(id, server.clone());
        }
        self.all.insert(id, server);
        Ok(())
    }

    pub(crate) fn all(&self) -> &BTreeMap<ServerId, QuorumServer> {
        &self.all
    }

    pub(crate) fn voting(&self) -> &BTreeMap<ServerId, QuorumServer> {
        &self.voting
    }

    pub(crate) fn observing(&self) -> &BTreeMap<ServerId, QuorumServer> {
        &self.observing
    }

    pub(crate) fn write_server_lines(&self, out: &mut String) {
        for server in self.all.values() {
            out.push_str(&format!("{SERVER_PREFIX}{}={server}\n", server.id()));
        }
    }
}

/// Numeric suffix of a `server.`/`group.`/`weight.` key.
pub(crate) fn parse_id(key: &str, suffix: &str) -> Result<u64, ConfigError> {
    suffix
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::invalid(key, suffix, "identifier is not a number"))
}

/// Reads the optional hex `version` entry; absent means 0.
pub(crate) fn parse_version(props: &Properties) -> Result<u64, ConfigError> {
    match props.get(VERSION_KEY) {
        Some(raw) => u64::from_str_radix(raw.trim(), 16)
            .map_err(|_| ConfigError::invalid(VERSION_KEY, raw, "not a hex number")),
        None => Ok(0),
    }
}
