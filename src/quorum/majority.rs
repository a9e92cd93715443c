use super::members::{parse_version, MemberSet, VERSION_KEY};
use super::server::{QuorumServer, ServerId};
use super::QuorumPolicy;
use crate::config::properties::Properties;
use crate::util::error::ConfigError;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Strict majority of the voting members.
///
/// Equality follows the version shortcut documented on
/// [`QuorumVerifier`](super::QuorumVerifier): equal versions compare equal
/// without looking at membership.
#[derive(Debug, Clone)]
pub struct MajorityVerifier {
    members: MemberSet,
    half: usize,
    version: u64,
}

impl MajorityVerifier {
    pub fn new(
        servers: impl IntoIterator<Item = QuorumServer>,
        version: u64,
    ) -> Result<Self, ConfigError> {
        Ok(Self::from_members(MemberSet::from_servers(servers)?, version))
    }

    /// Builds from `server.<id>` and `version` entries; other keys are ignored.
    pub fn from_properties(props: &Properties) -> Result<Self, ConfigError> {
        let members = MemberSet::from_properties(props)?;
        Ok(Self::from_members(members, parse_version(props)?))
    }

    fn from_members(members: MemberSet, version: u64) -> Self {
        let half = members.voting().len() / 2;
        Self {
            members,
            half,
            version,
        }
    }

    pub fn half(&self) -> usize {
        self.half
    }

    pub fn with_version(&self, version: u64) -> Self {
        Self {
            version,
            ..self.clone()
        }
    }

    pub fn structurally_equal(&self, other: &Self) -> bool {
        self.members == other.members
    }
}

impl QuorumPolicy for MajorityVerifier {
    fn version(&self) -> u64 {
        self.version
    }

    fn all_members(&self) -> &BTreeMap<ServerId, QuorumServer> {
        self.members.all()
    }

    fn voting_members(&self) -> &BTreeMap<ServerId, QuorumServer> {
        self.members.voting()
    }

    fn observing_members(&self) -> &BTreeMap<ServerId, QuorumServer> {
        self.members.observing()
    }

    fn weight(&self, id: ServerId) -> Option<u64> {
        self.members.all().contains_key(&id).then_some(1)
    }

    fn contains_quorum(&self, acks: &BTreeSet<ServerId>) -> bool {
        let voters = self.members.voting();
        acks.iter().filter(|id| voters.contains_key(id)).count() > self.half
    }
}

impl PartialEq for MajorityVerifier {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version || self.structurally_equal(other)
    }
}

impl fmt::Display for MajorityVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.members.write_server_lines(&mut out);
        write!(f, "{out}{VERSION_KEY}={:x}", self.version)
    }
}
