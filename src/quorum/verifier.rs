use super::hierarchical::HierarchicalVerifier;
use super::majority::MajorityVerifier;
use super::members::{parse_id, GROUP_PREFIX, SERVER_PREFIX, VERSION_KEY, WEIGHT_PREFIX};
use super::server::{QuorumServer, ServerId};
use crate::config::properties::Properties;
use crate::util::error::ConfigError;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Quorum certification over an immutable membership.
///
/// Implementations hold no interior mutability, so every method is safe to
/// call from any number of threads without locking.
pub trait QuorumPolicy {
    fn version(&self) -> u64;

    fn all_members(&self) -> &BTreeMap<ServerId, QuorumServer>;

    fn voting_members(&self) -> &BTreeMap<ServerId, QuorumServer>;

    fn observing_members(&self) -> &BTreeMap<ServerId, QuorumServer>;

    /// Weight of a known voting member. `None` when the strategy holds no
    /// weight for `id`; callers should only ask about members they know.
    fn weight(&self, id: ServerId) -> Option<u64>;

    /// Whether `acks` certifies a decision. Ids outside the voting set are
    /// ignored.
    fn contains_quorum(&self, acks: &BTreeSet<ServerId>) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuorumStrategy {
    Majority,
    Hierarchical,
}

impl QuorumStrategy {
    /// Any `group.*` or `weight.*` entry selects the hierarchical strategy.
    pub fn detect(props: &Properties) -> Self {
        let hierarchical = props
            .keys()
            .any(|key| key.starts_with(GROUP_PREFIX) || key.starts_with(WEIGHT_PREFIX));
        if hierarchical {
            QuorumStrategy::Hierarchical
        } else {
            QuorumStrategy::Majority
        }
    }
}

/// The active quorum strategy, chosen once when a membership is parsed.
///
/// # Equality
///
/// Two verifiers of the same strategy with the same `version` compare equal
/// **without** looking at their membership: the version is assumed to
/// identify the content. Only when versions differ is the membership (and,
/// for the hierarchical strategy, groups and weights) compared. Use
/// [`QuorumVerifier::structurally_equal`] when content must be checked.
/// [`MembershipRegistry`](crate::MembershipRegistry) only commits strictly
/// increasing versions, so a live cluster never publishes two memberships
/// under one version.
///
/// The type implements neither `Eq` nor `Hash` and cannot key hash-based
/// containers.
#[derive(Debug, Clone)]
pub enum QuorumVerifier {
    Majority(MajorityVerifier),
    Hierarchical(HierarchicalVerifier),
}

impl QuorumVerifier {
    pub fn from_properties(props: &Properties) -> Result<Self, ConfigError> {
        match QuorumStrategy::detect(props) {
            QuorumStrategy::Majority => Ok(MajorityVerifier::from_properties(props)?.into()),
            QuorumStrategy::Hierarchical => {
                Ok(HierarchicalVerifier::from_properties(props)?.into())
            }
        }
    }

    pub fn strategy(&self) -> QuorumStrategy {
        match self {
            QuorumVerifier::Majority(_) => QuorumStrategy::Majority,
            QuorumVerifier::Hierarchical(_) => QuorumStrategy::Hierarchical,
        }
    }

    /// Copy of this verifier stamped with `version`.
    pub fn with_version(&self, version: u64) -> Self {
        match self {
            QuorumVerifier::Majority(qv) => qv.with_version(version).into(),
            QuorumVerifier::Hierarchical(qv) => qv.with_version(version).into(),
        }
    }

    /// Content comparison that ignores `version`.
    pub fn structurally_equal(&self, other: &QuorumVerifier) -> bool {
        match (self, other) {
            (QuorumVerifier::Majority(a), QuorumVerifier::Majority(b)) => a.structurally_equal(b),
            (QuorumVerifier::Hierarchical(a), QuorumVerifier::Hierarchical(b)) => {
                a.structurally_equal(b)
            }
            _ => false,
        }
    }

    /// Canonical `key=value` text; parsing it back yields a structurally
    /// equal verifier.
    pub fn to_config_text(&self) -> String {
        self.to_string()
    }

    pub fn as_hierarchical(&self) -> Option<&HierarchicalVerifier> {
        match self {
            QuorumVerifier::Hierarchical(qv) => Some(qv),
            QuorumVerifier::Majority(_) => None,
        }
    }
}

impl QuorumPolicy for QuorumVerifier {
    fn version(&self) -> u64 {
        match self {
            QuorumVerifier::Majority(qv) => qv.version(),
            QuorumVerifier::Hierarchical(qv) => qv.version(),
        }
    }

    fn all_members(&self) -> &BTreeMap<ServerId, QuorumServer> {
        match self {
            QuorumVerifier::Majority(qv) => qv.all_members(),
            QuorumVerifier::Hierarchical(qv) => qv.all_members(),
        }
    }

    fn voting_members(&self) -> &BTreeMap<ServerId, QuorumServer> {
        match self {
            QuorumVerifier::Majority(qv) => qv.voting_members(),
            QuorumVerifier::Hierarchical(qv) => qv.voting_members(),
        }
    }

    fn observing_members(&self) -> &BTreeMap<ServerId, QuorumServer> {
        match self {
            QuorumVerifier::Majority(qv) => qv.observing_members(),
            QuorumVerifier::Hierarchical(qv) => qv.observing_members(),
        }
    }

    fn weight(&self, id: ServerId) -> Option<u64> {
        match self {
            QuorumVerifier::Majority(qv) => qv.weight(id),
            QuorumVerifier::Hierarchical(qv) => qv.weight(id),
        }
    }

    fn contains_quorum(&self, acks: &BTreeSet<ServerId>) -> bool {
        match self {
            QuorumVerifier::Majority(qv) => qv.contains_quorum(acks),
            QuorumVerifier::Hierarchical(qv) => qv.contains_quorum(acks),
        }
    }
}

impl PartialEq for QuorumVerifier {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (QuorumVerifier::Majority(a), QuorumVerifier::Majority(b)) => a == b,
            (QuorumVerifier::Hierarchical(a), QuorumVerifier::Hierarchical(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for QuorumVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuorumVerifier::Majority(qv) => fmt::Display::fmt(qv, f),
            QuorumVerifier::Hierarchical(qv) => fmt::Display::fmt(qv, f),
        }
    }
}

impl FromStr for QuorumVerifier {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        QuorumVerifier::from_properties(&text.parse()?)
    }
}

impl From<MajorityVerifier> for QuorumVerifier {
    fn from(qv: MajorityVerifier) -> Self {
        QuorumVerifier::Majority(qv)
    }
}

impl From<HierarchicalVerifier> for QuorumVerifier {
    fn from(qv: HierarchicalVerifier) -> Self {
        QuorumVerifier::Hierarchical(qv)
    }
}

/// Client connect string for a membership text: `"<version> h1:p1,h2:p2"`,
/// listing the client endpoint of every server that declares one. Entries
/// that fail to parse are skipped.
pub fn client_connect_string(config_text: &str) -> Result<String, ConfigError> {
    let props: Properties = config_text.parse()?;
    let version = props.get(VERSION_KEY).unwrap_or("");
    let mut endpoints = Vec::new();
    for (key, value) in props.iter() {
        let Some(suffix) = key.strip_prefix(SERVER_PREFIX) else {
            continue;
        };
        let parsed = parse_id(key, suffix).and_then(|id| QuorumServer::parse(id, value));
        match parsed {
            Ok(server) => {
                if let Some(client) = server.client_addr() {
                    endpoints.push(client.to_string());
                }
            }
            Err(err) => warn!("event=client_connect_string_skip key={key} error={err}"),
        }
    }
    Ok(format!("{version} {}", endpoints.join(",")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAJORITY: &str = "server.1=zk1:3888:zk1:2181\nserver.2=zk2:3888:zk2:2181\n\
        server.3=zk3:3888:observer\nversion=100";

    #[test]
    fn strategy_follows_group_and_weight_keys() {
        let qv: QuorumVerifier = MAJORITY.parse().unwrap();
        assert_eq!(qv.strategy(), QuorumStrategy::Majority);
        assert_eq!(qv.version(), 0x100);

        let qv: QuorumVerifier = "server.1=zk1:3888\nweight.1=2\ngroup.1=1".parse().unwrap();
        assert_eq!(qv.strategy(), QuorumStrategy::Hierarchical);
        assert_eq!(qv.weight(1), Some(2));
    }

    #[test]
    fn equal_versions_short_circuit_content() {
        let a: QuorumVerifier = MAJORITY.parse().unwrap();
        let b: QuorumVerifier = "server.9=zk9:3888\nversion=100".parse().unwrap();
        assert!(a == b);
        assert!(!a.structurally_equal(&b));

        let c = b.with_version(0x101);
        assert!(a != c);
        assert!(a == a.with_version(0x200));
    }

    #[test]
    fn strategies_never_compare_equal() {
        let majority: QuorumVerifier = "server.1=zk1:3888\nversion=1".parse().unwrap();
        let hierarchical: QuorumVerifier =
            "server.1=zk1:3888\ngroup.1=1\nversion=1".parse().unwrap();
        assert!(majority != hierarchical);
        assert!(!majority.structurally_equal(&hierarchical));
    }

    #[test]
    fn connect_string_lists_client_endpoints() {
        assert_eq!(
            client_connect_string(MAJORITY).unwrap(),
            "100 zk1:2181,zk2:2181"
        );
    }
}
