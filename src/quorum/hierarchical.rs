use super::members::{
    parse_id, parse_version, MemberSet, GROUP_PREFIX, VERSION_KEY, WEIGHT_PREFIX,
};
use super::server::{QuorumServer, ServerId};
use super::QuorumPolicy;
use crate::config::properties::Properties;
use crate::util::error::ConfigError;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub type GroupId = u64;

/// Weighted groups: a group is carried by a weighted majority of its members,
/// and a quorum is a majority of the groups that carry any weight.
///
/// Groups whose total weight is zero are left out of the group count, so
/// acknowledgements from their members never help form a quorum.
#[derive(Debug, Clone)]
pub struct HierarchicalVerifier {
    members: MemberSet,
    server_weight: BTreeMap<ServerId, u64>,
    server_group: BTreeMap<ServerId, GroupId>,
    group_weight: BTreeMap<GroupId, u64>,
    num_groups: usize,
    version: u64,
}

impl HierarchicalVerifier {
    /// `groups` maps a group id to its member ids; `weights` overrides the
    /// default weight of 1 for individual participants.
    pub fn new(
        servers: impl IntoIterator<Item = QuorumServer>,
        groups: BTreeMap<GroupId, Vec<ServerId>>,
        weights: BTreeMap<ServerId, u64>,
        version: u64,
    ) -> Result<Self, ConfigError> {
        let members = MemberSet::from_servers(servers)?;
        Self::build(members, groups, weights, version)
    }

    /// Builds from `server.<id>`, `group.<gid>`, `weight.<id>` and `version`
    /// entries; other keys are ignored.
    pub fn from_properties(props: &Properties) -> Result<Self, ConfigError> {
        let members = MemberSet::from_properties(props)?;
        let mut groups = BTreeMap::new();
        let mut weights = BTreeMap::new();
        for (key, value) in props.iter() {
            if let Some(suffix) = key.strip_prefix(GROUP_PREFIX) {
                let gid = parse_id(key, suffix)?;
                let ids = value
                    .split(':')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(|part| parse_id(key, part))
                    .collect::<Result<Vec<_>, _>>()?;
                groups.insert(gid, ids);
            } else if let Some(suffix) = key.strip_prefix(WEIGHT_PREFIX) {
                let sid = parse_id(key, suffix)?;
                let weight = value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| ConfigError::invalid(key, value, "weight is not a number"))?;
                weights.insert(sid, weight);
            }
        }
        Self::build(members, groups, weights, parse_version(props)?)
    }

    fn build(
        members: MemberSet,
        groups: BTreeMap<GroupId, Vec<ServerId>>,
        weights: BTreeMap<ServerId, u64>,
        version: u64,
    ) -> Result<Self, ConfigError> {
        if members.voting().is_empty() {
            return Err(ConfigError::Population(
                "hierarchical membership has no participants".into(),
            ));
        }
        let mut server_group = BTreeMap::new();
        for (gid, ids) in &groups {
            if ids.is_empty() {
                return Err(ConfigError::invalid(
                    format!("{GROUP_PREFIX}{gid}"),
                    "",
                    "group has no members",
                ));
            }
            for sid in ids {
                if !members.voting().contains_key(sid) {
                    return Err(ConfigError::UnknownGroupMember {
                        key: format!("{GROUP_PREFIX}{gid}"),
                        server: *sid,
                    });
                }
                if let Some(first) = server_group.insert(*sid, *gid) {
                    return Err(ConfigError::DuplicateGroupMembership {
                        server: *sid,
                        first,
                        second: *gid,
                    });
                }
            }
        }

        let mut server_weight = BTreeMap::new();
        for (sid, weight) in weights {
            if !members.voting().contains_key(&sid) {
                return Err(ConfigError::UnknownGroupMember {
                    key: format!("{WEIGHT_PREFIX}{sid}"),
                    server: sid,
                });
            }
            server_weight.insert(sid, weight);
        }

        for sid in members.voting().keys() {
            if !server_group.contains_key(sid) {
                return Err(ConfigError::UngroupedParticipant { server: *sid });
            }
            server_weight.entry(*sid).or_insert(1);
        }

        let mut group_weight: BTreeMap<GroupId, u64> = groups.keys().map(|gid| (*gid, 0)).collect();
        for (sid, gid) in &server_group {
            let weight = server_weight.get(sid).copied().unwrap_or(0);
            let total = group_weight.entry(*gid).or_insert(0);
            *total = total.checked_add(weight).ok_or_else(|| {
                ConfigError::invalid(
                    format!("{WEIGHT_PREFIX}{sid}"),
                    weight.to_string(),
                    format!("weight of group {gid} overflows"),
                )
            })?;
        }
        let num_groups = group_weight.values().filter(|weight| **weight > 0).count();
        for (gid, weight) in &group_weight {
            if *weight == 0 {
                debug!("event=quorum_zero_weight_group group={gid} counted_groups={num_groups}");
            }
        }

        Ok(Self {
            members,
            server_weight,
            server_group,
            group_weight,
            num_groups,
            version,
        })
    }

    pub fn group_of(&self, id: ServerId) -> Option<GroupId> {
        self.server_group.get(&id).copied()
    }

    pub fn group_weight(&self, gid: GroupId) -> Option<u64> {
        self.group_weight.get(&gid).copied()
    }

    /// Groups with non-zero total weight.
    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    pub fn groups(&self) -> BTreeMap<GroupId, Vec<ServerId>> {
        let mut groups: BTreeMap<GroupId, Vec<ServerId>> = BTreeMap::new();
        for (sid, gid) in &self.server_group {
            groups.entry(*gid).or_default().push(*sid);
        }
        groups
    }

    pub fn with_version(&self, version: u64) -> Self {
        Self {
            version,
            ..self.clone()
        }
    }

    pub fn structurally_equal(&self, other: &Self) -> bool {
        self.members == other.members
            && self.server_weight == other.server_weight
            && self.server_group == other.server_group
            && self.group_weight == other.group_weight
    }
}

impl QuorumPolicy for HierarchicalVerifier {
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
        self.server_weight.get(&id).copied()
    }

    fn contains_quorum(&self, acks: &BTreeSet<ServerId>) -> bool {
        if acks.is_empty() {
            return false;
        }

        let mut ack_weight: BTreeMap<GroupId, u64> = BTreeMap::new();
        for sid in acks {
            let Some(gid) = self.server_group.get(sid) else {
                continue;
            };
            let weight = self.server_weight.get(sid).copied().unwrap_or(0);
            let total = ack_weight.entry(*gid).or_insert(0);
            *total = total.saturating_add(weight);
        }

        let carried = ack_weight
            .iter()
            .filter(|(gid, weight)| {
                let total = self.group_weight.get(*gid).copied().unwrap_or(0);
                **weight > total / 2
            })
            .count();

        let reached = carried > self.num_groups / 2;
        debug!(
            "event=quorum_hierarchical_check acks={} carried_groups={} counted_groups={} quorum={}",
            acks.len(),
            carried,
            self.num_groups,
            reached
        );
        reached
    }
}

impl PartialEq for HierarchicalVerifier {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version || self.structurally_equal(other)
    }
}

impl fmt::Display for HierarchicalVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.members.write_server_lines(&mut out);
        for (gid, ids) in self.groups() {
            let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
            out.push_str(&format!("{GROUP_PREFIX}{gid}={}\n", ids.join(":")));
        }
        for (sid, weight) in &self.server_weight {
            out.push_str(&format!("{WEIGHT_PREFIX}{sid}={weight}\n"));
        }
        write!(f, "{out}{VERSION_KEY}={:x}", self.version)
    }
}
