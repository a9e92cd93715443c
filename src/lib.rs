//! Membership and quorum certification for a replicated coordination
//! service: parsing static and dynamic configuration, majority and
//! hierarchical quorum strategies, and versioned reconfiguration with
//! atomic persistence.

pub mod config;
pub mod membership;
pub mod persistence;
pub mod quorum;
pub mod util;

pub use config::{
    parse_dynamic_config, ConfigContext, DynamicConfigPaths, MembershipConfig, Properties,
    QuorumAuthSettings,
};
pub use membership::{DynamicConfigStore, MembershipRegistry, MembershipSnapshot, MembershipState};
pub use persistence::{write_atomic, AtomicFileWriter};
pub use quorum::{
    client_connect_string, Endpoint, GroupId, HierarchicalVerifier, LearnerRole, MajorityVerifier,
    QuorumPolicy, QuorumServer, QuorumStrategy, QuorumVerifier, ServerId,
};
pub use util::ConfigError;
