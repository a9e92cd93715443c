use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The single failure kind raised while loading, validating, or applying a
/// membership configuration. Nothing here is retried internally.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed entry at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("server {server} is declared more than once")]
    DuplicateServer { server: u64 },

    #[error("server {server} is in multiple groups ({first} and {second})")]
    DuplicateGroupMembership { server: u64, first: u64, second: u64 },

    #[error("participant {server} is not in a group")]
    UngroupedParticipant { server: u64 },

    #[error("{key} references server {server}, which is not a participant")]
    UnknownGroupMember { key: String, server: u64 },

    #[error("{0} is not set")]
    MissingSetting(&'static str),

    #[error("parameter {key} must be in a separate dynamic config file")]
    MembershipInStaticFile { key: String },

    #[error("unrecognised parameter: {key}")]
    UnrecognisedParameter { key: String },

    #[error("dynamic config file {path} must not carry a version entry")]
    VersionInDynamicFile { path: PathBuf },

    #[error(
        "client address for server {server} in static config is {configured}, \
         which differs from {declared} in the dynamic membership"
    )]
    ClientEndpointConflict {
        server: u64,
        configured: String,
        declared: String,
    },

    #[error("{key} is set but {requires} is not set")]
    AddressWithoutPort {
        key: &'static str,
        requires: &'static str,
    },

    #[error("address family mismatch: {first} and {second}")]
    AddressFamilyMismatch { first: String, second: String },

    #[error("missing election endpoint for server {server}")]
    MissingElectionEndpoint { server: u64 },

    #[error("{prerequisite} is disabled, so cannot enable {dependent}")]
    AuthDependency {
        prerequisite: &'static str,
        dependent: &'static str,
    },

    #[error("invalid membership population: {0}")]
    Population(String),

    #[error("minSessionTimeout {min} must not be larger than maxSessionTimeout {max}")]
    SessionTimeoutRange { min: u32, max: u32 },

    #[error("reconfiguration version {proposed:#x} does not advance active version {active:#x}")]
    StaleVersion { active: u64, proposed: u64 },

    #[error("no reconfiguration proposal is pending")]
    NoPendingProposal,

    #[error("reconfiguration is disabled")]
    ReconfigDisabled,

    #[error("no membership has been loaded")]
    NotLoaded,

    #[error("{path} file is missing")]
    MissingFile { path: PathBuf },

    #[error("error processing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConfigError::InvalidValue {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_setting() {
        let err = ConfigError::AuthDependency {
            prerequisite: "quorum.auth.enableSasl",
            dependent: "quorum.auth.serverRequireSasl",
        };
        assert_eq!(
            err.to_string(),
            "quorum.auth.enableSasl is disabled, so cannot enable quorum.auth.serverRequireSasl"
        );

        let err = ConfigError::StaleVersion {
            active: 0x100,
            proposed: 0x100,
        };
        assert!(err.to_string().contains("0x100"));
    }
}
