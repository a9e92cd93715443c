//! Loading static and dynamic membership configuration.

pub mod context;
pub mod dynamic;
pub mod peer;
pub mod properties;

pub use context::ConfigContext;
pub use dynamic::{
    backup_static_config, edit_static_config, next_file_for, version_from_filename,
    write_dynamic_config, DynamicConfigPaths,
};
pub use peer::{parse_dynamic_config, validate_population, MembershipConfig, QuorumAuthSettings};
pub use properties::Properties;
