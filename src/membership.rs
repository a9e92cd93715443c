//! Published membership and the reconfiguration lifecycle around it.

pub mod registry;
pub mod store;

pub use registry::{MembershipRegistry, MembershipSnapshot, MembershipState};
pub use store::DynamicConfigStore;
