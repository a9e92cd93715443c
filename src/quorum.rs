//! Quorum certification: member identities plus the majority and
//! hierarchical strategies, both immutable once built.

pub mod hierarchical;
pub mod majority;
mod members;
pub mod server;
pub mod verifier;

pub use hierarchical::{GroupId, HierarchicalVerifier};
pub use majority::MajorityVerifier;
pub use server::{split_host_and_port, AddressFamily, Endpoint, LearnerRole, QuorumServer, ServerId};
pub use verifier::{client_connect_string, QuorumPolicy, QuorumStrategy, QuorumVerifier};
