use super::store::DynamicConfigStore;
use crate::config::peer::{validate_population, DEFAULT_ELECTION_ALG};
use crate::config::{ConfigContext, MembershipConfig};
use crate::quorum::{GroupId, QuorumPolicy, QuorumStrategy, QuorumVerifier, ServerId};
use crate::util::error::ConfigError;
use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MembershipState {
    Uninitialized,
    Active { version: u64 },
    ReconfigProposed { version: u64, next_version: u64 },
}

impl MembershipState {
    pub fn of(active: Option<&QuorumVerifier>, next: Option<&QuorumVerifier>) -> Self {
        match (active, next) {
            (None, _) => MembershipState::Uninitialized,
            (Some(active), None) => MembershipState::Active {
                version: active.version(),
            },
            (Some(active), Some(next)) => MembershipState::ReconfigProposed {
                version: active.version(),
                next_version: next.version(),
            },
        }
    }
}

/// Point-in-time view of the published membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipSnapshot {
    pub state: MembershipState,
    pub strategy: QuorumStrategy,
    pub version: u64,
    pub voting: Vec<ServerId>,
    pub observers: Vec<ServerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<BTreeMap<GroupId, Vec<ServerId>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_version: Option<u64>,
}

#[derive(Debug, Clone)]
struct Published {
    active: Arc<QuorumVerifier>,
    next: Option<Arc<QuorumVerifier>>,
}

/// Holds the active verifier and at most one pending proposal.
///
/// Readers clone an `Arc` under a short read lock and never observe a
/// half-applied change. Writers (`propose`, `commit`, `abandon`) are
/// serialised, and disk writes happen before the in-memory swap, so a failed
/// persist leaves the published state untouched.
#[derive(Debug)]
pub struct MembershipRegistry {
    context: ConfigContext,
    election_alg: u32,
    published: RwLock<Published>,
    writer: Mutex<()>,
    store: Option<DynamicConfigStore>,
}

impl MembershipRegistry {
    pub fn new(verifier: QuorumVerifier, context: ConfigContext) -> Self {
        Self {
            context,
            election_alg: DEFAULT_ELECTION_ALG,
            published: RwLock::new(Published {
                active: Arc::new(verifier),
                next: None,
            }),
            writer: Mutex::new(()),
            store: None,
        }
    }

    pub fn with_election_alg(mut self, election_alg: u32) -> Self {
        self.election_alg = election_alg;
        self
    }

    pub fn with_store(mut self, store: DynamicConfigStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Publishes a loaded configuration. A pending proposal that does not
    /// advance the active version is dropped with a warning.
    pub fn from_config(config: &MembershipConfig) -> Result<Self, ConfigError> {
        let active = config.quorum_verifier().ok_or(ConfigError::NotLoaded)?;
        let next = match config.next_verifier() {
            Some(next) if next.version() > active.version() => Some(next),
            Some(next) => {
                warn!(
                    "event=membership_next_ignored active={:x} next={:x}",
                    active.version(),
                    next.version()
                );
                None
            }
            None => None,
        };
        let store = config.dynamic_paths().map(|paths| {
            DynamicConfigStore::new(paths)
                .with_active_file(config.dynamic_config_file().map(|path| path.to_path_buf()))
        });
        info!(
            "event=membership_published version={:x} strategy={:?} voting={} pending={}",
            active.version(),
            active.strategy(),
            active.voting_members().len(),
            next.is_some()
        );
        Ok(Self {
            context: config.context(),
            election_alg: config.election_alg(),
            published: RwLock::new(Published { active, next }),
            writer: Mutex::new(()),
            store,
        })
    }

    pub fn context(&self) -> ConfigContext {
        self.context
    }

    pub fn store(&self) -> Option<&DynamicConfigStore> {
        self.store.as_ref()
    }

    pub fn current(&self) -> Arc<QuorumVerifier> {
        self.published.read().active.clone()
    }

    pub fn next(&self) -> Option<Arc<QuorumVerifier>> {
        self.published.read().next.clone()
    }

    pub fn version(&self) -> u64 {
        self.published.read().active.version()
    }

    pub fn state(&self) -> MembershipState {
        let published = self.published.read();
        MembershipState::of(Some(&*published.active), published.next.as_deref())
    }

    pub fn contains_quorum(&self, acks: &BTreeSet<ServerId>) -> bool {
        self.current().contains_quorum(acks)
    }

    /// Validates `verifier` and records it as the pending proposal, replacing
    /// any earlier one.
    pub fn propose(&self, verifier: QuorumVerifier) -> Result<Arc<QuorumVerifier>, ConfigError> {
        if !self.context.reconfig_enabled {
            return Err(ConfigError::ReconfigDisabled);
        }
        let _writer = self.writer.lock();
        let active = self.current();
        if verifier.version() <= active.version() {
            return Err(ConfigError::StaleVersion {
                active: active.version(),
                proposed: verifier.version(),
            });
        }
        validate_population(&verifier, self.election_alg, false, &self.context)?;
        if let Some(store) = &self.store {
            store.write_next(&verifier)?;
        }

        let proposed = Arc::new(verifier);
        let replaced = self.published.write().next.replace(proposed.clone());
        if let Some(replaced) = replaced {
            info!(
                "event=membership_proposal_replaced previous={:x}",
                replaced.version()
            );
        }
        info!(
            "event=membership_proposed active={:x} next={:x}",
            active.version(),
            proposed.version()
        );
        Ok(proposed)
    }

    /// Makes the pending proposal active and returns it.
    pub fn commit(&self) -> Result<Arc<QuorumVerifier>, ConfigError> {
        let _writer = self.writer.lock();
        let (active, next) = {
            let published = self.published.read();
            (published.active.clone(), published.next.clone())
        };
        let next = next.ok_or(ConfigError::NoPendingProposal)?;
        if next.version() <= active.version() {
            return Err(ConfigError::StaleVersion {
                active: active.version(),
                proposed: next.version(),
            });
        }
        if let Some(store) = &self.store {
            if self.context.reconfig_enabled && self.is_distributed(&active) {
                store.backup_static_once()?;
            }
            store.commit(&next)?;
        }

        *self.published.write() = Published {
            active: next.clone(),
            next: None,
        };
        info!(
            "event=membership_committed previous={:x} version={:x} voting={}",
            active.version(),
            next.version(),
            next.voting_members().len()
        );
        Ok(next)
    }

    /// Drops the pending proposal, if any, and returns it.
    pub fn abandon(&self) -> Option<Arc<QuorumVerifier>> {
        let _writer = self.writer.lock();
        let dropped = self.published.write().next.take();
        if let Some(dropped) = &dropped {
            if let Some(store) = &self.store {
                store.clear_next();
            }
            info!("event=membership_proposal_abandoned next={:x}", dropped.version());
        }
        dropped
    }

    /// Proposes and commits in one step.
    pub fn reconfigure(&self, verifier: QuorumVerifier) -> Result<Arc<QuorumVerifier>, ConfigError> {
        self.propose(verifier)?;
        self.commit()
    }

    pub fn snapshot(&self) -> MembershipSnapshot {
        let published = self.published.read().clone();
        let active = &published.active;
        MembershipSnapshot {
            state: MembershipState::of(Some(&**active), published.next.as_deref()),
            strategy: active.strategy(),
            version: active.version(),
            voting: active.voting_members().keys().copied().collect(),
            observers: active.observing_members().keys().copied().collect(),
            groups: active.as_hierarchical().map(|qv| qv.groups()),
            next_version: published.next.as_ref().map(|next| next.version()),
        }
    }

    pub fn snapshot_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshot())
    }

    fn is_distributed(&self, verifier: &QuorumVerifier) -> bool {
        !self.context.standalone_enabled || verifier.voting_members().len() > 1
    }
}
