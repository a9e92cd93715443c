use super::context::ConfigContext;
use super::dynamic::{
    is_membership_key, next_file_for, version_from_filename, DynamicConfigPaths,
    DYNAMIC_CONFIG_KEY,
};
use super::properties::Properties;
use crate::membership::MembershipState;
use crate::quorum::{Endpoint, LearnerRole, QuorumPolicy, QuorumServer, QuorumVerifier, ServerId};
use crate::util::config::{config_dir, resolve_relative, PathChecks};
use crate::util::error::ConfigError;
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const MIN_SNAP_RETAIN_COUNT: u32 = 3;
pub const DEFAULT_TICK_TIME: u32 = 3000;
pub const DEFAULT_ELECTION_ALG: u32 = 3;
pub const DEFAULT_MAX_CLIENT_CNXNS: u32 = 60;
pub const MYID_FILE: &str = "myid";

pub const SASL_AUTH_ENABLED: &str = "quorum.auth.enableSasl";
pub const SASL_SERVER_REQUIRED: &str = "quorum.auth.serverRequireSasl";
pub const SASL_LEARNER_REQUIRED: &str = "quorum.auth.learnerRequireSasl";
pub const SASL_LEARNER_LOGIN_CONTEXT: &str = "quorum.auth.learner.saslLoginContext";
pub const SASL_SERVER_LOGIN_CONTEXT: &str = "quorum.auth.server.saslLoginContext";
pub const SASL_SERVICE_PRINCIPAL: &str = "quorum.auth.kerberos.servicePrincipal";

/// SASL settings for connections between members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuorumAuthSettings {
    pub enable_sasl: bool,
    pub server_require_sasl: bool,
    pub learner_require_sasl: bool,
    pub learner_login_context: String,
    pub server_login_context: String,
    pub service_principal: String,
}

impl Default for QuorumAuthSettings {
    fn default() -> Self {
        Self {
            enable_sasl: false,
            server_require_sasl: false,
            learner_require_sasl: false,
            learner_login_context: "QuorumLearner".to_string(),
            server_login_context: "QuorumServer".to_string(),
            service_principal: "quorum/localhost".to_string(),
        }
    }
}

impl QuorumAuthSettings {
    /// server-required implies learner-required implies enabled.
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.enable_sasl && self.server_require_sasl {
            return Err(ConfigError::AuthDependency {
                prerequisite: SASL_AUTH_ENABLED,
                dependent: SASL_SERVER_REQUIRED,
            });
        }
        if !self.enable_sasl && self.learner_require_sasl {
            return Err(ConfigError::AuthDependency {
                prerequisite: SASL_AUTH_ENABLED,
                dependent: SASL_LEARNER_REQUIRED,
            });
        }
        if !self.learner_require_sasl && self.server_require_sasl {
            return Err(ConfigError::AuthDependency {
                prerequisite: SASL_LEARNER_REQUIRED,
                dependent: SASL_SERVER_REQUIRED,
            });
        }
        Ok(())
    }
}

/// Static settings plus the membership parsed from them (or from the dynamic
/// file they point at).
///
/// Loading is all-or-nothing: [`parse`](Self::parse) and
/// [`parse_properties`](Self::parse_properties) build a fresh config from the
/// context given to [`new`](Self::new) and only replace `self` once every
/// check has passed. Nothing from an earlier load carries over.
#[derive(Debug, Clone)]
pub struct MembershipConfig {
    base_context: ConfigContext,
    context: ConfigContext,
    config_file: Option<PathBuf>,
    dynamic_config_file: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    data_log_dir: Option<PathBuf>,
    client_port_address: Option<Endpoint>,
    secure_client_port_address: Option<Endpoint>,
    tick_time: u32,
    max_client_cnxns: u32,
    min_session_timeout: Option<u32>,
    max_session_timeout: Option<u32>,
    local_sessions_enabled: bool,
    local_sessions_upgrading_enabled: bool,
    init_limit: u32,
    sync_limit: u32,
    election_alg: u32,
    quorum_listen_on_all_ips: bool,
    server_id: Option<ServerId>,
    quorum_verifier: Option<Arc<QuorumVerifier>>,
    next_verifier: Option<Arc<QuorumVerifier>>,
    snap_retain_count: u32,
    purge_interval: u32,
    sync_enabled: bool,
    peer_type: LearnerRole,
    ssl_quorum: bool,
    port_unification: bool,
    auth: QuorumAuthSettings,
    quorum_cnxn_threads_size: Option<u32>,
    passthrough: BTreeMap<String, String>,
}

impl MembershipConfig {
    pub fn new(context: ConfigContext) -> Self {
        Self {
            base_context: context,
            context,
            config_file: None,
            dynamic_config_file: None,
            data_dir: None,
            data_log_dir: None,
            client_port_address: None,
            secure_client_port_address: None,
            tick_time: DEFAULT_TICK_TIME,
            max_client_cnxns: DEFAULT_MAX_CLIENT_CNXNS,
            min_session_timeout: None,
            max_session_timeout: None,
            local_sessions_enabled: false,
            local_sessions_upgrading_enabled: false,
            init_limit: 0,
            sync_limit: 0,
            election_alg: DEFAULT_ELECTION_ALG,
            quorum_listen_on_all_ips: false,
            server_id: None,
            quorum_verifier: None,
            next_verifier: None,
            snap_retain_count: MIN_SNAP_RETAIN_COUNT,
            purge_interval: 0,
            sync_enabled: true,
            peer_type: LearnerRole::Participant,
            ssl_quorum: false,
            port_unification: false,
            auth: QuorumAuthSettings::default(),
            quorum_cnxn_threads_size: None,
            passthrough: BTreeMap::new(),
        }
    }

    /// Loads the static file at `path`, then the dynamic file it names and
    /// any pending `.next` proposal beside it.
    pub fn parse(&mut self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let mut staged = Self::new(self.base_context);
        staged.load(path.as_ref())?;
        *self = staged;
        Ok(())
    }

    /// Applies static settings that did not come from a file. Membership
    /// entries must be inline unless `dynamicConfigFile` is given.
    pub fn parse_properties(&mut self, props: &Properties) -> Result<(), ConfigError> {
        let mut staged = Self::new(self.base_context);
        staged.apply_properties(props)?;
        staged.load_dynamic()?;
        *self = staged;
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<(), ConfigError> {
        info!("event=config_read path={}", path.display());
        let path = PathChecks::strict().verify(path)?;
        let props = Properties::load(&path)?;
        self.config_file = Some(path);
        self.apply_properties(&props)?;
        self.load_dynamic()
    }

    fn load_dynamic(&mut self) -> Result<(), ConfigError> {
        let Some(dynamic) = self.dynamic_config_file.clone() else {
            return Ok(());
        };
        let dynamic = PathChecks::strict().verify(&dynamic)?;
        let mut props = Properties::load(&dynamic)?;
        if props.contains_key("version") {
            return Err(ConfigError::VersionInDynamicFile { path: dynamic });
        }
        if let Some(version) = version_from_filename(&dynamic) {
            props.insert("version", format!("{version:x}"));
        }
        self.setup_membership(&props, false)?;
        self.next_verifier = load_next_verifier(&next_file_for(&dynamic))?.map(Arc::new);
        Ok(())
    }

    fn apply_properties(&mut self, props: &Properties) -> Result<(), ConfigError> {
        let mut client_port = None;
        let mut client_port_address = None;
        let mut secure_client_port = None;
        let mut secure_client_port_address = None;
        let has_dynamic_file = props.contains_key(DYNAMIC_CONFIG_KEY);
        let paths = PathChecks::warn_relative();

        for (key, value) in props.iter() {
            match key {
                "dataDir" => self.data_dir = non_empty_path(&paths, value)?,
                "dataLogDir" => self.data_log_dir = non_empty_path(&paths, value)?,
                "clientPort" => client_port = parse_port(key, value)?,
                "clientPortAddress" => client_port_address = Some(value.to_string()),
                "secureClientPort" => secure_client_port = parse_port(key, value)?,
                "secureClientPortAddress" => secure_client_port_address = Some(value.to_string()),
                "localSessionsEnabled" => self.local_sessions_enabled = parse_flag(value),
                "localSessionsUpgradingEnabled" => {
                    self.local_sessions_upgrading_enabled = parse_flag(value)
                }
                "tickTime" => self.tick_time = parse_u32(key, value)?,
                "maxClientCnxns" => self.max_client_cnxns = parse_u32(key, value)?,
                "minSessionTimeout" => self.min_session_timeout = Some(parse_u32(key, value)?),
                "maxSessionTimeout" => self.max_session_timeout = Some(parse_u32(key, value)?),
                "initLimit" => self.init_limit = parse_u32(key, value)?,
                "syncLimit" => self.sync_limit = parse_u32(key, value)?,
                "electionAlg" => self.election_alg = parse_u32(key, value)?,
                "quorumListenOnAllIPs" => self.quorum_listen_on_all_ips = parse_flag(value),
                "peerType" => {
                    self.peer_type = LearnerRole::parse(value).ok_or_else(|| {
                        ConfigError::invalid(key, value, "expected participant or observer")
                    })?
                }
                "syncEnabled" => self.sync_enabled = parse_flag(value),
                DYNAMIC_CONFIG_KEY => {
                    let path = Path::new(value);
                    self.dynamic_config_file = Some(match &self.config_file {
                        Some(config) => resolve_relative(&config_dir(config), path),
                        None => path.to_path_buf(),
                    });
                }
                "autopurge.snapRetainCount" => self.snap_retain_count = parse_u32(key, value)?,
                "autopurge.purgeInterval" => self.purge_interval = parse_u32(key, value)?,
                "standaloneEnabled" => self.context.standalone_enabled = parse_strict_flag(key, value)?,
                "reconfigEnabled" => self.context.reconfig_enabled = parse_strict_flag(key, value)?,
                "sslQuorum" => self.ssl_quorum = parse_flag(value),
                "portUnification" => self.port_unification = parse_flag(value),
                SASL_AUTH_ENABLED => self.auth.enable_sasl = parse_flag(value),
                SASL_SERVER_REQUIRED => self.auth.server_require_sasl = parse_flag(value),
                SASL_LEARNER_REQUIRED => self.auth.learner_require_sasl = parse_flag(value),
                SASL_LEARNER_LOGIN_CONTEXT => self.auth.learner_login_context = value.to_string(),
                SASL_SERVER_LOGIN_CONTEXT => self.auth.server_login_context = value.to_string(),
                SASL_SERVICE_PRINCIPAL => self.auth.service_principal = value.to_string(),
                "quorum.cnxn.threads.size" => {
                    self.quorum_cnxn_threads_size = Some(parse_u32(key, value)?)
                }
                _ if is_membership_key(key) && has_dynamic_file => {
                    return Err(ConfigError::MembershipInStaticFile {
                        key: key.to_string(),
                    })
                }
                _ if is_membership_key(key) || key == "version" => {}
                _ => {
                    self.passthrough.insert(key.to_string(), value.to_string());
                }
            }
        }

        self.auth.validate()?;

        if self.snap_retain_count < MIN_SNAP_RETAIN_COUNT {
            warn!(
                "event=config_snap_retain_floor configured={} applied={}",
                self.snap_retain_count, MIN_SNAP_RETAIN_COUNT
            );
            self.snap_retain_count = MIN_SNAP_RETAIN_COUNT;
        }

        let data_dir = self
            .data_dir
            .clone()
            .ok_or(ConfigError::MissingSetting("dataDir"))?;
        if self.data_log_dir.is_none() {
            self.data_log_dir = Some(data_dir);
        }

        self.client_port_address = resolve_client_endpoint(
            "clientPortAddress",
            "clientPort",
            client_port,
            client_port_address.as_deref(),
        )?;
        self.secure_client_port_address = resolve_client_endpoint(
            "secureClientPortAddress",
            "secureClientPort",
            secure_client_port,
            secure_client_port_address.as_deref(),
        )?;
        if let (Some(plain), Some(secure)) = (
            explicit_endpoint(client_port, client_port_address.as_deref()),
            explicit_endpoint(secure_client_port, secure_client_port_address.as_deref()),
        ) {
            if let (Some(a), Some(b)) = (plain.family(), secure.family()) {
                if a != b {
                    return Err(ConfigError::AddressFamilyMismatch {
                        first: plain.to_string(),
                        second: secure.to_string(),
                    });
                }
            }
        }

        if self.tick_time == 0 {
            return Err(ConfigError::MissingSetting("tickTime"));
        }
        let min = self.min_session_timeout();
        let max = self.max_session_timeout();
        if min > max {
            return Err(ConfigError::SessionTimeoutRange { min, max });
        }

        if self.dynamic_config_file.is_none() {
            self.setup_membership(props, true)?;
        }
        Ok(())
    }

    fn setup_membership(
        &mut self,
        props: &Properties,
        backward_compatible: bool,
    ) -> Result<(), ConfigError> {
        let verifier = parse_dynamic_config(
            props,
            self.election_alg,
            true,
            backward_compatible,
            &self.context,
        )?;
        self.quorum_verifier = Some(Arc::new(verifier));
        self.setup_my_id()?;
        self.setup_client_port()?;
        self.setup_peer_type();
        self.check_validity()
    }

    fn setup_my_id(&mut self) -> Result<(), ConfigError> {
        let Some(data_dir) = &self.data_dir else {
            return Ok(());
        };
        let path = data_dir.join(MYID_FILE);
        if !path.is_file() {
            return Ok(());
        }
        let raw = fs::read_to_string(&path).map_err(|err| ConfigError::io(&path, err))?;
        let line = raw.lines().next().unwrap_or("").trim();
        let id = line
            .parse::<ServerId>()
            .map_err(|_| ConfigError::invalid(MYID_FILE, line, "server id is not a number"))?;
        self.server_id = Some(id);
        Ok(())
    }

    fn setup_client_port(&mut self) -> Result<(), ConfigError> {
        let (Some(id), Some(verifier)) = (self.server_id, &self.quorum_verifier) else {
            return Ok(());
        };
        let declared = verifier
            .all_members()
            .get(&id)
            .and_then(QuorumServer::client_addr)
            .cloned();
        let Some(declared) = declared else {
            return Ok(());
        };
        if let Some(local) = &self.client_port_address {
            if !local.agrees_with(&declared) {
                return Err(ConfigError::ClientEndpointConflict {
                    server: id,
                    configured: local.to_string(),
                    declared: declared.to_string(),
                });
            }
        }
        self.client_port_address = Some(declared);
        Ok(())
    }

    fn setup_peer_type(&mut self) {
        let Some(verifier) = &self.quorum_verifier else {
            return;
        };
        let listed = match self.server_id {
            Some(id) if verifier.observing_members().contains_key(&id) => LearnerRole::Observer,
            _ => LearnerRole::Participant,
        };
        if listed != self.peer_type {
            warn!(
                "event=config_peer_type_mismatch listed={} configured={} applied={}",
                listed, self.peer_type, listed
            );
            self.peer_type = listed;
        }
    }

    fn check_validity(&self) -> Result<(), ConfigError> {
        if self.is_distributed() {
            if self.init_limit == 0 {
                return Err(ConfigError::MissingSetting("initLimit"));
            }
            if self.sync_limit == 0 {
                return Err(ConfigError::MissingSetting("syncLimit"));
            }
            if self.server_id.is_none() {
                return Err(ConfigError::MissingSetting("myid"));
            }
        }
        Ok(())
    }

    pub fn context(&self) -> ConfigContext {
        self.context
    }

    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    pub fn dynamic_config_file(&self) -> Option<&Path> {
        self.dynamic_config_file.as_deref()
    }

    /// File naming for reconfiguration, available once loaded from a file.
    pub fn dynamic_paths(&self) -> Option<DynamicConfigPaths> {
        self.config_file.as_ref().map(DynamicConfigPaths::new)
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    pub fn data_log_dir(&self) -> Option<&Path> {
        self.data_log_dir.as_deref()
    }

    pub fn client_port_address(&self) -> Option<&Endpoint> {
        self.client_port_address.as_ref()
    }

    pub fn secure_client_port_address(&self) -> Option<&Endpoint> {
        self.secure_client_port_address.as_ref()
    }

    pub fn tick_time(&self) -> u32 {
        self.tick_time
    }

    pub fn max_client_cnxns(&self) -> u32 {
        self.max_client_cnxns
    }

    /// Defaults to two ticks.
    pub fn min_session_timeout(&self) -> u32 {
        self.min_session_timeout
            .unwrap_or_else(|| self.tick_time.saturating_mul(2))
    }

    /// Defaults to twenty ticks.
    pub fn max_session_timeout(&self) -> u32 {
        self.max_session_timeout
            .unwrap_or_else(|| self.tick_time.saturating_mul(20))
    }

    pub fn local_sessions_enabled(&self) -> bool {
        self.local_sessions_enabled
    }

    pub fn local_sessions_upgrading_enabled(&self) -> bool {
        self.local_sessions_upgrading_enabled
    }

    pub fn init_limit(&self) -> u32 {
        self.init_limit
    }

    pub fn sync_limit(&self) -> u32 {
        self.sync_limit
    }

    pub fn election_alg(&self) -> u32 {
        self.election_alg
    }

    pub fn quorum_listen_on_all_ips(&self) -> bool {
        self.quorum_listen_on_all_ips
    }

    pub fn server_id(&self) -> Option<ServerId> {
        self.server_id
    }

    pub fn snap_retain_count(&self) -> u32 {
        self.snap_retain_count
    }

    pub fn purge_interval(&self) -> u32 {
        self.purge_interval
    }

    pub fn sync_enabled(&self) -> bool {
        self.sync_enabled
    }

    pub fn peer_type(&self) -> LearnerRole {
        self.peer_type
    }

    pub fn ssl_quorum(&self) -> bool {
        self.ssl_quorum
    }

    pub fn port_unification(&self) -> bool {
        self.port_unification
    }

    pub fn auth(&self) -> &QuorumAuthSettings {
        &self.auth
    }

    pub fn quorum_cnxn_threads_size(&self) -> Option<u32> {
        self.quorum_cnxn_threads_size
    }

    /// Settings this loader does not interpret, kept for the host process.
    pub fn passthrough(&self) -> &BTreeMap<String, String> {
        &self.passthrough
    }

    pub fn quorum_verifier(&self) -> Option<Arc<QuorumVerifier>> {
        self.quorum_verifier.clone()
    }

    /// Parsed but uncommitted proposal, if a `.next` file was present.
    pub fn next_verifier(&self) -> Option<Arc<QuorumVerifier>> {
        self.next_verifier.clone()
    }

    pub fn servers(&self) -> BTreeMap<ServerId, QuorumServer> {
        self.quorum_verifier
            .as_ref()
            .map(|qv| qv.all_members().clone())
            .unwrap_or_default()
    }

    pub fn is_distributed(&self) -> bool {
        self.quorum_verifier.as_ref().is_some_and(|qv| {
            !self.context.standalone_enabled || qv.voting_members().len() > 1
        })
    }

    pub fn state(&self) -> MembershipState {
        MembershipState::of(self.quorum_verifier.as_deref(), self.next_verifier.as_deref())
    }
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self::new(ConfigContext::default())
    }
}

/// Builds a verifier from membership entries and applies the population
/// policy. With `backward_compatible` unset only `server.*`, `group.*`,
/// `weight.*` and `version` keys are accepted.
pub fn parse_dynamic_config(
    props: &Properties,
    election_alg: u32,
    warnings: bool,
    backward_compatible: bool,
    context: &ConfigContext,
) -> Result<QuorumVerifier, ConfigError> {
    if !backward_compatible {
        if let Some(key) = props
            .keys()
            .find(|key| !is_membership_key(key) && key.as_str() != "version")
        {
            return Err(ConfigError::UnrecognisedParameter { key: key.clone() });
        }
    }
    let verifier = QuorumVerifier::from_properties(props)?;
    validate_population(&verifier, election_alg, warnings, context)?;
    Ok(verifier)
}

/// Participant/observer population rules. Unusual but tolerated layouts are
/// logged rather than rejected.
pub fn validate_population(
    verifier: &QuorumVerifier,
    election_alg: u32,
    warnings: bool,
    context: &ConfigContext,
) -> Result<(), ConfigError> {
    let participants = verifier.voting_members().len();
    let observers = verifier.observing_members().len();

    if participants == 0 {
        if !context.standalone_enabled {
            return Err(ConfigError::Population(
                "standaloneEnabled is false, so the number of participants must be > 0".into(),
            ));
        }
        if observers > 0 {
            return Err(ConfigError::Population(
                "observers without participants".into(),
            ));
        }
    } else if participants == 1 && context.standalone_enabled {
        error!("event=membership_single_participant action=ignored observers={observers}");
        if observers > 0 {
            return Err(ConfigError::Population("observers without a quorum".into()));
        }
    } else {
        if warnings {
            if participants <= 2 {
                warn!(
                    "event=membership_no_fault_tolerance participants={participants} recommended=3"
                );
            } else if participants % 2 == 0 {
                warn!("event=membership_even_participants participants={participants}");
            }
        }
        if election_alg != 0 {
            if let Some(server) = verifier
                .voting_members()
                .values()
                .find(|server| server.election_addr().is_none())
            {
                return Err(ConfigError::MissingElectionEndpoint {
                    server: server.id(),
                });
            }
        }
    }
    Ok(())
}

/// Reads a pending proposal. A missing or unreadable file yields `None`;
/// a file that reads but does not parse fails the load.
fn load_next_verifier(path: &Path) -> Result<Option<QuorumVerifier>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            warn!(
                "event=config_next_unreadable path={} error={}",
                path.display(),
                err
            );
            return Ok(None);
        }
    };
    let props: Properties = text.parse()?;
    let verifier = QuorumVerifier::from_properties(&props)?;
    info!(
        "event=config_next_loaded path={} version={:x} strategy={:?}",
        path.display(),
        verifier.version(),
        verifier.strategy()
    );
    Ok(Some(verifier))
}

fn resolve_client_endpoint(
    address_key: &'static str,
    port_key: &'static str,
    port: Option<u16>,
    address: Option<&str>,
) -> Result<Option<Endpoint>, ConfigError> {
    match (port, address) {
        (None, Some(_)) => Err(ConfigError::AddressWithoutPort {
            key: address_key,
            requires: port_key,
        }),
        (None, None) => {
            info!("event=config_client_port_unset key={port_key}");
            Ok(None)
        }
        (Some(port), address) => {
            let endpoint = explicit_endpoint(Some(port), address)
                .unwrap_or_else(|| Endpoint::wildcard(port));
            info!("event=config_client_address key={address_key} address={endpoint}");
            Ok(Some(endpoint))
        }
    }
}

fn explicit_endpoint(port: Option<u16>, address: Option<&str>) -> Option<Endpoint> {
    match (port, address) {
        (Some(port), Some(address)) => Some(Endpoint::new(address, port)),
        _ => None,
    }
}

fn non_empty_path(checks: &PathChecks, value: &str) -> Result<Option<PathBuf>, ConfigError> {
    if value.is_empty() {
        return Ok(None);
    }
    checks.verify(Path::new(value)).map(Some)
}

/// `0` means the port is not configured.
fn parse_port(key: &str, value: &str) -> Result<Option<u16>, ConfigError> {
    let port = value
        .parse::<u16>()
        .map_err(|_| ConfigError::invalid(key, value, "not a port number"))?;
    Ok((port != 0).then_some(port))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::invalid(key, value, "not a non-negative integer"))
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}

fn parse_strict_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConfigError::invalid(key, value, "choose 'true' or 'false'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quorum::QuorumStrategy;
    use tempfile::TempDir;

    const THREE: &str = "server.1=zk1:3888:zk1:2181\nserver.2=zk2:3888:zk2:2181\n\
        server.3=zk3:3888:zk3:2181\n";

    fn props(text: &str) -> Properties {
        text.parse().unwrap()
    }

    fn base(data_dir: &Path) -> String {
        format!(
            "dataDir={}\ntickTime=2000\ninitLimit=10\nsyncLimit=5\n",
            data_dir.display()
        )
    }

    fn data_dir_with_myid(id: u64) -> TempDir {
        let tmp = TempDir::new().expect("tempdir");
        fs::write(tmp.path().join(MYID_FILE), format!("{id}\n")).unwrap();
        tmp
    }

    #[test]
    fn inline_membership_builds_majority_verifier() {
        let data = data_dir_with_myid(2);
        let mut config = MembershipConfig::default();
        config
            .parse_properties(&props(&format!("{}clientPort=2181\n{THREE}", base(data.path()))))
            .unwrap();

        let qv = config.quorum_verifier().unwrap();
        assert_eq!(qv.strategy(), QuorumStrategy::Majority);
        assert_eq!(qv.voting_members().len(), 3);
        assert_eq!(config.server_id(), Some(2));
        assert!(config.is_distributed());
        assert_eq!(config.client_port_address().unwrap().to_string(), "zk2:2181");
        assert_eq!(config.data_log_dir(), Some(data.path()));
        assert_eq!(config.min_session_timeout(), 4000);
        assert_eq!(config.max_session_timeout(), 40000);
        assert_eq!(config.state(), MembershipState::Active { version: 0 });
    }

    #[test]
    fn reloading_starts_from_a_clean_slate() {
        let first = data_dir_with_myid(1);
        fs::write(first.path().join("a.cfg.dynamic.100"), THREE).unwrap();
        let first_cfg = first.path().join("a.cfg");
        fs::write(
            &first_cfg,
            format!(
                "{}standaloneEnabled=false
custom.flag=on
dynamicConfigFile=a.cfg.dynamic.100
",
                base(first.path())
            ),
        )
        .unwrap();

        let second = TempDir::new().expect("tempdir");
        let second_cfg = second.path().join("b.cfg");
        fs::write(
            &second_cfg,
            format!(
                "{}{THREE}server.4=zk4:3888:zk4:2181
server.5=zk5:3888:zk5:2181
version=7
",
                base(second.path())
            ),
        )
        .unwrap();

        let mut config = MembershipConfig::default();
        config.parse(&first_cfg).unwrap();
        assert_eq!(config.quorum_verifier().unwrap().version(), 0x100);
        assert!(!config.context().standalone_enabled);

        let err = config.parse(&second_cfg).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting("myid")));
        assert_eq!(config.quorum_verifier().unwrap().version(), 0x100);

        fs::write(second.path().join(MYID_FILE), "5\n").unwrap();
        config.parse(&second_cfg).unwrap();
        let qv = config.quorum_verifier().unwrap();
        assert_eq!(qv.version(), 7);
        assert_eq!(qv.voting_members().len(), 5);
        assert_eq!(config.server_id(), Some(5));
        assert!(config.dynamic_config_file().is_none());
        assert!(config.next_verifier().is_none());
        assert!(config.passthrough().is_empty());
        assert!(config.context().standalone_enabled);
    }

    #[test]
    fn data_dir_is_required() {
        let mut config = MembershipConfig::default();
        let err = config.parse_properties(&props("tickTime=2000\n")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting("dataDir")));
        assert_eq!(config.state(), MembershipState::Uninitialized);
    }

    #[test]
    fn snap_retain_count_is_raised_to_floor() {
        let data = TempDir::new().expect("tempdir");
        let mut config = MembershipConfig::default();
        config
            .parse_properties(&props(&format!(
                "{}autopurge.snapRetainCount=1\n",
                base(data.path())
            )))
            .unwrap();
        assert_eq!(config.snap_retain_count(), MIN_SNAP_RETAIN_COUNT);
    }

    #[test]
    fn auth_flags_form_a_chain() {
        let data = TempDir::new().expect("tempdir");
        let cases = [
            (
                "quorum.auth.serverRequireSasl=true\nquorum.auth.learnerRequireSasl=true\n",
                SASL_AUTH_ENABLED,
            ),
            ("quorum.auth.learnerRequireSasl=true\n", SASL_AUTH_ENABLED),
            (
                "quorum.auth.enableSasl=true\nquorum.auth.serverRequireSasl=true\n",
                SASL_LEARNER_REQUIRED,
            ),
        ];
        for (flags, expected) in cases {
            let mut config = MembershipConfig::default();
            let err = config
                .parse_properties(&props(&format!("{}{flags}", base(data.path()))))
                .unwrap_err();
            match err {
                ConfigError::AuthDependency { prerequisite, .. } => {
                    assert_eq!(prerequisite, expected)
                }
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn client_address_requires_port() {
        let data = TempDir::new().expect("tempdir");
        let mut config = MembershipConfig::default();
        let err = config
            .parse_properties(&props(&format!(
                "{}clientPortAddress=10.0.0.1\n",
                base(data.path())
            )))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::AddressWithoutPort {
                key: "clientPortAddress",
                ..
            }
        ));
    }

    #[test]
    fn client_and_secure_addresses_share_a_family() {
        let data = TempDir::new().expect("tempdir");
        let mut config = MembershipConfig::default();
        let err = config
            .parse_properties(&props(&format!(
                "{}clientPort=2181\nclientPortAddress=10.0.0.1\n\
                 secureClientPort=2281\nsecureClientPortAddress=::1\n",
                base(data.path())
            )))
            .unwrap_err();
        assert!(matches!(err, ConfigError::AddressFamilyMismatch { .. }));
    }

    #[test]
    fn session_timeouts_must_be_ordered() {
        let data = TempDir::new().expect("tempdir");
        let mut config = MembershipConfig::default();
        let err = config
            .parse_properties(&props(&format!(
                "{}minSessionTimeout=9000\nmaxSessionTimeout=3000\n",
                base(data.path())
            )))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::SessionTimeoutRange {
                min: 9000,
                max: 3000
            }
        ));

        let err = config
            .parse_properties(&props(&format!("{}tickTime=0\n", base(data.path()))))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting("tickTime")));
    }

    #[test]
    fn concrete_client_endpoint_conflict_is_fatal() {
        let data = data_dir_with_myid(1);
        let mut config = MembershipConfig::default();
        let err = config
            .parse_properties(&props(&format!(
                "{}clientPort=2181\nclientPortAddress=10.9.9.9\n{THREE}",
                base(data.path())
            )))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ClientEndpointConflict { server: 1, .. }
        ));
        assert!(config.quorum_verifier().is_none());
    }

    #[test]
    fn wildcard_client_endpoint_compares_port_only() {
        let data = data_dir_with_myid(1);
        let mut config = MembershipConfig::default();
        let err = config
            .parse_properties(&props(&format!("{}clientPort=2182\n{THREE}", base(data.path()))))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ClientEndpointConflict { .. }));
    }

    #[test]
    fn distributed_membership_requires_limits_and_myid() {
        let data = TempDir::new().expect("tempdir");
        let mut config = MembershipConfig::default();
        let err = config
            .parse_properties(&props(&format!("{}{THREE}", base(data.path()))))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting("myid")));

        let data = data_dir_with_myid(1);
        let text = format!("dataDir={}\ntickTime=2000\n{THREE}", data.path().display());
        let err = config.parse_properties(&props(&text)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting("initLimit")));
    }

    #[test]
    fn peer_type_follows_server_list() {
        let data = data_dir_with_myid(4);
        let mut config = MembershipConfig::default();
        config
            .parse_properties(&props(&format!(
                "{}{THREE}server.4=zk4:3888:observer\n",
                base(data.path())
            )))
            .unwrap();
        assert_eq!(config.peer_type(), LearnerRole::Observer);
    }

    #[test]
    fn unknown_keys_pass_through() {
        let data = TempDir::new().expect("tempdir");
        let mut config = MembershipConfig::default();
        config
            .parse_properties(&props(&format!(
                "{}4lw.commands.whitelist=stat\n",
                base(data.path())
            )))
            .unwrap();
        assert_eq!(
            config.passthrough().get("4lw.commands.whitelist").map(String::as_str),
            Some("stat")
        );
    }

    #[test]
    fn strict_flags_reject_other_words() {
        let data = TempDir::new().expect("tempdir");
        let mut config = MembershipConfig::default();
        let err = config
            .parse_properties(&props(&format!("{}standaloneEnabled=yes\n", base(data.path()))))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn population_policy() {
        let standalone = ConfigContext::default();
        let clustered = ConfigContext::default().with_standalone(false);

        let empty: QuorumVerifier = "version=1".parse().unwrap();
        assert!(validate_population(&empty, 3, true, &standalone).is_ok());
        assert!(validate_population(&empty, 3, true, &clustered).is_err());

        let observers_only: QuorumVerifier = "server.1=zk1:3888:observer".parse().unwrap();
        assert!(validate_population(&observers_only, 3, true, &standalone).is_err());

        let single: QuorumVerifier = "server.1=zk1:3888".parse().unwrap();
        assert!(validate_population(&single, 3, true, &standalone).is_ok());
        let single_with_observer: QuorumVerifier =
            "server.1=zk1:3888\nserver.2=zk2:3888:observer".parse().unwrap();
        assert!(validate_population(&single_with_observer, 3, true, &standalone).is_err());

        let even: QuorumVerifier =
            "server.1=a:1\nserver.2=b:1\nserver.3=c:1\nserver.4=d:1".parse().unwrap();
        assert!(validate_population(&even, 3, true, &standalone).is_ok());
    }

    #[test]
    fn voting_members_need_election_endpoints() {
        let context = ConfigContext::default();
        let qv: QuorumVerifier = "server.1=zk1:3888\nserver.2=participant\nserver.3=zk3:3888"
            .parse()
            .unwrap();
        let err = validate_population(&qv, 3, false, &context).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingElectionEndpoint { server: 2 }
        ));
        assert!(validate_population(&qv, 0, false, &context).is_ok());
    }

    #[test]
    fn strict_dynamic_files_reject_scalar_keys() {
        let err = parse_dynamic_config(
            &props("server.1=zk1:3888\ntickTime=2000"),
            3,
            false,
            false,
            &ConfigContext::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnrecognisedParameter { .. }));
    }
}
