use quorate::{
    AtomicFileWriter, ConfigContext, ConfigError, MembershipConfig, MembershipRegistry,
    MembershipState, Properties, QuorumPolicy, QuorumVerifier,
};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const THREE: &str = "server.1=zk1:3888:zk1:2181\nserver.2=zk2:3888:zk2:2181\n\
    server.3=zk3:3888:zk3:2181\n";

const FIVE: &str = "server.1=zk1:3888:zk1:2181\nserver.2=zk2:3888:zk2:2181\n\
    server.3=zk3:3888:zk3:2181\nserver.4=zk4:3888:zk4:2181\nserver.5=zk5:3888:zk5:2181\n";

struct Cluster {
    _dir: TempDir,
    root: PathBuf,
    static_path: PathBuf,
}

impl Cluster {
    fn with_dynamic_file() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().to_path_buf();
        fs::write(root.join("myid"), "1\n").unwrap();
        fs::write(root.join("zoo.cfg.dynamic.100"), THREE).unwrap();
        let static_path = root.join("zoo.cfg");
        fs::write(
            &static_path,
            format!(
                "dataDir={}\ninitLimit=10\nsyncLimit=5\nreconfigEnabled=true\n\
                 dynamicConfigFile=zoo.cfg.dynamic.100\n",
                root.display()
            ),
        )
        .unwrap();
        Self {
            _dir: dir,
            root,
            static_path,
        }
    }

    fn with_inline_membership() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().to_path_buf();
        fs::write(root.join("myid"), "1\n").unwrap();
        let static_path = root.join("zoo.cfg");
        fs::write(
            &static_path,
            format!(
                "dataDir={}\ninitLimit=10\nsyncLimit=5\nreconfigEnabled=true\n{THREE}version=100\n",
                root.display()
            ),
        )
        .unwrap();
        Self {
            _dir: dir,
            root,
            static_path,
        }
    }

    fn load(&self) -> MembershipConfig {
        let mut config = MembershipConfig::new(ConfigContext::default());
        config.parse(&self.static_path).expect("config loads");
        config
    }

    fn registry(&self) -> MembershipRegistry {
        MembershipRegistry::from_config(&self.load()).expect("registry")
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

fn verifier(servers: &str, version: u64) -> QuorumVerifier {
    format!("{servers}version={version:x}").parse().unwrap()
}

fn static_pointer(path: &Path) -> PathBuf {
    let props = Properties::load(path).unwrap();
    PathBuf::from(props.get("dynamicConfigFile").expect("pointer present"))
}

#[test]
fn commit_persists_and_reloads() {
    let cluster = Cluster::with_dynamic_file();
    let registry = cluster.registry();
    assert_eq!(registry.state(), MembershipState::Active { version: 0x100 });

    registry.propose(verifier(FIVE, 0x200)).unwrap();
    assert!(cluster.path("zoo.cfg.dynamic.next").exists());

    let committed = registry.commit().unwrap();
    assert_eq!(committed.version(), 0x200);
    assert!(cluster.path("zoo.cfg.dynamic.200").exists());
    assert!(!cluster.path("zoo.cfg.dynamic.100").exists());
    assert!(!cluster.path("zoo.cfg.dynamic.next").exists());
    assert!(static_pointer(&cluster.static_path).ends_with("zoo.cfg.dynamic.200"));

    let backup = fs::read_to_string(cluster.path("zoo.cfg.bak")).unwrap();
    assert!(backup.contains("dynamicConfigFile=zoo.cfg.dynamic.100"));

    let reloaded = cluster.load();
    let qv = reloaded.quorum_verifier().unwrap();
    assert_eq!(qv.version(), 0x200);
    assert_eq!(qv.voting_members().len(), 5);
    assert!(qv.structurally_equal(&committed));
    assert_eq!(reloaded.state(), MembershipState::Active { version: 0x200 });
}

#[test]
fn inline_membership_moves_to_dynamic_file_on_first_commit() {
    let cluster = Cluster::with_inline_membership();
    let registry = cluster.registry();
    registry.reconfigure(verifier(FIVE, 0x101)).unwrap();

    let props = Properties::load(&cluster.static_path).unwrap();
    assert!(!props.contains_key("server.1"));
    assert!(!props.contains_key("version"));
    assert_eq!(props.get("reconfigEnabled"), Some("true"));
    assert!(static_pointer(&cluster.static_path).ends_with("zoo.cfg.dynamic.101"));

    let backup = Properties::load(&cluster.path("zoo.cfg.bak")).unwrap();
    assert!(backup.contains_key("server.1"));

    assert_eq!(cluster.load().quorum_verifier().unwrap().version(), 0x101);
}

#[test]
fn interrupted_writes_leave_previous_membership() {
    let cluster = Cluster::with_dynamic_file();
    let before = fs::read_to_string(&cluster.static_path).unwrap();

    let mut dynamic = AtomicFileWriter::create(cluster.path("zoo.cfg.dynamic.200")).unwrap();
    dynamic.write_all(FIVE.as_bytes()).unwrap();
    std::mem::forget(dynamic);

    let mut rewritten = AtomicFileWriter::create(&cluster.static_path).unwrap();
    rewritten.write_all(b"dataDir=/nowhere\ndynamicConfigFile=").unwrap();
    std::mem::forget(rewritten);

    assert_eq!(fs::read_to_string(&cluster.static_path).unwrap(), before);
    assert!(!cluster.path("zoo.cfg.dynamic.200").exists());
    let reloaded = cluster.load();
    assert_eq!(reloaded.quorum_verifier().unwrap().version(), 0x100);
    assert_eq!(reloaded.servers().len(), 3);
}

#[test]
fn failed_persist_keeps_published_state() {
    let cluster = Cluster::with_dynamic_file();
    let registry = cluster.registry();
    registry.propose(verifier(FIVE, 0x200)).unwrap();

    fs::remove_file(&cluster.static_path).unwrap();
    assert!(registry.commit().is_err());
    assert_eq!(registry.version(), 0x100);
    assert_eq!(
        registry.state(),
        MembershipState::ReconfigProposed {
            version: 0x100,
            next_version: 0x200
        }
    );
}

#[test]
fn pending_proposal_survives_restart() {
    let cluster = Cluster::with_dynamic_file();
    cluster
        .registry()
        .propose(verifier(FIVE, 0x200))
        .unwrap();

    let restarted = cluster.registry();
    assert_eq!(
        restarted.state(),
        MembershipState::ReconfigProposed {
            version: 0x100,
            next_version: 0x200
        }
    );
    restarted.abandon().unwrap();
    assert!(!cluster.path("zoo.cfg.dynamic.next").exists());
    assert_eq!(cluster.registry().state(), MembershipState::Active { version: 0x100 });
}

#[test]
fn proposals_must_advance_the_version() {
    let cluster = Cluster::with_dynamic_file();
    let registry = cluster.registry();
    let err = registry.propose(verifier(FIVE, 0x100)).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::StaleVersion {
            active: 0x100,
            proposed: 0x100
        }
    ));
    assert!(!cluster.path("zoo.cfg.dynamic.next").exists());
}

#[test]
fn proposals_are_validated_before_they_are_recorded() {
    let cluster = Cluster::with_dynamic_file();
    let registry = cluster.registry();
    let err = registry
        .propose(verifier("server.1=zk1:3888\nserver.2=participant\n", 0x200))
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigError::MissingElectionEndpoint { server: 2 }
    ));
    assert!(registry.next().is_none());
}

#[test]
fn readers_see_whole_memberships_during_reconfiguration() {
    let registry = Arc::new(MembershipRegistry::new(
        verifier(THREE, 1),
        ConfigContext::default().with_reconfig(true),
    ));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry = registry.clone();
            std::thread::spawn(move || {
                let acks: BTreeSet<u64> = [1, 2].into_iter().collect();
                let mut last = 0;
                for _ in 0..200 {
                    let qv = registry.current();
                    assert!(qv.version() >= last, "versions never go backwards");
                    last = qv.version();
                    let expected = qv.voting_members().len() < 5;
                    assert_eq!(qv.contains_quorum(&acks), expected);
                }
            })
        })
        .collect();

    for version in 2..=10 {
        let servers = if version % 2 == 0 { FIVE } else { THREE };
        registry.reconfigure(verifier(servers, version)).unwrap();
    }
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(registry.version(), 10);
}
