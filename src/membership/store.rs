use crate::config::dynamic::{
    backup_static_config, delete_file, edit_static_config, next_file_for, write_dynamic_config,
    DynamicConfigPaths,
};
use crate::quorum::{QuorumPolicy, QuorumVerifier};
use crate::util::error::ConfigError;
use log::info;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

/// On-disk side of reconfiguration for one static configuration file.
///
/// Commit order is: new dynamic file, then the static file pointer, then
/// cleanup. Both writes are atomic renames, so a crash at any point leaves
/// the static file naming a complete dynamic file.
#[derive(Debug)]
pub struct DynamicConfigStore {
    paths: DynamicConfigPaths,
    active_file: Mutex<Option<PathBuf>>,
    erase_client_port: bool,
}

impl DynamicConfigStore {
    pub fn new(paths: DynamicConfigPaths) -> Self {
        Self {
            paths,
            active_file: Mutex::new(None),
            erase_client_port: false,
        }
    }

    /// The dynamic file the static file currently points at, if any.
    pub fn with_active_file(self, path: Option<PathBuf>) -> Self {
        *self.active_file.lock() = path;
        self
    }

    /// Drop `clientPort*` settings from the static file on commit.
    pub fn with_erase_client_port(mut self, erase: bool) -> Self {
        self.erase_client_port = erase;
        self
    }

    pub fn paths(&self) -> &DynamicConfigPaths {
        &self.paths
    }

    pub fn active_file(&self) -> Option<PathBuf> {
        self.active_file.lock().clone()
    }

    /// Where a pending proposal is kept: beside the active dynamic file.
    pub fn next_file(&self) -> PathBuf {
        match self.active_file.lock().as_deref() {
            Some(active) => next_file_for(active),
            None => self.paths.next_file(),
        }
    }

    pub fn write_next(&self, verifier: &QuorumVerifier) -> Result<PathBuf, ConfigError> {
        let path = self.next_file();
        write_dynamic_config(&path, verifier, true)?;
        Ok(path)
    }

    pub fn clear_next(&self) {
        delete_file(&self.next_file());
    }

    /// Copies the static file to `.bak` unless a backup already exists.
    pub fn backup_static_once(&self) -> Result<Option<PathBuf>, ConfigError> {
        if self.paths.backup_file().exists() {
            return Ok(None);
        }
        backup_static_config(&self.paths).map(Some)
    }

    /// Persists `verifier` as the committed membership and returns the new
    /// dynamic file.
    pub fn commit(&self, verifier: &QuorumVerifier) -> Result<PathBuf, ConfigError> {
        let next = self.next_file();
        let file = self.paths.dynamic_file(verifier.version());
        write_dynamic_config(&file, verifier, false)?;
        edit_static_config(self.paths.static_path(), &file, self.erase_client_port)?;

        let previous = self.active_file.lock().replace(file.clone());
        if let Some(previous) = previous.filter(|prev| !same_file(prev, &file)) {
            delete_file(&previous);
        }
        delete_file(&next);
        info!(
            "event=membership_persisted version={:x} path={}",
            verifier.version(),
            file.display()
        );
        Ok(file)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::properties::Properties;
    use std::fs;
    use tempfile::TempDir;

    fn verifier(text: &str) -> QuorumVerifier {
        text.parse().unwrap()
    }

    #[test]
    fn commit_moves_static_pointer_and_cleans_up() {
        let tmp = TempDir::new().expect("tempdir");
        let static_path = tmp.path().join("zoo.cfg");
        fs::write(&static_path, "dataDir=/data\nserver.1=a:3888\nserver.2=b:3888\n").unwrap();
        let store = DynamicConfigStore::new(DynamicConfigPaths::new(&static_path));

        let proposed = verifier("server.1=a:3888\nserver.2=b:3888\nserver.3=c:3888\nversion=5");
        let next = store.write_next(&proposed).unwrap();
        assert!(next.exists());

        let file = store.commit(&proposed).unwrap();
        assert_eq!(file, tmp.path().join("zoo.cfg.dynamic.5"));
        assert!(!next.exists());
        let props = Properties::load(&static_path).unwrap();
        assert!(!props.contains_key("server.1"));
        assert!(props.get("dynamicConfigFile").unwrap().ends_with("zoo.cfg.dynamic.5"));

        let later = proposed.with_version(6);
        store.commit(&later).unwrap();
        assert!(!file.exists());
        assert!(tmp.path().join("zoo.cfg.dynamic.6").exists());
    }

    #[test]
    fn backup_is_taken_once() {
        let tmp = TempDir::new().expect("tempdir");
        let static_path = tmp.path().join("zoo.cfg");
        fs::write(&static_path, "dataDir=/data\n").unwrap();
        let store = DynamicConfigStore::new(DynamicConfigPaths::new(&static_path));

        let backup = store.backup_static_once().unwrap().unwrap();
        assert_eq!(fs::read_to_string(&backup).unwrap(), "dataDir=/data\n");
        fs::write(&static_path, "dataDir=/other\n").unwrap();
        assert!(store.backup_static_once().unwrap().is_none());
        assert_eq!(fs::read_to_string(&backup).unwrap(), "dataDir=/data\n");
    }
}
