//! Dynamic membership files: naming, writing, and rewriting the static file
//! so it points at the current dynamic file.

use super::properties::{escape_value, Properties};
use crate::persistence::write_atomic;
use crate::quorum::QuorumVerifier;
use crate::util::error::ConfigError;
use log::{info, warn};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const DYNAMIC_CONFIG_KEY: &str = "dynamicConfigFile";
pub const DYNAMIC_SUFFIX: &str = ".dynamic";
pub const NEXT_SUFFIX: &str = ".next";
pub const BACKUP_SUFFIX: &str = ".bak";

/// Hex version carried by a dynamic file name's last `.` suffix, if any.
pub fn version_from_filename(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    let (_, suffix) = name.rsplit_once('.')?;
    if suffix.is_empty() {
        return None;
    }
    u64::from_str_radix(suffix, 16).ok()
}

/// File naming around one static configuration file:
/// `<static>.dynamic.<hex>` for committed memberships, `<static>.dynamic.next`
/// for a pending proposal and `<static>.bak` for the pre-reconfiguration copy.
#[derive(Debug, Clone)]
pub struct DynamicConfigPaths {
    static_path: PathBuf,
}

impl DynamicConfigPaths {
    pub fn new(static_path: impl Into<PathBuf>) -> Self {
        Self {
            static_path: static_path.into(),
        }
    }

    pub fn static_path(&self) -> &Path {
        &self.static_path
    }

    pub fn dynamic_base(&self) -> PathBuf {
        append_suffix(&self.static_path, DYNAMIC_SUFFIX)
    }

    pub fn dynamic_file(&self, version: u64) -> PathBuf {
        append_suffix(&self.dynamic_base(), &format!(".{version:x}"))
    }

    pub fn next_file(&self) -> PathBuf {
        append_suffix(&self.dynamic_base(), NEXT_SUFFIX)
    }

    pub fn backup_file(&self) -> PathBuf {
        append_suffix(&self.static_path, BACKUP_SUFFIX)
    }
}

/// Next-proposal file for an active dynamic file: the dynamic name with its
/// version suffix dropped, plus `.next`.
pub fn next_file_for(dynamic_file: &Path) -> PathBuf {
    let base = if version_from_filename(dynamic_file).is_some() {
        dynamic_file.with_extension("")
    } else {
        dynamic_file.to_path_buf()
    };
    append_suffix(&base, NEXT_SUFFIX)
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Writes the canonical text of `verifier` atomically. The `version` line is
/// kept only when `keep_version` is set; committed dynamic files carry their
/// version in the file name instead.
pub fn write_dynamic_config(
    path: &Path,
    verifier: &QuorumVerifier,
    keep_version: bool,
) -> Result<(), ConfigError> {
    let text = verifier.to_config_text();
    let lines: Vec<&str> = text
        .lines()
        .filter(|line| keep_version || !line.starts_with("version="))
        .collect();
    write_atomic(path, |out| {
        out.write_all(lines.join("\n").as_bytes())?;
        out.write_all(b"\n")
    })
    .map_err(|err| ConfigError::io(path, err))?;
    info!(
        "event=dynamic_config_written path={} keep_version={}",
        path.display(),
        keep_version
    );
    Ok(())
}

/// Rewrites the static file without membership entries and points it at
/// `dynamic_path`. Client port settings are dropped as well when
/// `erase_client_port` is set, since the dynamic membership now carries them.
pub fn edit_static_config(
    static_path: &Path,
    dynamic_path: &Path,
    erase_client_port: bool,
) -> Result<(), ConfigError> {
    if !static_path.exists() {
        return Err(ConfigError::MissingFile {
            path: static_path.to_path_buf(),
        });
    }
    let dynamic = fs::canonicalize(dynamic_path).map_err(|err| ConfigError::io(dynamic_path, err))?;
    let props = Properties::load(static_path)?;

    write_atomic(static_path, |out| {
        for (key, value) in props.iter() {
            if is_membership_key(key)
                || key == "version"
                || key == DYNAMIC_CONFIG_KEY
                || (erase_client_port && key.starts_with("clientPort"))
            {
                continue;
            }
            writeln!(out, "{key}={}", escape_value(value))?;
        }
        writeln!(
            out,
            "{DYNAMIC_CONFIG_KEY}={}",
            escape_value(&dynamic.display().to_string())
        )
    })
    .map_err(|err| ConfigError::io(static_path, err))
}

/// Atomic copy of the static file to its `.bak` sibling.
pub fn backup_static_config(paths: &DynamicConfigPaths) -> Result<PathBuf, ConfigError> {
    let source = paths.static_path();
    let backup = paths.backup_file();
    let bytes = fs::read(source).map_err(|err| ConfigError::io(source, err))?;
    write_atomic(&backup, |out| out.write_all(&bytes)).map_err(|err| ConfigError::io(&backup, err))?;
    info!(
        "event=static_config_backup source={} backup={}",
        source.display(),
        backup.display()
    );
    Ok(backup)
}

/// Removes `path` if present; failures are logged, not raised.
pub fn delete_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(
            "event=config_delete_failed path={} error={}",
            path.display(),
            err
        ),
    }
}

pub(crate) fn is_membership_key(key: &str) -> bool {
    key.starts_with("server.") || key.starts_with("group.") || key.starts_with("weight.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn versions_come_from_hex_suffix() {
        assert_eq!(
            version_from_filename(Path::new("/etc/zoo.cfg.dynamic.1001")),
            Some(0x1001)
        );
        assert_eq!(version_from_filename(Path::new("zoo.cfg.dynamic")), None);
        assert_eq!(version_from_filename(Path::new("noversion")), None);
    }

    #[test]
    fn naming_layers_on_the_static_file() {
        let paths = DynamicConfigPaths::new("/etc/zoo.cfg");
        assert_eq!(paths.dynamic_file(0x100), PathBuf::from("/etc/zoo.cfg.dynamic.100"));
        assert_eq!(paths.next_file(), PathBuf::from("/etc/zoo.cfg.dynamic.next"));
        assert_eq!(paths.backup_file(), PathBuf::from("/etc/zoo.cfg.bak"));
        assert_eq!(
            next_file_for(Path::new("/etc/zoo.cfg.dynamic.100")),
            paths.next_file()
        );
    }

    #[test]
    fn dynamic_file_omits_version_unless_asked() {
        let tmp = TempDir::new().expect("tempdir");
        let qv: QuorumVerifier = "server.1=zk1:3888\nserver.2=zk2:3888\nserver.3=zk3:3888\nversion=2a"
            .parse()
            .unwrap();
        let path = tmp.path().join("zoo.cfg.dynamic.2a");
        write_dynamic_config(&path, &qv, false).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(!text.contains("version"));
        assert!(text.starts_with("server.1=zk1:3888:participant\n"));

        write_dynamic_config(&path, &qv, true).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("version=2a"));
    }

    #[test]
    fn static_rewrite_strips_membership_and_points_at_dynamic_file() {
        let tmp = TempDir::new().expect("tempdir");
        let static_path = tmp.path().join("zoo.cfg");
        fs::write(
            &static_path,
            "dataDir=/data\nclientPort=2181\nserver.1=zk1:3888\ngroup.1=1\nversion=1\n\
             custom.path=C:\\\\data\n",
        )
        .unwrap();
        let dynamic = tmp.path().join("zoo.cfg.dynamic.1");
        fs::write(&dynamic, "server.1=zk1:3888\n").unwrap();

        edit_static_config(&static_path, &dynamic, true).unwrap();
        let props = Properties::load(&static_path).unwrap();
        assert_eq!(props.get("dataDir"), Some("/data"));
        assert_eq!(props.get("custom.path"), Some("C:\\data"));
        assert!(!props.contains_key("clientPort"));
        assert!(!props.contains_key("server.1"));
        assert!(!props.contains_key("group.1"));
        assert!(!props.contains_key("version"));
        let pointer = PathBuf::from(props.get(DYNAMIC_CONFIG_KEY).unwrap());
        assert_eq!(pointer, fs::canonicalize(&dynamic).unwrap());
    }

    #[test]
    fn delete_ignores_missing_files() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("zoo.cfg.dynamic.next");
        delete_file(&path);
        fs::write(&path, "x").unwrap();
        delete_file(&path);
        assert!(!path.exists());
    }
}
