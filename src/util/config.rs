use crate::util::error::ConfigError;
use log::warn;
use std::path::{Component, Path, PathBuf};

/// If `path` is relative, joins it to `base`; otherwise returns it unchanged.
pub fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

/// Directory holding `config_path`, `.` when the path has no parent.
pub fn config_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Checks applied to configuration paths before they are opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathChecks {
    pub warn_relative: bool,
    pub require_existing: bool,
}

impl PathChecks {
    pub fn warn_relative() -> Self {
        Self {
            warn_relative: true,
            require_existing: false,
        }
    }

    pub fn strict() -> Self {
        Self {
            warn_relative: true,
            require_existing: true,
        }
    }

    pub fn verify(&self, path: &Path) -> Result<PathBuf, ConfigError> {
        if self.warn_relative && path.is_relative() && !is_explicitly_local(path) {
            warn!(
                "event=config_relative_path path={} hint=prepend_./_to_confirm",
                path.display()
            );
        }
        if self.require_existing && !path.exists() {
            return Err(ConfigError::MissingFile {
                path: path.to_path_buf(),
            });
        }
        Ok(path.to_path_buf())
    }
}

fn is_explicitly_local(path: &Path) -> bool {
    matches!(path.components().next(), Some(Component::CurDir))
}
