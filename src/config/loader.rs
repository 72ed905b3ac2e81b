use crate::config::schema::{PatchConfig, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Failure to find, read or accept a patch script.
#[derive(Debug)]
pub enum ConfigError {
    /// A script file could not be read.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A scripts directory could not be walked.
    Discover {
        root: PathBuf,
        source: walkdir::Error,
    },
    /// Script text is not TOML of the patch-script shape. `script` is `None`
    /// for scripts parsed from a string.
    Parse {
        script: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    /// Script parsed but one or more patches are unusable.
    Invalid {
        script: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    /// Script file this error came from, when known.
    pub fn script(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } => Some(path.as_path()),
            ConfigError::Discover { .. } => None,
            ConfigError::Parse { script, .. } | ConfigError::Invalid { script, .. } => {
                script.as_deref()
            }
        }
    }

    fn in_script(self, path: &Path) -> Self {
        match self {
            ConfigError::Parse { script: None, source } => ConfigError::Parse {
                script: Some(path.to_path_buf()),
                source,
            },
            ConfigError::Invalid { script: None, source } => ConfigError::Invalid {
                script: Some(path.to_path_buf()),
                source,
            },
            other => other,
        }
    }
}

fn script_label(script: &Option<PathBuf>) -> String {
    script
        .as_ref()
        .map(|p| format!(" {}", p.display()))
        .unwrap_or_default()
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "cannot read patch script {}: {}", path.display(), source)
            }
            ConfigError::Discover { root, source } => {
                write!(f, "cannot list patch scripts under {}: {}", root.display(), source)
            }
            ConfigError::Parse { script, source } => write!(
                f,
                "patch script{} does not parse: {}",
                script_label(script),
                source
            ),
            ConfigError::Invalid { script, source } => write!(
                f,
                "patch script{} rejected: {}",
                script_label(script),
                source
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Discover { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid { source, .. } => Some(source),
        }
    }
}

/// Parse and validate a patch script.
pub fn load_from_str(input: &str) -> Result<PatchConfig, ConfigError> {
    let config: PatchConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Parse { script: None, source })?;
    config
        .validate()
        .map_err(|source| ConfigError::Invalid { script: None, source })?;
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.in_script(path))
}

/// Patch scripts under `dir`, sorted by path. A file path is returned as is.
pub fn discover(path: impl AsRef<Path>) -> Result<Vec<PathBuf>, ConfigError> {
    let path = path.as_ref();
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(true) {
        let entry = entry.map_err(|source| ConfigError::Discover {
            root: path.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "toml")
        {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}
