//! Version gating for patch scripts using semver constraints
//!
//! Module versions are usually four-part assembly versions (`1.2.3.4`). They
//! are mapped onto semver before matching: the fourth component becomes build
//! metadata, which semver ignores when comparing, and missing minor or patch
//! components default to zero.

use semver::{Version, VersionReq};
use std::fmt;

/// A module version or `version_range` that cannot be parsed
#[derive(Debug, Clone)]
pub enum VersionError {
    /// Module version is neither semver nor an assembly version
    InvalidVersion { value: String, source: String },
    /// `version_range` is not a semver requirement
    InvalidRequirement { value: String, source: String },
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::InvalidVersion { value, source } => {
                write!(f, "invalid version '{}': {}", value, source)
            }
            VersionError::InvalidRequirement { value, source } => {
                write!(f, "invalid version requirement '{}': {}", value, source)
            }
        }
    }
}

impl std::error::Error for VersionError {}

/// Parse a module version, accepting assembly-style `major.minor[.build[.revision]]`.
pub fn parse_module_version(value: &str) -> Result<Version, VersionError> {
    let trimmed = value.trim();
    if let Ok(version) = Version::parse(trimmed) {
        return Ok(version);
    }

    let parts: Vec<&str> = trimmed.split('.').collect();
    let numeric = parts
        .iter()
        .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
    let normalized = match (numeric, parts.as_slice()) {
        (true, [major]) => Some(format!("{major}.0.0")),
        (true, [major, minor]) => Some(format!("{major}.{minor}.0")),
        (true, [major, minor, build, revision]) => {
            Some(format!("{major}.{minor}.{build}+{revision}"))
        }
        _ => None,
    };

    normalized
        .and_then(|v| Version::parse(&v).ok())
        .ok_or_else(|| VersionError::InvalidVersion {
            value: value.to_string(),
            source: Version::parse(trimmed)
                .err()
                .map(|e| e.to_string())
                .unwrap_or_default(),
        })
}

/// Whether a module version satisfies a script's `version_range`
///
/// # Examples
///
/// ```
/// use il_patcher::config::version::matches_requirement;
///
/// assert!(matches_requirement("4.2.0.0", Some(">=4.2.0")).unwrap());
/// assert!(matches_requirement("4.3.1", Some(">=4.2.0, <5.0.0")).unwrap());
/// assert!(!matches_requirement("4.1.9.7", Some(">=4.2.0")).unwrap());
///
/// // scripts without a range apply to every module
/// assert!(matches_requirement("1.0.0", None).unwrap());
/// ```
pub fn matches_requirement(
    version: &str,
    requirement: Option<&str>,
) -> Result<bool, VersionError> {
    let Some(req_str) = requirement else {
        return Ok(true);
    };

    let req_str = req_str.trim();
    if req_str.is_empty() {
        return Ok(true);
    }

    let version = parse_module_version(version)?;

    let req = VersionReq::parse(req_str).map_err(|e| VersionError::InvalidRequirement {
        value: req_str.to_string(),
        source: e.to_string(),
    })?;

    Ok(req.matches(&version))
}
