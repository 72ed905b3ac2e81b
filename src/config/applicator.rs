//! Patch applicator - runs patch scripts against a patching session
//!
//! This module provides high-level patch application that:
//! - Gates the whole script on the module's version
//! - Locates instructions by pattern when a patch asks for it
//! - Maps each operation onto the matching [`Patcher`] call
//! - Reports a result per patch without stopping at the first failure

use crate::config::schema::{Locate, Operation, PatchConfig, PatchDefinition};
use crate::config::version::{matches_requirement, VersionError};
use crate::edit::EditResult;
use crate::error::PatchError;
use crate::model::{Instruction, Module, ModuleProvider};
use crate::patcher::Patcher;
use crate::target::Target;
use std::fmt;
use tracing::debug;

/// Result of applying a single patch
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchResult should be checked for success/failure"]
pub enum PatchResult {
    /// Patch changed the method body
    Applied { method: String },
    /// Method body already had the patched content
    AlreadyApplied { method: String },
    /// Patch was skipped due to version constraint
    SkippedVersion { reason: String },
}

impl fmt::Display for PatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchResult::Applied { method } => write!(f, "Applied patch to {}", method),
            PatchResult::AlreadyApplied { method } => write!(f, "Already applied to {}", method),
            PatchResult::SkippedVersion { reason } => write!(f, "Skipped (version): {}", reason),
        }
    }
}

/// Errors during patch application
#[derive(Debug)]
pub enum ApplicationError {
    /// Version filtering error
    Version(VersionError),
    /// Resolution or edit failure
    Patch(PatchError),
    /// `locate` pattern matched fewer times than the requested occurrence
    LocateFailed {
        method: String,
        pattern: String,
        occurrence: usize,
    },
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationError::Version(e) => write!(f, "version error: {}", e),
            ApplicationError::Patch(e) => write!(f, "patch error: {}", e),
            ApplicationError::LocateFailed {
                method,
                pattern,
                occurrence,
            } => write!(
                f,
                "occurrence {} of `{}` not found in {}",
                occurrence, pattern, method
            ),
        }
    }
}

impl std::error::Error for ApplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplicationError::Version(e) => Some(e),
            ApplicationError::Patch(e) => Some(e),
            ApplicationError::LocateFailed { .. } => None,
        }
    }
}

impl From<VersionError> for ApplicationError {
    fn from(e: VersionError) -> Self {
        ApplicationError::Version(e)
    }
}

impl From<PatchError> for ApplicationError {
    fn from(e: PatchError) -> Self {
        ApplicationError::Patch(e)
    }
}

/// Apply every patch of a script, in order, to the session's module.
///
/// A failing patch does not stop the rest; its error is reported in place.
pub fn apply_patches<P: ModuleProvider>(
    config: &PatchConfig,
    patcher: &mut Patcher<P>,
) -> Vec<(String, Result<PatchResult, ApplicationError>)> {
    match version_gate(config, patcher.module()) {
        Ok(None) => config
            .patches
            .iter()
            .map(|patch| (patch.id.clone(), apply_patch(patch, patcher)))
            .collect(),
        Ok(Some(reason)) => config
            .patches
            .iter()
            .map(|patch| {
                (
                    patch.id.clone(),
                    Ok(PatchResult::SkippedVersion {
                        reason: reason.clone(),
                    }),
                )
            })
            .collect(),
        Err(e) => config
            .patches
            .iter()
            .map(|patch| (patch.id.clone(), Err(ApplicationError::Version(e.clone()))))
            .collect(),
    }
}

/// Check patch status without mutating the session.
///
/// Same result semantics as [`apply_patches`] (`Applied` means "would
/// apply"), computed against a copy of the module.
pub fn check_patches<P: ModuleProvider + Clone>(
    config: &PatchConfig,
    patcher: &Patcher<P>,
) -> Vec<(String, Result<PatchResult, ApplicationError>)> {
    let mut scratch = patcher.clone();
    apply_patches(config, &mut scratch)
}

/// `Ok(Some(reason))` when the script does not apply to this module.
fn version_gate(config: &PatchConfig, module: &Module) -> Result<Option<String>, VersionError> {
    let requirement = config.meta.version_range.as_deref();
    let Some(version) = module.version.as_deref() else {
        return match requirement.map(str::trim) {
            Some(req) if !req.is_empty() => Ok(Some(format!(
                "module {} declares no version; version_range {req} cannot be checked",
                module.name
            ))),
            _ => Ok(None),
        };
    };

    if matches_requirement(version, requirement)? {
        Ok(None)
    } else {
        let req = requirement.unwrap_or("").trim();
        Ok(Some(format!(
            "module version {version} does not satisfy version_range {req}"
        )))
    }
}

fn apply_patch<P: ModuleProvider>(
    patch: &PatchDefinition,
    patcher: &mut Patcher<P>,
) -> Result<PatchResult, ApplicationError> {
    let mut target = patch.target.clone();
    if let Some(locate) = &patch.locate {
        let index = locate_index(patcher, &target, locate)?;
        target = target.index(index);
    }

    let result = match &patch.operation {
        Operation::ReplaceBody { instructions } => {
            target.instruction = None;
            target.instructions = Some(instructions.clone());
            patcher.patch_and_clear(&target)?
        }
        Operation::PatchOffsets { instructions } => {
            patcher.patch_offsets(&with_payload(target.clone(), instructions))?
        }
        Operation::ReplaceInstruction { instructions } => {
            patcher.replace_instruction(&with_payload(target.clone(), instructions))?
        }
        Operation::Insert { instructions } => {
            patcher.insert_instruction(&with_payload(target.clone(), instructions))?
        }
        Operation::Remove => patcher.remove_instruction(&target)?,
        Operation::PatchOperand { value } => patcher.patch_operand(&target, value.clone())?,
        Operation::ReturnBody { value } => patcher.write_return_body(&target, *value)?,
        Operation::EmptyBody => patcher.write_empty_body(&target)?,
    };

    let method = target.clear_addressing().to_string();
    debug!(patch = %patch.id, operation = patch.operation.kind(), ?result, "applied patch");
    Ok(match result {
        EditResult::Applied { .. } => PatchResult::Applied { method },
        EditResult::AlreadyApplied => PatchResult::AlreadyApplied { method },
    })
}

fn locate_index<P: ModuleProvider>(
    patcher: &Patcher<P>,
    target: &Target,
    locate: &Locate,
) -> Result<usize, ApplicationError> {
    let pattern = locate.pattern();
    patcher
        .find_instruction(target, &pattern, locate.occurrence)?
        .ok_or_else(|| ApplicationError::LocateFailed {
            method: target.to_string(),
            pattern: pattern.to_string(),
            occurrence: locate.occurrence,
        })
}

/// Put the operation's instructions on the target in the shape its addressing
/// expects: a list next to `indices`, a single instruction next to `index`.
fn with_payload(mut target: Target, instructions: &[Instruction]) -> Target {
    target.instruction = None;
    target.instructions = None;
    match instructions {
        [single] if target.indices.is_none() => target.instruction = Some(single.clone()),
        _ => target.instructions = Some(instructions.to_vec()),
    }
    target
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::load_from_str;
    use crate::model::{JsonProvider, MethodDef, TypeDef};

    fn patcher(version: Option<&str>) -> Patcher {
        let mut module = Module::new("app").with_type(
            TypeDef::new("App", "License").with_method(
                MethodDef::new("IsValid")
                    .returning("Boolean")
                    .with_body(vec![Instruction::ldc_i4(0), Instruction::ret()]),
            ),
        );
        module.version = version.map(str::to_string);
        Patcher::from_module(module, JsonProvider, false)
    }

    const SCRIPT: &str = r#"
[meta]
name = "license"
version_range = ">=4.0.0"

[[patches]]
id = "always-valid"
target = { namespace = "App", class = "License", method = "IsValid" }
operation = { type = "return-body", value = true }
"#;

    #[test]
    fn test_apply_then_already_applied() {
        let config = load_from_str(SCRIPT).unwrap();
        let mut p = patcher(Some("4.1.0.0"));

        let results = apply_patches(&config, &mut p);
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].1.as_ref().unwrap(),
            &PatchResult::Applied {
                method: "App.License::IsValid".to_string()
            }
        );

        let again = apply_patches(&config, &mut p);
        assert!(matches!(
            again[0].1,
            Ok(PatchResult::AlreadyApplied { .. })
        ));
    }

    #[test]
    fn test_version_mismatch_skips() {
        let config = load_from_str(SCRIPT).unwrap();
        let mut p = patcher(Some("3.9.0.0"));
        let results = apply_patches(&config, &mut p);
        assert!(matches!(
            results[0].1,
            Ok(PatchResult::SkippedVersion { .. })
        ));
        assert_eq!(p.module().types[0].methods[0].body.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_module_version_skips_gated_script() {
        let config = load_from_str(SCRIPT).unwrap();
        let mut p = patcher(None);
        let results = apply_patches(&config, &mut p);
        match &results[0].1 {
            Ok(PatchResult::SkippedVersion { reason }) => assert!(reason.contains("no version")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_check_does_not_mutate() {
        let config = load_from_str(SCRIPT).unwrap();
        let p = patcher(Some("4.0.0"));
        let before = p.module().clone();
        let results = check_patches(&config, &p);
        assert!(matches!(results[0].1, Ok(PatchResult::Applied { .. })));
        assert_eq!(p.module(), &before);
    }

    #[test]
    fn test_with_payload_shapes() {
        let one = [Instruction::nop()];
        let single = with_payload(Target::new("N", "C").index(0), &one);
        assert_eq!(single.instruction, Some(Instruction::nop()));
        assert!(single.instructions.is_none());

        let batch = with_payload(Target::new("N", "C").indices(vec![0]), &one);
        assert!(batch.instruction.is_none());
        assert_eq!(batch.instructions, Some(vec![Instruction::nop()]));
    }
}
