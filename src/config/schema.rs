use crate::model::{Instruction, Operand};
use crate::target::Target;
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub patches: Vec<PatchDefinition>,
}

impl PatchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.patches.is_empty() {
            issues.push(ValidationIssue::EmptyPatchList);
        }

        for patch in &self.patches {
            if patch.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: None,
                    field: "id",
                });
            }
            let id = Some(patch.id.clone());
            let target = &patch.target;

            if target.class.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: id.clone(),
                    field: "target.class",
                });
            }
            if target.method.as_deref().unwrap_or("").trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: id.clone(),
                    field: "target.method",
                });
            }

            if let Some(locate) = &patch.locate {
                if locate.opcode.trim().is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        patch_id: id.clone(),
                        field: "locate.opcode",
                    });
                }
                if locate.occurrence == 0 {
                    issues.push(ValidationIssue::InvalidCombo {
                        patch_id: id.clone(),
                        message: "locate.occurrence is 1-based".to_string(),
                    });
                }
                if target.index.is_some() || target.indices.is_some() {
                    issues.push(ValidationIssue::InvalidCombo {
                        patch_id: id.clone(),
                        message: "locate cannot be combined with target.index or target.indices"
                            .to_string(),
                    });
                }
                if !patch.operation.is_positional() {
                    issues.push(ValidationIssue::InvalidCombo {
                        patch_id: id.clone(),
                        message: format!(
                            "locate has no effect on a {} operation",
                            patch.operation.kind()
                        ),
                    });
                }
            } else if patch.operation.is_positional()
                && target.index.is_none()
                && target.indices.is_none()
            {
                issues.push(ValidationIssue::MissingField {
                    patch_id: id.clone(),
                    field: "target.index",
                });
            }

            match &patch.operation {
                Operation::ReplaceBody { instructions } => {
                    if instructions.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: id.clone(),
                            field: "operation.instructions",
                        });
                    }
                }
                Operation::PatchOffsets { instructions }
                | Operation::ReplaceInstruction { instructions }
                | Operation::Insert { instructions } => {
                    if instructions.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: id.clone(),
                            field: "operation.instructions",
                        });
                    }
                    if let Some(indices) = &target.indices {
                        let by_position = matches!(
                            patch.operation,
                            Operation::ReplaceInstruction { .. }
                        );
                        if !by_position && indices.len() != instructions.len() {
                            issues.push(ValidationIssue::InvalidCombo {
                                patch_id: id.clone(),
                                message: format!(
                                    "{} indices but {} instructions",
                                    indices.len(),
                                    instructions.len()
                                ),
                            });
                        }
                    } else if instructions.len() > 1 {
                        issues.push(ValidationIssue::InvalidCombo {
                            patch_id: id.clone(),
                            message: "several instructions need target.indices".to_string(),
                        });
                    }
                }
                Operation::PatchOperand { value } => {
                    if let Operand::Str(s) | Operand::Symbol(s) = value {
                        if s.is_empty() {
                            issues.push(ValidationIssue::MissingField {
                                patch_id: id.clone(),
                                field: "operation.value",
                            });
                        }
                    }
                }
                Operation::Remove | Operation::ReturnBody { .. } | Operation::EmptyBody => {}
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Semver requirement checked against the module's version.
    #[serde(default)]
    pub version_range: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PatchDefinition {
    pub id: String,
    pub target: Target,
    /// Find the addressed instruction at apply time instead of hardcoding `target.index`.
    #[serde(default)]
    pub locate: Option<Locate>,
    pub operation: Operation,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Locate {
    pub opcode: String,
    #[serde(default)]
    pub operand: Option<Operand>,
    #[serde(default = "first")]
    pub occurrence: usize,
}

fn first() -> usize {
    1
}

impl Locate {
    pub fn pattern(&self) -> Instruction {
        Instruction {
            opcode: self.opcode.clone(),
            operand: self.operand.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Operation {
    ReplaceBody {
        instructions: Vec<Instruction>,
    },
    PatchOffsets {
        instructions: Vec<Instruction>,
    },
    ReplaceInstruction {
        instructions: Vec<Instruction>,
    },
    Insert {
        instructions: Vec<Instruction>,
    },
    Remove,
    PatchOperand {
        value: Operand,
    },
    ReturnBody {
        value: bool,
    },
    EmptyBody,
}

impl Operation {
    /// Operations that address instructions by position.
    pub fn is_positional(&self) -> bool {
        matches!(
            self,
            Operation::PatchOffsets { .. }
                | Operation::ReplaceInstruction { .. }
                | Operation::Insert { .. }
                | Operation::Remove
                | Operation::PatchOperand { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operation::ReplaceBody { .. } => "replace-body",
            Operation::PatchOffsets { .. } => "patch-offsets",
            Operation::ReplaceInstruction { .. } => "replace-instruction",
            Operation::Insert { .. } => "insert",
            Operation::Remove => "remove",
            Operation::PatchOperand { .. } => "patch-operand",
            Operation::ReturnBody { .. } => "return-body",
            Operation::EmptyBody => "empty-body",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyPatchList,
    MissingField {
        patch_id: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        patch_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPatchList => write!(f, "patch script contains no patches"),
            ValidationIssue::MissingField { patch_id, field } => match patch_id {
                Some(id) => write!(f, "patch '{id}' missing required field '{field}'"),
                None => write!(f, "patch missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo { patch_id, message } => match patch_id {
                Some(id) => write!(f, "patch '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid patch configuration: {message}"),
            },
        }
    }
}
