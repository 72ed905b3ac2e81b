//! Target descriptors: the symbolic address of the code to patch.
//!
//! [`Target`] is the serializable wire form with every field optional. Patch
//! operations never read its addressing fields directly; they validate it into
//! one of the tagged forms ([`Addressing`] or [`Payload`]) first, so a target
//! with both or neither addressing form set is rejected with a distinct error.

use crate::error::PatchError;
use crate::model::Instruction;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub namespace: String,
    pub class: String,
    /// Single nested type. Ignored when `nested_classes` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested_class: Option<String>,
    /// Chain of nested type names, outermost first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested_classes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Parameter type names, used for overload disambiguation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indices: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<Instruction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<Vec<Instruction>>,
}

/// Which instruction positions an operation addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Addressing {
    Single(usize),
    Batch(Vec<usize>),
}

/// Positions plus the instructions to put there.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Single {
        index: usize,
        instruction: Instruction,
    },
    Batch {
        indices: Vec<usize>,
        instructions: Vec<Instruction>,
    },
    FullReplace(Vec<Instruction>),
}

impl Target {
    pub fn new(namespace: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            class: class.into(),
            ..Self::default()
        }
    }

    /// Append one level to the nested-type chain.
    pub fn nested(mut self, name: impl Into<String>) -> Self {
        self.nested_classes
            .get_or_insert_with(Vec::new)
            .push(name.into());
        self
    }

    pub fn method(mut self, name: impl Into<String>) -> Self {
        self.method = Some(name.into());
        self
    }

    pub fn parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = Some(parameters.into_iter().map(Into::into).collect());
        self
    }

    pub fn return_type(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = Some(return_type.into());
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn indices(mut self, indices: impl Into<Vec<usize>>) -> Self {
        self.indices = Some(indices.into());
        self
    }

    pub fn instruction(mut self, instruction: Instruction) -> Self {
        self.instruction = Some(instruction);
        self
    }

    pub fn instructions(mut self, instructions: impl Into<Vec<Instruction>>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Drop every addressing and payload field, keeping the symbol address.
    pub fn clear_addressing(mut self) -> Self {
        self.index = None;
        self.indices = None;
        self.instruction = None;
        self.instructions = None;
        self
    }

    /// `Namespace.Class`, as passed to type resolution.
    pub fn type_name(&self) -> String {
        format!("{}.{}", self.namespace, self.class)
    }

    /// Nested-type chain. `nested_classes` takes precedence over `nested_class`.
    pub fn nested_chain(&self) -> Vec<&str> {
        if let Some(chain) = &self.nested_classes {
            chain.iter().map(String::as_str).collect()
        } else if let Some(single) = &self.nested_class {
            vec![single.as_str()]
        } else {
            Vec::new()
        }
    }

    /// Validate `index` xor `indices`.
    pub fn addressing(&self) -> Result<Addressing, PatchError> {
        match (self.index, &self.indices) {
            (Some(index), None) => Ok(Addressing::Single(index)),
            (None, Some(indices)) => Ok(Addressing::Batch(indices.clone())),
            (Some(_), Some(_)) => Err(PatchError::AddressingConflict {
                single: "index",
                batch: "indices",
            }),
            (None, None) => Err(PatchError::MalformedTarget {
                message: "neither index nor indices specified".to_string(),
            }),
        }
    }

    /// Validate the payload of an in-place overwrite.
    ///
    /// Reports the specific field that is missing when one half of an
    /// addressing pair is set without the other.
    pub fn offset_payload(&self) -> Result<Payload, PatchError> {
        self.reject_doubled_payload()?;
        match (self.index, &self.indices) {
            (Some(_), Some(_)) => Err(PatchError::AddressingConflict {
                single: "index",
                batch: "indices",
            }),
            (None, Some(indices)) => {
                let instructions = self
                    .instructions
                    .as_ref()
                    .ok_or(PatchError::MissingField {
                        field: "instructions",
                    })?;
                if instructions.len() != indices.len() {
                    return Err(PatchError::LengthMismatch {
                        indices: indices.len(),
                        values: instructions.len(),
                    });
                }
                Ok(Payload::Batch {
                    indices: indices.clone(),
                    instructions: instructions.clone(),
                })
            }
            (Some(index), None) => {
                let instruction = self
                    .instruction
                    .clone()
                    .ok_or(PatchError::MissingField {
                        field: "instruction",
                    })?;
                Ok(Payload::Single { index, instruction })
            }
            (None, None) if self.instructions.is_some() => {
                Err(PatchError::MissingField { field: "indices" })
            }
            (None, None) => Err(PatchError::MissingField { field: "index" }),
        }
    }

    /// Validate a complete single or batch pair, with no per-field detail.
    ///
    /// The batch instructions are not length-checked against the indices; the
    /// caller decides how the two lists line up.
    pub fn pair_payload(&self) -> Result<Payload, PatchError> {
        let single = match (self.index, &self.instruction) {
            (Some(index), Some(instruction)) => Some(Payload::Single {
                index,
                instruction: instruction.clone(),
            }),
            _ => None,
        };
        let batch = match (&self.indices, &self.instructions) {
            (Some(indices), Some(instructions)) => Some(Payload::Batch {
                indices: indices.clone(),
                instructions: instructions.clone(),
            }),
            _ => None,
        };
        match (single, batch) {
            (Some(payload), None) | (None, Some(payload)) => Ok(payload),
            (Some(_), Some(_)) => Err(PatchError::AddressingConflict {
                single: "index",
                batch: "indices",
            }),
            (None, None) => Err(PatchError::MalformedTarget {
                message: "expected index+instruction or indices+instructions".to_string(),
            }),
        }
    }

    /// Payload for a full body replacement: `instructions`, else `instruction`.
    pub fn body_payload(&self) -> Result<Payload, PatchError> {
        if let Some(instructions) = &self.instructions {
            Ok(Payload::FullReplace(instructions.clone()))
        } else if let Some(instruction) = &self.instruction {
            Ok(Payload::FullReplace(vec![instruction.clone()]))
        } else {
            Err(PatchError::MissingField {
                field: "instructions",
            })
        }
    }

    fn reject_doubled_payload(&self) -> Result<(), PatchError> {
        if self.instruction.is_some() && self.instructions.is_some() {
            return Err(PatchError::AddressingConflict {
                single: "instruction",
                batch: "instructions",
            });
        }
        Ok(())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.class)?;
        } else {
            write!(f, "{}.{}", self.namespace, self.class)?;
        }
        for nested in self.nested_chain() {
            write!(f, "/{nested}")?;
        }
        if let Some(method) = &self.method {
            write!(f, "::{method}")?;
            if let Some(params) = &self.parameters {
                write!(f, "({})", params.join(","))?;
            }
        }
        Ok(())
    }
}

/// Parses `Namespace.Class[/Nested...][::Method]`.
impl FromStr for Target {
    type Err = PatchError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        let (type_part, method) = match input.rsplit_once("::") {
            Some((ty, method)) => (ty, Some(method)),
            None => (input, None),
        };

        let mut segments = type_part.split('/');
        let full_name = segments.next().unwrap_or_default();
        let (namespace, class) = match full_name.rsplit_once('.') {
            Some((ns, class)) => (ns, class),
            None => ("", full_name),
        };
        if class.is_empty() {
            return Err(PatchError::MalformedTarget {
                message: format!("no class name in '{input}'"),
            });
        }

        let mut target = Target::new(namespace, class);
        for nested in segments {
            if nested.is_empty() {
                return Err(PatchError::MalformedTarget {
                    message: format!("empty nested type name in '{input}'"),
                });
            }
            target = target.nested(nested);
        }
        if let Some(method) = method {
            if method.is_empty() {
                return Err(PatchError::MalformedTarget {
                    message: format!("empty method name in '{input}'"),
                });
            }
            target = target.method(method);
        }
        Ok(target)
    }
}
