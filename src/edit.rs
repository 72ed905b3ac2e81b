use crate::error::PatchError;
use crate::model::{Body, Instruction, Operand};
use tracing::debug;

/// The edit primitive every patch operation compiles down to.
///
/// Positions are always interpreted against the body as it is *before* the
/// edit. All positions are range-checked before anything is mutated, so an
/// edit either applies completely or leaves the body untouched.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "BodyEdit does nothing until apply() is called"]
pub enum BodyEdit {
    /// Clear the body and fill it with the given sequence.
    ReplaceAll(Vec<Instruction>),
    /// Overwrite instructions in place; indices do not shift.
    Overwrite(Vec<(usize, Instruction)>),
    /// Insert before each position. Several inserts at the same position land
    /// in the order given.
    Insert(Vec<(usize, Instruction)>),
    /// Remove the instructions at the given positions.
    Remove(Vec<usize>),
    /// Replace only the operand of each addressed instruction.
    SetOperand(Vec<(usize, Operand)>),
}

/// Result of applying an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "EditResult should be checked for success/already-applied"]
pub enum EditResult {
    /// The body changed
    Applied { instructions_changed: usize },
    /// The body already had the requested content
    AlreadyApplied,
}

/// How a batch value list lines up with its index list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueIndexing {
    /// `values[i]` goes to `indices[i]`.
    ByOrder,
    /// `values[indices[i]]` goes to `indices[i]`: the value list is indexed by
    /// absolute instruction position.
    ByInstructionIndex,
}

/// Pair each index with its value according to `indexing`.
pub fn pair_values<T: Clone>(
    indices: &[usize],
    values: &[T],
    indexing: ValueIndexing,
) -> Result<Vec<(usize, T)>, PatchError> {
    match indexing {
        ValueIndexing::ByOrder => {
            if indices.len() != values.len() {
                return Err(PatchError::LengthMismatch {
                    indices: indices.len(),
                    values: values.len(),
                });
            }
            Ok(indices.iter().copied().zip(values.iter().cloned()).collect())
        }
        ValueIndexing::ByInstructionIndex => indices
            .iter()
            .map(|&index| {
                values
                    .get(index)
                    .cloned()
                    .map(|value| (index, value))
                    .ok_or(PatchError::OutOfRange {
                        index,
                        len: values.len(),
                        what: "value list",
                    })
            })
            .collect(),
    }
}

impl BodyEdit {
    fn validate(&self, body: &Body) -> Result<(), PatchError> {
        let len = body.len();
        let check = |index: usize, limit: usize| {
            if index < limit {
                Ok(())
            } else {
                Err(PatchError::OutOfRange {
                    index,
                    len,
                    what: "method body",
                })
            }
        };
        match self {
            BodyEdit::ReplaceAll(_) => Ok(()),
            BodyEdit::Overwrite(at) => at.iter().try_for_each(|(i, _)| check(*i, len)),
            // inserting at `len` appends
            BodyEdit::Insert(at) => at.iter().try_for_each(|(i, _)| check(*i, len + 1)),
            BodyEdit::Remove(indices) => indices.iter().try_for_each(|i| check(*i, len)),
            BodyEdit::SetOperand(at) => at.iter().try_for_each(|(i, _)| check(*i, len)),
        }
    }

    /// Apply the edit to `body`.
    pub fn apply(&self, body: &mut Body) -> Result<EditResult, PatchError> {
        self.validate(body)?;

        let result = match self {
            BodyEdit::ReplaceAll(instructions) => {
                if body.instructions() == instructions.as_slice() {
                    return Ok(EditResult::AlreadyApplied);
                }
                body.clear();
                for (idx, instruction) in instructions.iter().enumerate() {
                    body.insert(idx, instruction.clone());
                }
                EditResult::Applied {
                    instructions_changed: instructions.len(),
                }
            }
            BodyEdit::Overwrite(at) => {
                let mut changed = 0;
                for (index, instruction) in at {
                    if body.get(*index) != Some(instruction) {
                        body.set(*index, instruction.clone());
                        changed += 1;
                    }
                }
                applied_or_already(changed)
            }
            BodyEdit::Insert(at) => {
                let mut ordered: Vec<(usize, usize)> =
                    at.iter().enumerate().map(|(pos, (index, _))| (*index, pos)).collect();
                // highest position first; ties in reverse so they end up in given order
                ordered.sort_by(|a, b| b.cmp(a));
                for (index, pos) in ordered {
                    body.insert(index, at[pos].1.clone());
                }
                EditResult::Applied {
                    instructions_changed: at.len(),
                }
            }
            BodyEdit::Remove(indices) => {
                let mut ordered = indices.clone();
                ordered.sort_unstable_by(|a, b| b.cmp(a));
                ordered.dedup();
                for index in &ordered {
                    body.remove(*index);
                }
                EditResult::Applied {
                    instructions_changed: ordered.len(),
                }
            }
            BodyEdit::SetOperand(at) => {
                let mut changed = 0;
                for (index, operand) in at {
                    if let Some(instruction) = body.get_mut(*index) {
                        if instruction.operand.as_ref() != Some(operand) {
                            instruction.operand = Some(operand.clone());
                            changed += 1;
                        }
                    }
                }
                applied_or_already(changed)
            }
        };

        debug!(edit = self.kind(), ?result, "applied body edit");
        Ok(result)
    }

    fn kind(&self) -> &'static str {
        match self {
            BodyEdit::ReplaceAll(_) => "replace-all",
            BodyEdit::Overwrite(_) => "overwrite",
            BodyEdit::Insert(_) => "insert",
            BodyEdit::Remove(_) => "remove",
            BodyEdit::SetOperand(_) => "set-operand",
        }
    }
}

fn applied_or_already(changed: usize) -> EditResult {
    if changed == 0 {
        EditResult::AlreadyApplied
    } else {
        EditResult::Applied {
            instructions_changed: changed,
        }
    }
}
