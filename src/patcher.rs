//! A patching session over one loaded module.
//!
//! Every mutating operation resolves its target, requires a method body, turns
//! the target's addressing fields into a [`BodyEdit`] and applies it. A failed
//! call leaves the body as it was; changes from earlier calls stay in place.

use crate::edit::{pair_values, BodyEdit, EditResult, ValueIndexing};
use crate::error::PatchError;
use crate::model::{
    Body, Instruction, JsonProvider, MethodId, Module, ModuleProvider, Operand, WriterOptions,
};
use crate::persist::{self, SaveReport};
use crate::reference::{MemberRef, MemberRefKind};
use crate::resolve::resolve_target;
use crate::search::{self, MethodHit};
use crate::target::{Addressing, Payload, Target};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Owns the module graph, the provider that loaded it, and where it came from.
#[derive(Debug, Clone)]
pub struct Patcher<P: ModuleProvider = JsonProvider> {
    module: Module,
    provider: P,
    source: Option<PathBuf>,
    options: WriterOptions,
}

impl<P: ModuleProvider> Patcher<P> {
    /// Load a module image from disk. [`Patcher::save`] writes back to `path`.
    pub fn open(
        path: impl AsRef<Path>,
        provider: P,
        keep_old_max_stack: bool,
    ) -> Result<Self, PatchError> {
        let path = path.as_ref();
        let module = provider.load_path(path)?;
        debug!(path = %path.display(), module = %module.name, "opened module");
        Ok(Self {
            module,
            provider,
            source: Some(path.to_path_buf()),
            options: WriterOptions { keep_old_max_stack },
        })
    }

    /// Load a module image from a stream. The session has no backing file.
    pub fn from_reader(
        reader: &mut dyn Read,
        provider: P,
        keep_old_max_stack: bool,
    ) -> Result<Self, PatchError> {
        let module = provider.load(reader)?;
        Ok(Self::from_module(module, provider, keep_old_max_stack))
    }

    pub fn from_module(module: Module, provider: P, keep_old_max_stack: bool) -> Self {
        Self {
            module,
            provider,
            source: None,
            options: WriterOptions { keep_old_max_stack },
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut Module {
        &mut self.module
    }

    pub fn into_module(self) -> Module {
        self.module
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn writer_options(&self) -> WriterOptions {
        self.options
    }

    // ---- edits ----

    /// Clear the body and insert `instructions` (or the single `instruction`).
    pub fn patch_and_clear(&mut self, target: &Target) -> Result<EditResult, PatchError> {
        let instructions = payload_pairs(target.body_payload()?, ValueIndexing::ByOrder)?
            .into_iter()
            .map(|(_, instruction)| instruction)
            .collect();
        self.apply(target, BodyEdit::ReplaceAll(instructions))
    }

    /// Overwrite existing instructions in place.
    ///
    /// `instructions[i]` lands at `indices[i]`; the two lists must have the
    /// same length.
    pub fn patch_offsets(&mut self, target: &Target) -> Result<EditResult, PatchError> {
        let at = payload_pairs(target.offset_payload()?, ValueIndexing::ByOrder)?;
        self.apply(target, BodyEdit::Overwrite(at))
    }

    /// Overwrite without shifting.
    ///
    /// The batch form reads `instructions[indices[i]]`: the instruction list
    /// is indexed by absolute body position, not by order in `indices`.
    pub fn replace_instruction(&mut self, target: &Target) -> Result<EditResult, PatchError> {
        let at = payload_pairs(target.pair_payload()?, ValueIndexing::ByInstructionIndex)?;
        self.apply(target, BodyEdit::Overwrite(at))
    }

    /// Insert before the addressed position(s), shifting later instructions.
    /// Batch offsets refer to the body before any of the inserts.
    pub fn insert_instruction(&mut self, target: &Target) -> Result<EditResult, PatchError> {
        let at = payload_pairs(target.pair_payload()?, ValueIndexing::ByOrder)?;
        self.apply(target, BodyEdit::Insert(at))
    }

    pub fn remove_instruction(&mut self, target: &Target) -> Result<EditResult, PatchError> {
        let indices = match target.addressing()? {
            Addressing::Single(index) => vec![index],
            Addressing::Batch(indices) => indices,
        };
        self.apply(target, BodyEdit::Remove(indices))
    }

    /// Set the operand of every addressed instruction to `value`.
    pub fn patch_operand(
        &mut self,
        target: &Target,
        value: impl Into<Operand>,
    ) -> Result<EditResult, PatchError> {
        let value = value.into();
        let at = match target.addressing()? {
            Addressing::Single(index) => vec![(index, value)],
            Addressing::Batch(indices) => indices.into_iter().map(|i| (i, value.clone())).collect(),
        };
        self.apply(target, BodyEdit::SetOperand(at))
    }

    /// Set a distinct operand per addressed instruction. Only `indices` is
    /// accepted, and `values` is indexed by absolute body position.
    pub fn patch_operands(
        &mut self,
        target: &Target,
        values: &[Operand],
    ) -> Result<EditResult, PatchError> {
        let indices = match target.addressing()? {
            Addressing::Batch(indices) => indices,
            Addressing::Single(_) => {
                return Err(PatchError::MalformedTarget {
                    message: "an operand list needs indices, not a single index".to_string(),
                })
            }
        };
        let at = pair_values(&indices, values, ValueIndexing::ByInstructionIndex)?;
        self.apply(target, BodyEdit::SetOperand(at))
    }

    /// Replace the body with `return true` or `return false`.
    pub fn write_return_body(
        &mut self,
        target: &Target,
        value: bool,
    ) -> Result<EditResult, PatchError> {
        let push = if value { "ldc.i4.1" } else { "ldc.i4.0" };
        self.apply(
            target,
            BodyEdit::ReplaceAll(vec![Instruction::new(push), Instruction::ret()]),
        )
    }

    /// Replace the body with a lone `ret`.
    pub fn write_empty_body(&mut self, target: &Target) -> Result<EditResult, PatchError> {
        self.apply(target, BodyEdit::ReplaceAll(vec![Instruction::ret()]))
    }

    fn apply(&mut self, target: &Target, edit: BodyEdit) -> Result<EditResult, PatchError> {
        let body = self.body_mut(target)?;
        let result = edit.apply(body)?;
        debug!(method = %target, ?result, "patched method");
        Ok(result)
    }

    fn body_mut(&mut self, target: &Target) -> Result<&mut Body, PatchError> {
        let id = resolve_target(&self.module, target)?;
        let method = self.module.method_mut(&id).ok_or_else(|| stale(&id))?;
        let signature = method.signature();
        method
            .body
            .as_mut()
            .ok_or(PatchError::NoBody { method: signature })
    }

    // ---- reads ----

    fn body(&self, target: &Target) -> Result<&Body, PatchError> {
        let id = resolve_target(&self.module, target)?;
        let method = self.module.method(&id).ok_or_else(|| stale(&id))?;
        method.body.as_ref().ok_or_else(|| PatchError::NoBody {
            method: method.signature(),
        })
    }

    /// The full instruction sequence of the target's method.
    pub fn instructions(&self, target: &Target) -> Result<Vec<Instruction>, PatchError> {
        Ok(self.body(target)?.instructions().to_vec())
    }

    /// String form of the operand at `target.index`.
    pub fn operand(&self, target: &Target) -> Result<String, PatchError> {
        let index = target.index.ok_or(PatchError::MissingField { field: "index" })?;
        let body = self.body(target)?;
        let instruction = body.get(index).ok_or(PatchError::OutOfRange {
            index,
            len: body.len(),
            what: "method body",
        })?;
        instruction
            .operand_text()
            .ok_or(PatchError::MissingOperand { index })
    }

    // ---- search ----

    pub fn find_by_operand_values<S: AsRef<str>>(&self, values: &[S]) -> Vec<Target> {
        search::find_by_operand_values(&self.module, values)
    }

    pub fn find_by_int_operands(&self, values: &[i64]) -> Vec<Target> {
        search::find_by_int_operands(&self.module, values)
    }

    pub fn find_by_opcodes<S: AsRef<str>>(&self, opcodes: &[S]) -> Vec<Target> {
        search::find_by_opcodes(&self.module, opcodes)
    }

    pub fn find_methods_by_signature<S: AsRef<str>>(&self, signature: &[S]) -> Vec<MethodHit> {
        search::find_methods_by_signature(&self.module, signature)
    }

    pub fn find_by_operand_values_in<S: AsRef<str>>(
        &self,
        target: &Target,
        values: &[S],
        consume: bool,
    ) -> Result<Vec<Target>, PatchError> {
        search::find_by_operand_values_in(&self.module, target, values, consume)
    }

    pub fn find_by_opcodes_in<S: AsRef<str>>(
        &self,
        target: &Target,
        opcodes: &[S],
        consume: bool,
    ) -> Result<Vec<Target>, PatchError> {
        search::find_by_opcodes_in(&self.module, target, opcodes, consume)
    }

    pub fn find_instruction(
        &self,
        target: &Target,
        pattern: &Instruction,
        occurrence: usize,
    ) -> Result<Option<usize>, PatchError> {
        search::find_instruction(&self.module, target, pattern, occurrence)
    }

    // ---- references ----

    /// A `void name(string)` reference scoped to the module's core library.
    pub fn build_member_ref(
        &self,
        namespace: &str,
        class: &str,
        name: &str,
        kind: MemberRefKind,
    ) -> MemberRef {
        MemberRef::string_sink(self.module.corlib.clone(), namespace, class, name, kind)
    }

    // ---- persistence ----

    /// Serialize the module to `destination`.
    pub fn save_to(&self, destination: impl AsRef<Path>) -> Result<SaveReport, PatchError> {
        persist::save_to(&self.provider, &self.module, self.options, destination.as_ref())
    }

    /// Overwrite the file the module was opened from, keeping the previous
    /// version as `<file>.bak` when `backup` is set.
    pub fn save(&self, backup: bool) -> Result<SaveReport, PatchError> {
        let source = self.source.as_deref().ok_or(PatchError::NoDestination)?;
        persist::save_in_place(&self.provider, &self.module, self.options, source, backup)
    }
}

/// Flatten a payload into `(position, instruction)` pairs. A full
/// replacement is laid out from position 0.
fn payload_pairs(
    payload: Payload,
    indexing: ValueIndexing,
) -> Result<Vec<(usize, Instruction)>, PatchError> {
    match payload {
        Payload::Single { index, instruction } => Ok(vec![(index, instruction)]),
        Payload::Batch {
            indices,
            instructions,
        } => pair_values(&indices, &instructions, indexing),
        Payload::FullReplace(instructions) => Ok(instructions.into_iter().enumerate().collect()),
    }
}

fn stale(id: &MethodId) -> PatchError {
    PatchError::MalformedTarget {
        message: format!("stale method identity {id:?}"),
    }
}
