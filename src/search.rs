//! Instruction pattern search.
//!
//! Two families of queries:
//!
//! - **Module-wide discovery** walks every type (nested types included, to any
//!   depth) and returns a [`Target`] per method whose body satisfies the query.
//! - **Scoped search** narrows the scan to the method (or type) a target
//!   resolves to.
//!
//! Operand and opcode queries use multiset semantics: each matched instruction
//! consumes one entry of the query, so duplicate entries need duplicate
//! occurrences. The working copy is reset for every method.

use crate::error::PatchError;
use crate::model::{Body, Instruction, MethodDef, MethodId, Module, TypeDef};
use crate::resolve::{resolve_method, resolve_target, resolve_type};
use crate::target::Target;
use std::collections::HashSet;
use tracing::debug;

/// A type reached by [`TypeWalker`], with the names of the nested types
/// walked from its top-level ancestor.
#[derive(Debug, Clone)]
pub struct WalkedType<'m> {
    pub path: Vec<usize>,
    pub nested_names: Vec<String>,
    pub top: &'m TypeDef,
    pub def: &'m TypeDef,
}

/// Depth-first, pre-order walk over every type in a module.
///
/// Each type is yielded exactly once, parents before their nested types and
/// siblings in declaration order.
pub struct TypeWalker<'m> {
    module: &'m Module,
    stack: Vec<Vec<usize>>,
}

impl<'m> TypeWalker<'m> {
    pub fn new(module: &'m Module) -> Self {
        let stack = (0..module.types.len()).rev().map(|idx| vec![idx]).collect();
        Self { module, stack }
    }
}

impl<'m> Iterator for TypeWalker<'m> {
    type Item = WalkedType<'m>;

    fn next(&mut self) -> Option<Self::Item> {
        let module = self.module;
        let path = self.stack.pop()?;
        let def = module.type_at(&path)?;
        for child in (0..def.nested_types.len()).rev() {
            let mut child_path = path.clone();
            child_path.push(child);
            self.stack.push(child_path);
        }
        Some(WalkedType {
            top: &module.types[path[0]],
            nested_names: nested_names(module, &path),
            path,
            def,
        })
    }
}

/// Names of the nested types along `path`, excluding the top-level type.
fn nested_names(module: &Module, path: &[usize]) -> Vec<String> {
    (2..=path.len())
        .filter_map(|len| module.type_at(&path[..len]))
        .map(|ty| ty.name.clone())
        .collect()
}

/// What an instruction is compared on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryKey {
    Operand,
    Opcode,
}

impl QueryKey {
    fn of(self, instruction: &Instruction) -> Option<String> {
        match self {
            QueryKey::Operand => instruction.operand_text(),
            QueryKey::Opcode => Some(instruction.opcode.clone()),
        }
    }
}

/// Scan a body left to right against a query multiset.
///
/// With `consume`, each match removes one entry from the working copy and
/// the scan only succeeds when every entry was consumed. Without it, every
/// instruction whose key appears in the query is recorded and the method is
/// always accepted, even with no hits at all.
fn scan_body(body: &Body, key: QueryKey, query: &[String], consume: bool) -> Option<Vec<usize>> {
    let mut remaining: Vec<&str> = query.iter().map(String::as_str).collect();
    let mut hits = Vec::new();

    for (idx, instruction) in body.iter().enumerate() {
        let Some(value) = key.of(instruction) else {
            continue;
        };
        if let Some(pos) = remaining.iter().position(|q| *q == value) {
            hits.push(idx);
            if consume {
                remaining.swap_remove(pos);
            }
        }
    }

    let accepted = !consume || hits.len() == query.len();
    accepted.then_some(hits)
}

fn hit_target(top: &TypeDef, nested: &[String], method: &MethodDef, hits: Vec<usize>) -> Target {
    let mut target = Target::new(top.namespace.clone(), top.name.clone())
        .method(method.name.clone())
        .parameters(method.parameters.iter().cloned())
        .return_type(method.return_type.clone());
    if !nested.is_empty() {
        target.nested_classes = Some(nested.to_vec());
    }
    match hits.len() {
        0 => target,
        1 => target.index(hits[0]),
        _ => target.indices(hits),
    }
}

fn discover(module: &Module, key: QueryKey, query: &[String]) -> Vec<Target> {
    let mut targets = Vec::new();
    if query.is_empty() {
        return targets;
    }
    for walked in TypeWalker::new(module) {
        for method in &walked.def.methods {
            let Some(body) = &method.body else {
                continue;
            };
            if let Some(hits) = scan_body(body, key, query, true) {
                debug!(
                    type_name = %walked.def.full_name(),
                    method = %method.signature(),
                    ?hits,
                    "query matched"
                );
                targets.push(hit_target(walked.top, &walked.nested_names, method, hits));
            }
        }
    }
    targets
}

/// Methods anywhere in the module whose operands cover every queried value.
///
/// Operands compare by string form; instructions without an operand never
/// match.
pub fn find_by_operand_values<S: AsRef<str>>(module: &Module, values: &[S]) -> Vec<Target> {
    let query: Vec<String> = values.iter().map(|v| v.as_ref().to_string()).collect();
    discover(module, QueryKey::Operand, &query)
}

/// Integer form of [`find_by_operand_values`].
pub fn find_by_int_operands(module: &Module, values: &[i64]) -> Vec<Target> {
    let query: Vec<String> = values.iter().map(i64::to_string).collect();
    discover(module, QueryKey::Operand, &query)
}

/// Methods anywhere in the module containing every queried opcode.
pub fn find_by_opcodes<S: AsRef<str>>(module: &Module, opcodes: &[S]) -> Vec<Target> {
    let query: Vec<String> = opcodes.iter().map(|o| o.as_ref().to_string()).collect();
    discover(module, QueryKey::Opcode, &query)
}

/// A method found by signature search.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodHit {
    pub id: MethodId,
    pub target: Target,
    /// Start of the first occurrence of the signature.
    pub offset: usize,
}

/// Methods whose opcode stream contains `signature` as a contiguous run.
pub fn find_methods_by_signature<S: AsRef<str>>(module: &Module, signature: &[S]) -> Vec<MethodHit> {
    let mut seen = HashSet::new();
    let mut hits = Vec::new();
    if signature.is_empty() {
        return hits;
    }

    for walked in TypeWalker::new(module) {
        for (method_idx, method) in walked.def.methods.iter().enumerate() {
            let Some(body) = &method.body else {
                continue;
            };
            let Some(offset) = body
                .instructions()
                .windows(signature.len())
                .position(|window| {
                    window
                        .iter()
                        .zip(signature)
                        .all(|(instruction, op)| instruction.opcode == op.as_ref())
                })
            else {
                continue;
            };
            let id = MethodId {
                type_path: walked.path.clone(),
                method: method_idx,
            };
            if seen.insert(id.clone()) {
                let target = hit_target(walked.top, &walked.nested_names, method, vec![offset])
                    .clear_addressing();
                hits.push(MethodHit { id, target, offset });
            }
        }
    }
    hits
}

fn scoped(
    module: &Module,
    target: &Target,
    key: QueryKey,
    query: &[String],
    consume: bool,
) -> Result<Vec<Target>, PatchError> {
    let ty = resolve_type(module, &target.type_name(), &target.nested_chain())?;
    let top = &module.types[ty.path[0]];
    let nested = nested_names(module, &ty.path);

    let methods: Vec<&MethodDef> = match target.method.as_deref() {
        Some(name) => {
            let (_, method) = resolve_method(
                ty.def,
                name,
                target.parameters.as_deref(),
                target.return_type.as_deref(),
            )?;
            if method.body.is_none() {
                return Err(PatchError::NoBody {
                    method: method.signature(),
                });
            }
            vec![method]
        }
        None => ty.def.methods.iter().collect(),
    };

    let mut targets = Vec::new();
    if query.is_empty() {
        return Ok(targets);
    }
    for method in methods {
        let Some(body) = &method.body else {
            continue;
        };
        if let Some(hits) = scan_body(body, key, query, consume) {
            targets.push(hit_target(top, &nested, method, hits));
        }
    }
    Ok(targets)
}

/// Operand search limited to the target's method, or to every method of its
/// type when `target.method` is unset.
///
/// With `consume = false` the result can over-count repeated values, and
/// every method in scope is returned: one with partial coverage or no hits
/// at all comes back with whatever positions matched (none for no hits).
pub fn find_by_operand_values_in<S: AsRef<str>>(
    module: &Module,
    target: &Target,
    values: &[S],
    consume: bool,
) -> Result<Vec<Target>, PatchError> {
    let query: Vec<String> = values.iter().map(|v| v.as_ref().to_string()).collect();
    scoped(module, target, QueryKey::Operand, &query, consume)
}

/// Opcode search limited to the target's method or type.
pub fn find_by_opcodes_in<S: AsRef<str>>(
    module: &Module,
    target: &Target,
    opcodes: &[S],
    consume: bool,
) -> Result<Vec<Target>, PatchError> {
    let query: Vec<String> = opcodes.iter().map(|o| o.as_ref().to_string()).collect();
    scoped(module, target, QueryKey::Opcode, &query, consume)
}

/// Index of the `occurrence`-th (1-based) instruction matching `pattern`.
///
/// Returns `Ok(None)` when the body holds fewer matches, or when
/// `occurrence` is zero.
pub fn find_instruction(
    module: &Module,
    target: &Target,
    pattern: &Instruction,
    occurrence: usize,
) -> Result<Option<usize>, PatchError> {
    let id = resolve_target(module, target)?;
    let method = module
        .method(&id)
        .ok_or_else(|| PatchError::MalformedTarget {
            message: format!("stale method identity {id:?}"),
        })?;
    let body = method.body.as_ref().ok_or_else(|| PatchError::NoBody {
        method: method.signature(),
    })?;

    let Some(skip) = occurrence.checked_sub(1) else {
        return Ok(None);
    };
    Ok(body
        .iter()
        .enumerate()
        .filter(|(_, instruction)| instruction.matches(pattern))
        .map(|(idx, _)| idx)
        .nth(skip))
}
