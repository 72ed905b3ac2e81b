//! In-memory module graph: types, methods, bodies and instructions.
//!
//! The graph is produced and consumed by a [`ModuleProvider`]. Everything in
//! this crate queries or mutates it in place; nothing here knows about the
//! binary layout of a real module image.

pub mod provider;

use crate::reference::MemberRef;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use provider::{JsonProvider, ModuleProvider, ProviderError, WriterOptions};

fn default_corlib() -> String {
    "mscorlib".to_string()
}

/// A loaded module: an ordered list of top-level types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Resolution scope used for references to core library members.
    #[serde(default = "default_corlib")]
    pub corlib: String,
    #[serde(default)]
    pub types: Vec<TypeDef>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            corlib: default_corlib(),
            types: Vec::new(),
        }
    }

    pub fn with_type(mut self, ty: TypeDef) -> Self {
        self.types.push(ty);
        self
    }

    /// Look up a type by its position path (top-level index, then nested indices).
    pub fn type_at(&self, path: &[usize]) -> Option<&TypeDef> {
        let (first, rest) = path.split_first()?;
        let mut current = self.types.get(*first)?;
        for idx in rest {
            current = current.nested_types.get(*idx)?;
        }
        Some(current)
    }

    pub fn type_at_mut(&mut self, path: &[usize]) -> Option<&mut TypeDef> {
        let (first, rest) = path.split_first()?;
        let mut current = self.types.get_mut(*first)?;
        for idx in rest {
            current = current.nested_types.get_mut(*idx)?;
        }
        Some(current)
    }

    pub fn method(&self, id: &MethodId) -> Option<&MethodDef> {
        self.type_at(&id.type_path)?.methods.get(id.method)
    }

    pub fn method_mut(&mut self, id: &MethodId) -> Option<&mut MethodDef> {
        self.type_at_mut(&id.type_path)?.methods.get_mut(id.method)
    }
}

/// A type definition. Nested types are owned by their declaring type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub methods: Vec<MethodDef>,
    #[serde(default)]
    pub nested_types: Vec<TypeDef>,
}

impl TypeDef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            methods: Vec::new(),
            nested_types: Vec::new(),
        }
    }

    /// `Namespace.Name`, or just `Name` when the namespace is empty.
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    pub fn has_nested_types(&self) -> bool {
        !self.nested_types.is_empty()
    }

    pub fn with_method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    pub fn with_nested(mut self, nested: TypeDef) -> Self {
        self.nested_types.push(nested);
        self
    }
}

/// A method definition. Abstract and extern methods carry no body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default = "void")]
    pub return_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Body>,
}

fn void() -> String {
    "Void".to_string()
}

impl MethodDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            return_type: void(),
            body: None,
        }
    }

    pub fn with_parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = parameters.into_iter().map(Into::into).collect();
        self
    }

    pub fn returning(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = return_type.into();
        self
    }

    pub fn with_body(mut self, instructions: Vec<Instruction>) -> Self {
        self.body = Some(Body::new(instructions));
        self
    }

    /// `Ret Name(P1,P2)`, used in log lines and diagnostics.
    pub fn signature(&self) -> String {
        format!(
            "{} {}({})",
            self.return_type,
            self.name,
            self.parameters.join(",")
        )
    }
}

/// Ordered, index-addressable instruction sequence of a method.
///
/// Indices are positional and shift on insert and remove.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Body {
    #[serde(default)]
    instructions: Vec<Instruction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stack: Option<u32>,
}

impl Body {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            instructions,
            max_stack: None,
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Instruction> {
        self.instructions.get_mut(index)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    pub fn opcodes(&self) -> impl Iterator<Item = &str> {
        self.instructions.iter().map(|i| i.opcode.as_str())
    }

    /// Insert before `index`, shifting later instructions.
    ///
    /// # Panics
    ///
    /// Panics if `index > len()`.
    pub fn insert(&mut self, index: usize, instruction: Instruction) {
        self.instructions.insert(index, instruction);
    }

    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn remove(&mut self, index: usize) -> Instruction {
        self.instructions.remove(index)
    }

    pub fn clear(&mut self) {
        self.instructions.clear();
    }

    /// Overwrite the instruction at `index`, returning the previous one, or
    /// `None` (leaving the body unchanged) when `index` is out of range.
    pub fn set(&mut self, index: usize, instruction: Instruction) -> Option<Instruction> {
        self.get_mut(index)
            .map(|slot| std::mem::replace(slot, instruction))
    }

    /// Human-readable listing, one `IL_xxxx: opcode operand` line per instruction.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for (idx, instruction) in self.instructions.iter().enumerate() {
            out.push_str(&format!("IL_{idx:04}: {instruction}\n"));
        }
        out
    }
}

/// A single instruction: opcode name plus optional operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operand: Option<Operand>,
}

impl Instruction {
    pub fn new(opcode: impl Into<String>) -> Self {
        Self {
            opcode: opcode.into(),
            operand: None,
        }
    }

    pub fn with_operand(opcode: impl Into<String>, operand: impl Into<Operand>) -> Self {
        Self {
            opcode: opcode.into(),
            operand: Some(operand.into()),
        }
    }

    pub fn ldstr(value: impl Into<String>) -> Self {
        Self::with_operand("ldstr", Operand::Str(value.into()))
    }

    pub fn ldc_i4(value: i32) -> Self {
        Self::with_operand("ldc.i4", Operand::Int(value.into()))
    }

    pub fn call(member: MemberRef) -> Self {
        Self::with_operand("call", Operand::Member(member))
    }

    pub fn callvirt(member: MemberRef) -> Self {
        Self::with_operand("callvirt", Operand::Member(member))
    }

    pub fn ret() -> Self {
        Self::new("ret")
    }

    pub fn nop() -> Self {
        Self::new("nop")
    }

    /// String form of the operand, if any. Searches compare on this.
    pub fn operand_text(&self) -> Option<String> {
        self.operand.as_ref().map(Operand::to_string)
    }

    /// Opcode names are equal and operands are both absent or share a string form.
    pub fn matches(&self, pattern: &Instruction) -> bool {
        if self.opcode != pattern.opcode {
            return false;
        }
        match (&self.operand, &pattern.operand) {
            (None, None) => true,
            (Some(actual), Some(expected)) => actual.to_string() == expected.to_string(),
            _ => false,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operand {
            None => write!(f, "{}", self.opcode),
            Some(Operand::Str(s)) => write!(f, "{} {:?}", self.opcode, s),
            Some(operand) => write!(f, "{} {}", self.opcode, operand),
        }
    }
}

/// Instruction argument. Only its string form takes part in matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Int(i64),
    Float(f64),
    #[serde(rename = "string")]
    Str(String),
    /// Reference to another symbol, by display name.
    Symbol(String),
    Member(MemberRef),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Int(v) => write!(f, "{v}"),
            Operand::Float(v) => write!(f, "{v}"),
            Operand::Str(s) | Operand::Symbol(s) => f.write_str(s),
            Operand::Member(m) => write!(f, "{m}"),
        }
    }
}

impl From<i64> for Operand {
    fn from(v: i64) -> Self {
        Operand::Int(v)
    }
}

impl From<i32> for Operand {
    fn from(v: i32) -> Self {
        Operand::Int(v.into())
    }
}

impl From<f64> for Operand {
    fn from(v: f64) -> Self {
        Operand::Float(v)
    }
}

impl From<&str> for Operand {
    fn from(v: &str) -> Self {
        Operand::Str(v.to_string())
    }
}

impl From<String> for Operand {
    fn from(v: String) -> Self {
        Operand::Str(v)
    }
}

impl From<MemberRef> for Operand {
    fn from(v: MemberRef) -> Self {
        Operand::Member(v)
    }
}

/// Stable identity of a method within a module: the position path of its
/// declaring type plus its index in that type's method list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodId {
    pub type_path: Vec<usize>,
    pub method: usize,
}
