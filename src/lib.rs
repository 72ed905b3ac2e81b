//! IL Patcher: symbolic patching of managed bytecode method bodies
//!
//! Methods are addressed by namespace, class, nested-type chain and method
//! signature instead of raw metadata tokens, located by instruction pattern
//! search, edited in memory and written back through a module provider.
//!
//! # Architecture
//!
//! Every patch operation compiles down to a single primitive, [`BodyEdit`],
//! applied to one resolved method body. Intelligence lives in resolution and
//! search (turning a [`Target`] into a concrete position), not in the edit.
//!
//! # Safety
//!
//! - All positions are range-checked before a body is touched
//! - Re-applying an edit that is already in place reports `AlreadyApplied`
//! - Saves go through an fsync'd temporary sibling before the original moves
//!
//! # Example
//!
//! ```no_run
//! use il_patcher::{JsonProvider, Patcher, Target};
//!
//! # fn main() -> Result<(), il_patcher::PatchError> {
//! let mut patcher = Patcher::open("app.json", JsonProvider, false)?;
//! let target: Target = "App.License::IsValid".parse()?;
//! let _ = patcher.write_return_body(&target, true)?;
//! patcher.save(true)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod edit;
pub mod error;
pub mod model;
pub mod patcher;
pub mod persist;
pub mod reference;
pub mod resolve;
pub mod search;
pub mod target;

// Re-exports
pub use config::{
    apply_patches, check_patches, load_from_path, load_from_str, matches_requirement,
    ApplicationError, ConfigError, PatchConfig, PatchResult, VersionError,
};
pub use edit::{BodyEdit, EditResult, ValueIndexing};
pub use error::PatchError;
pub use model::{
    Body, Instruction, JsonProvider, MethodDef, MethodId, Module, ModuleProvider, Operand,
    ProviderError, TypeDef, WriterOptions,
};
pub use patcher::Patcher;
pub use persist::SaveReport;
pub use reference::{MemberRef, MemberRefKind};
pub use resolve::{resolve_method, resolve_target, resolve_type, ResolvedType};
pub use search::{MethodHit, TypeWalker};
pub use target::{Addressing, Payload, Target};
