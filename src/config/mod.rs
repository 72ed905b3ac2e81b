pub mod applicator;
pub mod loader;
pub mod schema;
pub mod version;

pub use applicator::{apply_patches, check_patches, ApplicationError, PatchResult};
pub use loader::{discover, load_from_path, load_from_str, ConfigError};
pub use schema::{
    Locate, Metadata, Operation, PatchConfig, PatchDefinition, ValidationError, ValidationIssue,
};
pub use version::{matches_requirement, parse_module_version, VersionError};
