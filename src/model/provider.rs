//! Boundary to the module model provider.
//!
//! Parsing a module image into a [`Module`] and serializing it back are owned
//! by the provider. The patching core only calls through [`ModuleProvider`].

use crate::model::{Module, TypeDef};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Options forwarded to the writer on every save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterOptions {
    /// Preserve each body's recorded max-stack instead of letting it be recomputed.
    pub keep_old_max_stack: bool,
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("I/O error reading module image {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed module image: {0}")]
    Json(#[from] serde_json::Error),
}

/// Loads and writes module images.
pub trait ModuleProvider {
    /// Parse a module image from a byte stream.
    fn load(&self, reader: &mut dyn Read) -> Result<Module, ProviderError>;

    /// Serialize the module graph to a byte stream.
    fn write(
        &self,
        module: &Module,
        writer: &mut dyn Write,
        options: WriterOptions,
    ) -> Result<(), ProviderError>;

    fn load_path(&self, path: &Path) -> Result<Module, ProviderError> {
        let file = File::open(path).map_err(|source| ProviderError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::new(file);
        self.load(&mut reader)
    }
}

/// Module images stored as JSON documents of the module graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonProvider;

impl ModuleProvider for JsonProvider {
    fn load(&self, reader: &mut dyn Read) -> Result<Module, ProviderError> {
        Ok(serde_json::from_reader(reader)?)
    }

    fn write(
        &self,
        module: &Module,
        writer: &mut dyn Write,
        options: WriterOptions,
    ) -> Result<(), ProviderError> {
        if options.keep_old_max_stack {
            serde_json::to_writer_pretty(&mut *writer, module)?;
        } else {
            let mut fresh = module.clone();
            for ty in &mut fresh.types {
                clear_max_stack(ty);
            }
            serde_json::to_writer_pretty(&mut *writer, &fresh)?;
        }
        writer.write_all(b"\n")?;
        Ok(())
    }
}

fn clear_max_stack(ty: &mut TypeDef) {
    for method in &mut ty.methods {
        if let Some(body) = method.body.as_mut() {
            body.max_stack = None;
        }
    }
    for nested in &mut ty.nested_types {
        clear_max_stack(nested);
    }
}
