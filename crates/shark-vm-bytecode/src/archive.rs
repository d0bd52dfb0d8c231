//! Archive container
//!
//! An archive bundles the modules of one program together with the names of
//! the archives it depends on:
//!
//! ```text
//! main name        u8 length + bytes
//! dependency count u8
//! dependencies     u8 length + bytes, each
//! modules          repeated until end of input
//! ```

use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BytecodeError, Result};
use crate::module::ModuleImage;
use crate::wire::{ByteReader, ByteWriter};

/// Decoded archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveImage {
    /// Name of the module holding `main`
    pub main: String,
    /// Archives that must be loaded first
    pub dependencies: Vec<String>,
    /// Modules in file order
    pub modules: Vec<ModuleImage>,
}

impl ArchiveImage {
    /// Create an empty archive
    pub fn new(main: impl Into<String>) -> Self {
        Self {
            main: main.into(),
            dependencies: Vec::new(),
            modules: Vec::new(),
        }
    }

    /// Add a dependency archive name
    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    /// Add a module
    pub fn with_module(mut self, module: ModuleImage) -> Self {
        self.modules.push(module);
        self
    }

    /// Find a module by name
    pub fn module(&self, name: &str) -> Option<&ModuleImage> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Decode an archive from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);

        let main = reader.str8()?;
        let dep_count = reader.u8()?;
        let mut dependencies = Vec::with_capacity(dep_count as usize);
        for _ in 0..dep_count {
            dependencies.push(reader.str8()?);
        }

        let mut modules = Vec::new();
        while !reader.is_at_end() {
            let module = ModuleImage::read(&mut reader)?;
            tracing::trace!(
                module = %module.name,
                constants = module.constants.len(),
                code = module.code.len(),
                "decoded module"
            );
            modules.push(module);
        }

        Ok(Self {
            main,
            dependencies,
            modules,
        })
    }

    /// Encode the archive
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::new();
        writer.str8(&self.main)?;
        let dep_count = u8::try_from(self.dependencies.len()).map_err(|_| {
            BytecodeError::CountOverflow {
                count: self.dependencies.len(),
                width: 1,
            }
        })?;
        writer.u8(dep_count);
        for dep in &self.dependencies {
            writer.str8(dep)?;
        }
        for module in &self.modules {
            module.write(&mut writer)?;
        }
        Ok(writer.into_bytes())
    }

    /// Read an archive from a reader
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    /// Write the archive to a writer
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }

    /// Read an archive file
    pub fn read_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}
