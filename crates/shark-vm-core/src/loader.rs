//! Archive loading
//!
//! Loading an archive registers its modules without running any code.
//! Dependency archives named in the header are found on the import path and
//! loaded first; each archive is loaded at most once per VM.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use shark_vm_bytecode::{ArchiveImage, Constant, ModuleImage};

use crate::error::{VmError, VmResult};
use crate::heap::ObjRef;
use crate::string::SharkString;
use crate::value::Value;
use crate::vm::Vm;

impl Vm {
    /// Load an archive file and return its main module.
    ///
    /// The archive is memoized by file name, so loading the same name twice
    /// returns the already registered module.
    pub fn load_archive_file(&mut self, path: impl AsRef<Path>) -> VmResult<ObjRef> {
        let path = path.as_ref();
        let name = archive_name(path);
        if let Some(main) = self.loaded_main(&name)? {
            return Ok(main);
        }
        let bytes = std::fs::read(path).map_err(|e| VmError::io(path, e))?;
        self.load_archive_bytes(&name, &bytes)
    }

    /// Load an archive from memory under `name` and return its main module
    pub fn load_archive_bytes(&mut self, name: &str, bytes: &[u8]) -> VmResult<ObjRef> {
        if let Some(main) = self.loaded_main(name)? {
            return Ok(main);
        }
        let image = ArchiveImage::from_bytes(bytes)?;
        tracing::debug!(
            archive = name,
            main = %image.main,
            dependencies = image.dependencies.len(),
            modules = image.modules.len(),
            "archive loaded"
        );
        self.archives.insert(name.to_string(), image.main.clone());

        for dependency in &image.dependencies {
            if self.archives.contains_key(dependency.as_str()) {
                continue;
            }
            let path = self.find_archive(dependency)?;
            self.load_archive_file(&path)?;
        }
        for module in &image.modules {
            self.register_module(module);
        }

        self.modules
            .get(&image.main)
            .copied()
            .ok_or_else(|| VmError::MissingModule(image.main.clone()))
    }

    fn loaded_main(&self, archive: &str) -> VmResult<Option<ObjRef>> {
        let Some(main) = self.archives.get(archive) else {
            return Ok(None);
        };
        match self.modules.get(main) {
            Some(&module) => Ok(Some(module)),
            None => Err(VmError::MissingModule(main.clone())),
        }
    }

    /// First `dir/name` on the import path that exists
    fn find_archive(&self, name: &str) -> VmResult<PathBuf> {
        self.config
            .import_paths
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| VmError::ArchiveNotFound(name.to_string()))
    }

    fn register_module(&mut self, image: &ModuleImage) {
        let constants: Vec<Value> = image
            .constants
            .iter()
            .map(|constant| match constant {
                Constant::Int(n) => Value::number(f64::from(*n)),
                Constant::Float(n) => Value::number(*n),
                Constant::Char(c) => Value::Char(*c),
                Constant::Str(s) | Constant::Symbol(s) => {
                    Value::Object(self.heap.alloc_string(SharkString::from(s.as_str())))
                }
            })
            .collect();
        let module = self.alloc_module(
            &image.name,
            image.imports.clone(),
            Rc::from(constants),
            Rc::from(image.code.as_slice()),
        );
        tracing::debug!(
            module = %image.name,
            constants = image.constants.len(),
            code = image.code.len(),
            "module registered"
        );
        if let Some(old) = self.modules.insert(image.name.clone(), module) {
            tracing::warn!(module = %image.name, "module redefined by a later archive");
            self.heap.release(old);
        }
    }
}

fn archive_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
