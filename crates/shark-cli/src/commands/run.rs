//! Run command - load an archive and execute its main module.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use shark_vm_core::natives::{ERROR_MODULE, bind_error_module};
use shark_vm_core::{Vm, VmError};

use crate::config::LoadedConfig;

#[derive(Args)]
pub struct RunCommand {
    /// Archive to execute
    pub archive: PathBuf,

    /// Arguments passed to `main`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Extra directory searched for dependency archives (repeatable)
    #[arg(long = "import-path", short = 'I', value_name = "DIR")]
    pub import_paths: Vec<PathBuf>,

    /// Override the call depth limit
    #[arg(long, value_name = "N")]
    pub max_call_depth: Option<usize>,
}

impl RunCommand {
    pub fn run(&self, loaded: &LoadedConfig) -> Result<ExitCode> {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        let archive = resolve_archive(&self.archive, exe_dir.as_deref());

        let mut config = loaded.config.vm_config(loaded.dir());
        if let Some(depth) = self.max_call_depth {
            config = config.with_max_call_depth(depth);
        }
        for path in &self.import_paths {
            config = config.with_import_path(path);
        }
        if let Some(dir) = exe_dir {
            config = config.with_import_path(dir);
        }
        if let Some(dir) = archive.parent().filter(|d| !d.as_os_str().is_empty()) {
            config = config.with_import_path(dir);
        }
        tracing::debug!(
            archive = %archive.display(),
            import_paths = ?config.import_paths,
            "starting"
        );

        let mut vm = Vm::new(config);
        let mut argv = vec![archive.display().to_string()];
        argv.extend(self.args.iter().cloned());
        match execute(&mut vm, &archive, &argv) {
            Ok(()) => Ok(ExitCode::SUCCESS),
            Err(err) => {
                eprintln!("{}", err.report());
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

/// Load, bind the error natives, run the top-level code, then `main(argv)`
fn execute(vm: &mut Vm, archive: &Path, argv: &[String]) -> Result<(), VmError> {
    let main = vm.load_archive_file(archive)?;
    bind_error_module(vm, ERROR_MODULE)?;
    vm.exec_module(main)?;
    let result = vm.exec_main(main, argv)?;
    vm.release(result);
    Ok(())
}

/// A bare file name that does not exist here is looked up next to the
/// executable
fn resolve_archive(path: &Path, exe_dir: Option<&Path>) -> PathBuf {
    if path.exists() {
        return path.to_path_buf();
    }
    let bare = path.parent().is_none_or(|p| p.as_os_str().is_empty());
    match exe_dir {
        Some(dir) if bare && dir.join(path).is_file() => dir.join(path),
        _ => path.to_path_buf(),
    }
}
