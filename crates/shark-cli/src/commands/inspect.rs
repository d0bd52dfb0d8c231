//! Inspect command - dump the contents of an archive.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use shark_vm_bytecode::{ArchiveImage, ImportMode, disassemble};

#[derive(Args)]
pub struct InspectCommand {
    /// Archive to inspect
    pub archive: PathBuf,

    /// Emit the decoded archive as JSON
    #[arg(long)]
    pub json: bool,
}

impl InspectCommand {
    pub fn run(&self) -> Result<ExitCode> {
        let bytes = std::fs::read(&self.archive)
            .with_context(|| format!("can't read {}", self.archive.display()))?;
        let image = ArchiveImage::from_bytes(&bytes)
            .with_context(|| format!("{} is not a valid archive", self.archive.display()))?;
        let output = if self.json {
            serde_json::to_string_pretty(&image)?
        } else {
            render(&image)?
        };
        println!("{output}");
        Ok(ExitCode::SUCCESS)
    }
}

/// Human-readable listing of an archive
fn render(image: &ArchiveImage) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "main: {}", image.main)?;
    if !image.dependencies.is_empty() {
        writeln!(out, "dependencies: {}", image.dependencies.join(", "))?;
    }
    for module in &image.modules {
        writeln!(out)?;
        writeln!(out, "module {}", module.name)?;
        for import in &module.imports {
            match &import.mode {
                ImportMode::Alias(alias) => writeln!(out, "  import {} as {alias}", import.path)?,
                ImportMode::Symbols(symbols) => {
                    writeln!(out, "  from {} import {}", import.path, symbols.join(", "))?
                }
            }
        }
        writeln!(out, "  constants ({}):", module.constants.len())?;
        for (i, constant) in module.constants.iter().enumerate() {
            writeln!(out, "    #{i} {constant}")?;
        }
        writeln!(out, "  code ({} bytes):", module.code.len())?;
        for line in disassemble(module)?.lines() {
            writeln!(out, "    {line}")?;
        }
    }
    Ok(out.trim_end().to_string())
}
