//! Module image: one compiled source file

use serde::{Deserialize, Serialize};

use crate::constant::{Constant, ConstantPool, TAG_CHAR, TAG_FLOAT, TAG_INT, TAG_STR, TAG_SYMBOL};
use crate::error::{BytecodeError, Result};
use crate::wire::{ByteReader, ByteWriter};

/// How an import binds names into the importing module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportMode {
    /// `import path as alias`: bind the whole module under one name
    Alias(String),
    /// `from path import a, b`: copy the listed names
    Symbols(Vec<String>),
}

/// Import record of a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    /// Name of the imported module
    pub path: String,
    /// Binding mode
    pub mode: ImportMode,
}

impl Import {
    /// Alias import
    pub fn alias(path: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: ImportMode::Alias(alias.into()),
        }
    }

    /// Symbol list import
    pub fn symbols<I, S>(path: impl Into<String>, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into(),
            mode: ImportMode::Symbols(symbols.into_iter().map(Into::into).collect()),
        }
    }
}

/// A compiled module: name, imports, constants and one flat code buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleImage {
    /// Module name
    pub name: String,
    /// Imports resolved before the top-level code runs
    pub imports: Vec<Import>,
    /// Constant pool
    pub constants: ConstantPool,
    /// Top-level code followed by nothing; function bodies are inline
    pub code: Vec<u8>,
}

impl ModuleImage {
    /// Create an empty module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            imports: Vec::new(),
            constants: ConstantPool::new(),
            code: Vec::new(),
        }
    }

    /// Create a new module builder
    pub fn builder(name: impl Into<String>) -> ModuleBuilder {
        ModuleBuilder::new(name)
    }

    /// Symbol or string constant at `index`
    pub fn name_at(&self, index: u32) -> Option<&str> {
        self.constants.get(index).and_then(Constant::as_str)
    }

    /// Decode one module record
    pub(crate) fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let name = reader.str32()?;

        let import_count = reader.u16()?;
        let mut imports = Vec::with_capacity(import_count as usize);
        for _ in 0..import_count {
            let path = reader.str32()?;
            let mode = match reader.u8()? {
                0 => ImportMode::Alias(reader.str32()?),
                _ => {
                    let count = reader.u16()?;
                    let mut symbols = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        symbols.push(reader.str32()?);
                    }
                    ImportMode::Symbols(symbols)
                }
            };
            imports.push(Import { path, mode });
        }

        let const_count = reader.u32()?;
        let mut constants = ConstantPool::with_capacity(const_count.min(1 << 16) as usize);
        for _ in 0..const_count {
            constants.push(read_constant(reader)?);
        }

        let code_len = reader.u32()? as usize;
        let code = reader.take(code_len)?.to_vec();

        Ok(Self {
            name,
            imports,
            constants,
            code,
        })
    }

    /// Encode one module record
    pub(crate) fn write(&self, writer: &mut ByteWriter) -> Result<()> {
        writer.str32(&self.name)?;

        writer.count16(self.imports.len())?;
        for import in &self.imports {
            writer.str32(&import.path)?;
            match &import.mode {
                ImportMode::Alias(alias) => {
                    writer.u8(0);
                    writer.str32(alias)?;
                }
                ImportMode::Symbols(symbols) => {
                    writer.u8(1);
                    writer.count16(symbols.len())?;
                    for symbol in symbols {
                        writer.str32(symbol)?;
                    }
                }
            }
        }

        writer.count32(self.constants.len())?;
        for constant in self.constants.iter() {
            write_constant(writer, constant)?;
        }

        writer.count32(self.code.len())?;
        writer.raw(&self.code);
        Ok(())
    }
}

fn read_constant(reader: &mut ByteReader<'_>) -> Result<Constant> {
    let tag = reader.u8()?;
    match tag {
        TAG_INT => Ok(Constant::Int(reader.u32()? as i32)),
        TAG_FLOAT => {
            let text = reader.str32()?;
            text.trim()
                .parse::<f64>()
                .map(Constant::Float)
                .map_err(|_| BytecodeError::InvalidFloat(text))
        }
        TAG_CHAR => {
            let len = reader.u32()?;
            if len != 1 {
                return Err(BytecodeError::NonAsciiChar(len));
            }
            Ok(Constant::Char(reader.u8()?))
        }
        TAG_STR => Ok(Constant::Str(reader.str32()?)),
        TAG_SYMBOL => Ok(Constant::Symbol(reader.str32()?)),
        other => Err(BytecodeError::InvalidConstantTag(other)),
    }
}

fn write_constant(writer: &mut ByteWriter, constant: &Constant) -> Result<()> {
    writer.u8(constant.tag());
    match constant {
        Constant::Int(n) => writer.u32(*n as u32),
        Constant::Float(n) => writer.str32(&format!("{n:?}"))?,
        Constant::Char(c) => {
            writer.u32(1);
            writer.u8(*c);
        }
        Constant::Str(s) | Constant::Symbol(s) => writer.str32(s)?,
    }
    Ok(())
}

/// Builder for module images assembled by hand
#[derive(Debug)]
pub struct ModuleBuilder {
    image: ModuleImage,
}

impl ModuleBuilder {
    /// Create a new module builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            image: ModuleImage::new(name),
        }
    }

    /// Add an import record
    pub fn import(mut self, import: Import) -> Self {
        self.image.imports.push(import);
        self
    }

    /// Set constant pool
    pub fn constants(mut self, constants: ConstantPool) -> Self {
        self.image.constants = constants;
        self
    }

    /// Set the code buffer
    pub fn code(mut self, code: Vec<u8>) -> Self {
        self.image.code = code;
        self
    }

    /// Build the module
    pub fn build(self) -> ModuleImage {
        self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(image: &ModuleImage) -> ModuleImage {
        let mut writer = ByteWriter::new();
        image.write(&mut writer).unwrap();
        let bytes = writer.into_bytes();
        let mut reader = ByteReader::new(&bytes);
        let decoded = ModuleImage::read(&mut reader).unwrap();
        assert!(reader.is_at_end());
        decoded
    }

    #[test]
    fn test_module_roundtrip() {
        let constants: ConstantPool = [
            Constant::Int(-7),
            Constant::Float(2.5),
            Constant::Char(b'x'),
            Constant::string("hello"),
            Constant::symbol("main"),
        ]
        .into_iter()
        .collect();
        let image = ModuleImage::builder("app")
            .import(Import::alias("io", "io"))
            .import(Import::symbols("math", ["sqrt", "pi"]))
            .constants(constants)
            .code(vec![1, 46, 0])
            .build();

        assert_eq!(roundtrip(&image), image);
    }

    #[test]
    fn test_int_is_signed() {
        let mut reader = ByteReader::new(&[TAG_INT, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(read_constant(&mut reader).unwrap(), Constant::Int(-1));
    }

    #[test]
    fn test_float_text() {
        let mut bytes = vec![TAG_FLOAT, 6, 0, 0, 0];
        bytes.extend_from_slice(b"1.0E10");
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(read_constant(&mut reader).unwrap(), Constant::Float(1.0e10));
    }

    #[test]
    fn test_bad_float() {
        let mut bytes = vec![TAG_FLOAT, 3, 0, 0, 0];
        bytes.extend_from_slice(b"abc");
        let mut reader = ByteReader::new(&bytes);
        assert!(matches!(
            read_constant(&mut reader),
            Err(BytecodeError::InvalidFloat(_))
        ));
    }

    #[test]
    fn test_char_must_be_one_byte() {
        let mut reader = ByteReader::new(&[TAG_CHAR, 2, 0, 0, 0, 0xC3, 0xA9]);
        assert!(matches!(
            read_constant(&mut reader),
            Err(BytecodeError::NonAsciiChar(2))
        ));
    }

    #[test]
    fn test_unknown_tag() {
        let mut reader = ByteReader::new(&[9]);
        assert!(matches!(
            read_constant(&mut reader),
            Err(BytecodeError::InvalidConstantTag(9))
        ));
    }
}
