//! Opcode set
//!
//! One byte per opcode, numbered exactly as the compiler emits them.

use serde::{Deserialize, Serialize};

/// Bytecode opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    // ==================== Literals, globals and declarations ====================
    /// End of a code block: release the frame and return null
    End = 0,
    /// Push null
    Null = 1,
    /// Push true
    True = 2,
    /// Push false
    False = 3,
    /// Push globals\[k\]
    LoadGlobal = 4,
    /// Push the local at a frame-relative slot
    Load = 5,
    /// Pop an instance, push its field k
    GetField = 6,
    /// Pop a parent class (or null) and start defining class k
    EnterClass = 7,
    /// Bind the class being defined under its name
    ExitClass = 8,
    /// Pop a value and bind it as global k
    Define = 9,
    /// Field declaration marker (operand is ignored at run time)
    DefineField = 10,
    /// Define a function whose body follows inline
    Function = 11,
    /// Body of a function whose implementation is supplied by the host
    NotImplemented = 12,
    /// Pop and release n block locals
    Exit = 13,

    // ==================== Stack shuffling ====================
    /// Duplicate the top value
    Dup = 14,
    /// Pop and release the top value
    Drop = 15,
    /// Swap the two top values
    Swap = 16,

    // ==================== Arithmetic and comparison ====================
    /// x * y
    Mul = 17,
    /// x / y
    Div = 18,
    /// x % y (integers)
    Mod = 19,
    /// x + y (numbers or strings)
    Add = 20,
    /// x - y
    Sub = 21,
    /// x < y
    Lt = 22,
    /// x <= y
    Le = 23,
    /// x > y
    Gt = 24,
    /// x >= y
    Ge = 25,
    /// x == y
    Eq = 26,
    /// x != y
    Ne = 27,
    /// Key membership in a table
    In = 28,
    /// Negated key membership in a table
    NotIn = 29,
    /// Numeric negation
    Neg = 30,
    /// Boolean negation
    Not = 31,

    // ==================== Calls, indexing and objects ====================
    /// Call the function value below argc arguments
    FunctionCall = 32,
    /// Call method k of the receiver below argc arguments
    MethodCall = 33,
    /// Reserved; never implemented by any runtime
    GetSlice = 34,
    /// Pop index and container, push the element
    GetIndex = 35,
    /// Push the receiver of the current method (`self`)
    SelfRef = 36,
    /// Call the supermethod of the executing method
    SuperCall = 37,
    /// Length of an array, string or table
    Sizeof = 38,
    /// Instantiate the class below argc arguments and run its `init`
    New = 39,
    /// Class membership test
    Instanceof = 40,

    // ==================== Literal aggregates ====================
    /// Begin an array literal
    ArrayNew = 41,
    /// Pop a value into the array literal being built
    ArrayNewAppend = 42,
    /// Begin a table literal
    TableNew = 43,
    /// Pop a key/value pair into the table literal being built
    TableNewInsert = 44,

    // ==================== Constants, returns and stores ====================
    /// Push constant k
    Const = 45,
    /// Return the top value from the current frame
    Return = 46,
    /// Insert a value into an array at an index
    Insert = 47,
    /// Append a value to an array
    Append = 48,
    /// Pop a value into global k
    StoreGlobal = 49,
    /// Pop a value into a frame-relative slot
    Store = 50,
    /// Pop value and module, set module name k
    SetStatic = 51,
    /// Pop value and instance, set field k
    SetField = 52,
    /// Reserved; never implemented by any runtime
    SetSlice = 53,
    /// Pop value, index and container, store the element
    SetIndex = 54,

    // ==================== Peek accessors ====================
    /// Push field k of the instance on top, keeping it
    GetFieldTop = 55,
    /// Push container\[index\] keeping both operands
    GetIndexTop = 56,
    /// Pop a module, push its name k
    GetStatic = 57,
    /// Push name k of the module on top, keeping it
    GetStaticTop = 58,

    // ==================== Control flow ====================
    /// Pop a bool; jump forward when false
    If = 59,
    /// Jump forward
    Jump = 60,
    /// Jump backward
    Loop = 61,
    /// Push the number 0
    Zero = 62,
    /// Increment a numeric local in place
    Inc = 63,
    /// Short-circuit or
    Or = 64,
    /// Short-circuit and
    And = 65,

    // ==================== Compound assignment ====================
    /// Compound assignment to an indexed element
    SetIndexAu = 66,
    /// Compound assignment to field k
    SetFieldAu = 67,
    /// Compound assignment to module name k
    SetStaticAu = 68,

    // ==================== Literal aggregates (close) ====================
    /// Finish the innermost array literal and push it
    ArrayClose = 69,
    /// Finish the innermost table literal and push it
    TableClose = 70,
}

/// Operand layout of an opcode, in wire order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// One byte
    U8,
    /// Two bytes, little-endian
    U16,
    /// Four-byte constant pool index
    Const,
    /// Two-byte jump distance
    Jump,
    /// Four-byte length of an inline body
    BodyLen,
}

impl Opcode {
    /// Convert from raw byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::End),
            1 => Some(Self::Null),
            2 => Some(Self::True),
            3 => Some(Self::False),
            4 => Some(Self::LoadGlobal),
            5 => Some(Self::Load),
            6 => Some(Self::GetField),
            7 => Some(Self::EnterClass),
            8 => Some(Self::ExitClass),
            9 => Some(Self::Define),
            10 => Some(Self::DefineField),
            11 => Some(Self::Function),
            12 => Some(Self::NotImplemented),
            13 => Some(Self::Exit),
            14 => Some(Self::Dup),
            15 => Some(Self::Drop),
            16 => Some(Self::Swap),
            17 => Some(Self::Mul),
            18 => Some(Self::Div),
            19 => Some(Self::Mod),
            20 => Some(Self::Add),
            21 => Some(Self::Sub),
            22 => Some(Self::Lt),
            23 => Some(Self::Le),
            24 => Some(Self::Gt),
            25 => Some(Self::Ge),
            26 => Some(Self::Eq),
            27 => Some(Self::Ne),
            28 => Some(Self::In),
            29 => Some(Self::NotIn),
            30 => Some(Self::Neg),
            31 => Some(Self::Not),
            32 => Some(Self::FunctionCall),
            33 => Some(Self::MethodCall),
            34 => Some(Self::GetSlice),
            35 => Some(Self::GetIndex),
            36 => Some(Self::SelfRef),
            37 => Some(Self::SuperCall),
            38 => Some(Self::Sizeof),
            39 => Some(Self::New),
            40 => Some(Self::Instanceof),
            41 => Some(Self::ArrayNew),
            42 => Some(Self::ArrayNewAppend),
            43 => Some(Self::TableNew),
            44 => Some(Self::TableNewInsert),
            45 => Some(Self::Const),
            46 => Some(Self::Return),
            47 => Some(Self::Insert),
            48 => Some(Self::Append),
            49 => Some(Self::StoreGlobal),
            50 => Some(Self::Store),
            51 => Some(Self::SetStatic),
            52 => Some(Self::SetField),
            53 => Some(Self::SetSlice),
            54 => Some(Self::SetIndex),
            55 => Some(Self::GetFieldTop),
            56 => Some(Self::GetIndexTop),
            57 => Some(Self::GetStatic),
            58 => Some(Self::GetStaticTop),
            59 => Some(Self::If),
            60 => Some(Self::Jump),
            61 => Some(Self::Loop),
            62 => Some(Self::Zero),
            63 => Some(Self::Inc),
            64 => Some(Self::Or),
            65 => Some(Self::And),
            66 => Some(Self::SetIndexAu),
            67 => Some(Self::SetFieldAu),
            68 => Some(Self::SetStaticAu),
            69 => Some(Self::ArrayClose),
            70 => Some(Self::TableClose),
            _ => None,
        }
    }

    /// Convert to raw byte
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Human-readable opcode name
    pub fn name(self) -> &'static str {
        match self {
            Self::End => "End",
            Self::Null => "Null",
            Self::True => "True",
            Self::False => "False",
            Self::LoadGlobal => "LoadGlobal",
            Self::Load => "Load",
            Self::GetField => "GetField",
            Self::EnterClass => "EnterClass",
            Self::ExitClass => "ExitClass",
            Self::Define => "Define",
            Self::DefineField => "DefineField",
            Self::Function => "Function",
            Self::NotImplemented => "NotImplemented",
            Self::Exit => "Exit",
            Self::Dup => "Dup",
            Self::Drop => "Drop",
            Self::Swap => "Swap",
            Self::Mul => "Mul",
            Self::Div => "Div",
            Self::Mod => "Mod",
            Self::Add => "Add",
            Self::Sub => "Sub",
            Self::Lt => "Lt",
            Self::Le => "Le",
            Self::Gt => "Gt",
            Self::Ge => "Ge",
            Self::Eq => "Eq",
            Self::Ne => "Ne",
            Self::In => "In",
            Self::NotIn => "NotIn",
            Self::Neg => "Neg",
            Self::Not => "Not",
            Self::FunctionCall => "FunctionCall",
            Self::MethodCall => "MethodCall",
            Self::GetSlice => "GetSlice",
            Self::GetIndex => "GetIndex",
            Self::SelfRef => "SelfRef",
            Self::SuperCall => "SuperCall",
            Self::Sizeof => "Sizeof",
            Self::New => "New",
            Self::Instanceof => "Instanceof",
            Self::ArrayNew => "ArrayNew",
            Self::ArrayNewAppend => "ArrayNewAppend",
            Self::TableNew => "TableNew",
            Self::TableNewInsert => "TableNewInsert",
            Self::Const => "Const",
            Self::Return => "Return",
            Self::Insert => "Insert",
            Self::Append => "Append",
            Self::StoreGlobal => "StoreGlobal",
            Self::Store => "Store",
            Self::SetStatic => "SetStatic",
            Self::SetField => "SetField",
            Self::SetSlice => "SetSlice",
            Self::SetIndex => "SetIndex",
            Self::GetFieldTop => "GetFieldTop",
            Self::GetIndexTop => "GetIndexTop",
            Self::GetStatic => "GetStatic",
            Self::GetStaticTop => "GetStaticTop",
            Self::If => "If",
            Self::Jump => "Jump",
            Self::Loop => "Loop",
            Self::Zero => "Zero",
            Self::Inc => "Inc",
            Self::Or => "Or",
            Self::And => "And",
            Self::SetIndexAu => "SetIndexAu",
            Self::SetFieldAu => "SetFieldAu",
            Self::SetStaticAu => "SetStaticAu",
            Self::ArrayClose => "ArrayClose",
            Self::TableClose => "TableClose",
        }
    }

    /// Operands that follow the opcode byte
    pub fn operands(self) -> &'static [OperandKind] {
        use OperandKind::*;
        match self {
            Self::LoadGlobal
            | Self::GetField
            | Self::EnterClass
            | Self::Define
            | Self::DefineField
            | Self::Const
            | Self::StoreGlobal
            | Self::SetStatic
            | Self::SetField
            | Self::GetFieldTop
            | Self::GetStatic
            | Self::GetStaticTop => &[Const],
            Self::Load | Self::Store | Self::Inc | Self::Exit => &[U16],
            Self::Function => &[U16, Const, BodyLen],
            Self::FunctionCall | Self::SuperCall | Self::New | Self::SetIndexAu => &[U8],
            Self::MethodCall => &[U8, Const],
            Self::SetFieldAu | Self::SetStaticAu => &[U8, Const],
            Self::If | Self::Jump | Self::Loop | Self::Or | Self::And => &[Jump],
            _ => &[],
        }
    }

    /// Encoded size of the instruction including the opcode byte
    /// (an inline function body is not counted)
    pub fn encoded_len(self) -> usize {
        1 + self
            .operands()
            .iter()
            .map(|kind| match kind {
                OperandKind::U8 => 1,
                OperandKind::U16 | OperandKind::Jump => 2,
                OperandKind::Const | OperandKind::BodyLen => 4,
            })
            .sum::<usize>()
    }
}

/// Arithmetic selector of the compound-assignment opcodes.
///
/// Encoded as the byte of the matching binary opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    /// Addition
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
    /// Division
    Div,
    /// Integer remainder
    Mod,
}

impl ArithOp {
    /// Decode from the opcode byte used on the wire
    pub fn from_byte(byte: u8) -> Option<Self> {
        match Opcode::from_byte(byte)? {
            Opcode::Add => Some(Self::Add),
            Opcode::Sub => Some(Self::Sub),
            Opcode::Mul => Some(Self::Mul),
            Opcode::Div => Some(Self::Div),
            Opcode::Mod => Some(Self::Mod),
            _ => None,
        }
    }

    /// Encode as the matching opcode byte
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Add => Opcode::Add,
            Self::Sub => Opcode::Sub,
            Self::Mul => Opcode::Mul,
            Self::Div => Opcode::Div,
            Self::Mod => Opcode::Mod,
        }
        .to_byte()
    }
}
