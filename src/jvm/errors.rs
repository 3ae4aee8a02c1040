use thiserror::Error;

/// Errors produced while decoding or re-encoding class file structures
#[derive(Debug, Error)]
pub enum ClassFileError {
    #[error("i/o error reading class file: {0}")]
    Io(#[from] std::io::Error),

    /// First four bytes were not `0xCAFEBABE`
    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),

    #[error("unknown constant pool tag {tag} at index {index}")]
    BadConstantTag { tag: u8, index: u16 },

    /// Constant pool lookup landed outside the pool or on the wrong kind of entry
    #[error("invalid constant pool reference {0}")]
    BadConstantIndex(u16),

    #[error("unknown opcode {opcode:#04x} at bytecode offset {offset}")]
    UnknownOpcode { opcode: u8, offset: u32 },

    /// A branch, exception boundary, or table entry referred to a bytecode
    /// offset that is not the start of an instruction
    #[error("bytecode offset {0} is not on an instruction boundary")]
    UnalignedOffset(u32),

    /// A narrow branch could not reach its target after offsets were recomputed
    #[error("branch at instruction {index} cannot encode offset {offset}")]
    BranchOffsetOverflow { index: usize, offset: i64 },

    /// Re-encoded code no longer fits the `u16` offsets used by the exception
    /// table and code sub-attributes
    #[error("method code exceeds 65535 bytes")]
    MethodCodeOverflow,

    #[error("malformed class file: {0}")]
    Malformed(String),
}
