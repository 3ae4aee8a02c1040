use crate::jvm::ClassFileError;
use thiserror::Error;

/// The error type covering every way a patch run can fail.
///
/// Each variant corresponds to one stage of the pipeline (archive open, entry
/// lookup, constructor lookup, fingerprint match, splice, class re-encode, or
/// archive write), so a failure message always identifies where the run
/// stopped. All errors are terminal; nothing is retried.
#[derive(Debug, Error)]
pub enum Error {
    /// The input file is not a readable zip-format container
    #[error("not a jar archive: {0}")]
    NotAnArchive(&'static str),

    #[error("entry `{0}` not found in archive")]
    EntryNotFound(String),

    /// Zero or more than one method matched the constructor predicate.
    ///
    /// Ambiguity is an error rather than a silent first-pick: splicing the
    /// wrong overload corrupts the class.
    #[error("constructor {name}{descriptor} matched {matches} methods, expected exactly 1")]
    ConstructorNotFound {
        name: String,
        descriptor: String,
        matches: usize,
    },

    /// The opcode fingerprint does not occur in the constructor.
    ///
    /// This is the expected failure when the input was already patched, or
    /// when the target library changed its bytecode across versions.
    #[error("opcode fingerprint not found in constructor body")]
    PatternNotFound,

    /// The removal range is out of bounds, or deleting it would leave a
    /// branch, switch arm, or exception handler pointing at a removed
    /// instruction
    #[error("invalid removal range: {0}")]
    InvalidRange(String),

    #[error("class file error: {0}")]
    ClassFile(#[from] ClassFileError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
