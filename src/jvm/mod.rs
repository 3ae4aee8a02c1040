//! Read, edit, and re-write JVM classes
//!
//! This is the class file layer the patch engine sits on: just enough of the
//! [class file format][0] to pull one method's bytecode out of a parsed
//! class, edit its instruction sequence, recompute the stack/locals limits,
//! and write the class back out. Anything not needed for that (annotation
//! internals, module descriptors, every attribute this tool does not edit)
//! is carried through as raw bytes, which keeps the encoder byte-for-byte
//! faithful for untouched classes:
//!
//! ```
//! use jarpatch::jvm::class_file::ClassFile;
//!
//! # fn round_trip(entry_bytes: &[u8]) -> Result<(), jarpatch::jvm::ClassFileError> {
//! let class = ClassFile::parse(entry_bytes)?;
//! assert_eq!(class.encode()?, entry_bytes);
//! # Ok(())
//! # }
//! ```
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html

mod access_flags;
mod binary_format;
pub mod class_file;
pub mod code;
pub mod descriptors;
mod errors;

pub use access_flags::*;
pub use binary_format::*;
pub use errors::*;
