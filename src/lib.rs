//! Patch one class inside a jar archive.
//!
//! The pipeline is a single-shot transform: open the archive, parse the one
//! class entry the patch targets, find its constructor, delete the first
//! instruction run matching a fixed opcode fingerprint, recompute the
//! method's stack/locals limits, and write a new archive in which every
//! other entry is copied through byte for byte.
//!
//! The pieces:
//!
//! - [`jar`]: archive reading and raw pass-through rewriting
//! - [`jvm`]: the class file layer (parse, instruction decode, limit
//!   analysis, re-encode)
//! - [`patch`]: the engine tying them together, from constructor locator to
//!   fingerprint matcher and splicer

pub mod error;
pub mod jar;
pub mod jvm;
pub mod patch;

pub use error::{Error, Result};
