//! The patch engine: locate the constructor, match the opcode fingerprint,
//! splice it out, repair the method, rewrite the archive.

use crate::error::{Error, Result};
use crate::jar::Jar;
use crate::jvm::class_file::{ClassFile, ConstantPool};
use crate::jvm::code::{analysis, Code, CodeSubAttribute, Insn};
use crate::jvm::descriptors::{MethodDescriptor, ParseDescriptor};
use crate::jvm::{ClassFileError, MethodAccessFlags};
use log::info;
use std::path::Path;

/// Fixed constants of a transform: which entry, which method, and which
/// instruction sequence to remove.
///
/// These are configuration data rather than inline literals so the
/// fingerprint can be refreshed when the target library's bytecode changes
/// across versions, without touching the matcher.
pub struct PatchSpec {
    /// Archive entry holding the class to modify
    pub entry_name: &'static str,
    pub method_name: &'static str,
    pub method_descriptor: &'static str,
    /// Opcodes of the instruction run to delete, in order
    pub fingerprint: &'static [u8],
}

impl PatchSpec {
    /// The UnityPlayer constructor patch
    ///
    /// Removes the startup guard the player library raises from its
    /// constructor: the fingerprint is the guard exception being allocated
    /// (`new`, `dup`, `dup`), initialized (`invokespecial`), and thrown
    /// (`athrow`).
    pub fn unity_player() -> PatchSpec {
        PatchSpec {
            entry_name: "com/unity3d/player/UnityPlayer.class",
            method_name: "<init>",
            method_descriptor:
                "(Landroid/content/Context;Lcom/unity3d/player/IUnityPlayerLifecycleEvents;)V",
            fingerprint: &[0xbb, 0x59, 0x59, 0xb7, 0xbf],
        }
    }
}

/// Inclusive range of instruction indices to delete from a method
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RemovalRange {
    pub start: usize,
    pub end: usize,
}

/// Index of the single method matching the spec's name and descriptor
///
/// Zero matches and multiple matches are both errors: there is exactly one
/// constructor this transform is valid against, and guessing among overloads
/// would corrupt the class.
pub fn locate_constructor(class: &ClassFile, spec: &PatchSpec) -> Result<usize> {
    let pool = &class.constant_pool;
    let mut matches = vec![];
    for (index, method) in class.methods.iter().enumerate() {
        if method.name(pool)? == spec.method_name
            && method.descriptor(pool)? == spec.method_descriptor
        {
            matches.push(index);
        }
    }

    match matches.as_slice() {
        [index] => Ok(*index),
        _ => Err(Error::ConstructorNotFound {
            name: spec.method_name.to_string(),
            descriptor: spec.method_descriptor.to_string(),
            matches: matches.len(),
        }),
    }
}

/// First contiguous run of instructions whose opcodes equal `fingerprint`
///
/// A single left-to-right scan: each opcode either advances the match cursor
/// or resets it. On a mismatch the scan restarts from the *next* instruction;
/// the mismatched instruction is not reconsidered as a potential new start.
/// Only the first occurrence is reported.
pub fn find_removal_range<I>(opcodes: I, fingerprint: &[u8]) -> Result<RemovalRange>
where
    I: IntoIterator<Item = u8>,
{
    let mut cursor = 0;
    let mut start = None;

    for (index, opcode) in opcodes.into_iter().enumerate() {
        if fingerprint.get(cursor) == Some(&opcode) {
            if cursor == 0 {
                start = Some(index);
            }
            if cursor == fingerprint.len() - 1 {
                return Ok(RemovalRange {
                    start: start.expect("recorded when cursor was 0"),
                    end: index,
                });
            }
            cursor += 1;
        } else {
            cursor = 0;
            start = None;
        }
    }

    Err(Error::PatternNotFound)
}

/// Delete `range` from the method body and repair everything that referred
/// to the removed instructions
///
/// Jump targets and exception/table boundaries are instruction indices, so
/// the repair is an index shift:
///
/// - branches and switch arms across the range move back by its length; a
///   surviving jump *into* the range is an error
/// - exception ranges and local variable ranges shrink past the removed
///   instructions; entries left covering nothing are dropped, as are line
///   numbers inside the range
/// - any `StackMapTable` is discarded rather than left stale; the limits the
///   splice invalidates are recomputed by the caller
pub fn splice(code: &mut Code, pool: &ConstantPool, range: RemovalRange) -> Result<()> {
    if range.start > range.end || range.end >= code.instructions.len() {
        return Err(Error::InvalidRange(format!(
            "instructions {}..={} out of bounds for method of {} instructions",
            range.start,
            range.end,
            code.instructions.len()
        )));
    }
    let removed = range.end - range.start + 1;

    code.instructions.drain(range.start..=range.end);

    for insn in &mut code.instructions {
        insn.try_map_targets(|target| {
            if target < range.start {
                Ok(target)
            } else if target <= range.end {
                Err(Error::InvalidRange(format!(
                    "surviving branch targets removed instruction {}",
                    target
                )))
            } else {
                Ok(target - removed)
            }
        })?;
    }

    // Boundary of a half-open index range: positions inside the removed run
    // collapse onto its start
    let shift_boundary = |boundary: usize| {
        if boundary <= range.start {
            boundary
        } else if boundary <= range.end {
            range.start
        } else {
            boundary - removed
        }
    };

    let mut dangling_handler = None;
    code.exception_table.retain_mut(|handler| {
        let start = shift_boundary(handler.start);
        let end = shift_boundary(handler.end);
        if start == end {
            // Protected only the removed instructions
            return false;
        }
        if handler.handler >= range.start && handler.handler <= range.end {
            dangling_handler = Some(handler.handler);
            return false;
        }
        handler.start = start;
        handler.end = end;
        handler.handler = if handler.handler > range.end {
            handler.handler - removed
        } else {
            handler.handler
        };
        true
    });
    if let Some(handler) = dangling_handler {
        return Err(Error::InvalidRange(format!(
            "exception handler at removed instruction {}",
            handler
        )));
    }

    let mut attributes = std::mem::take(&mut code.attributes);
    attributes.retain(|attribute| {
        !matches!(attribute.name(pool), Ok(b"StackMapTable"))
    });
    for attribute in &mut attributes {
        match attribute {
            CodeSubAttribute::LineNumberTable { entries, .. } => {
                entries.retain_mut(|entry| {
                    if entry.insn >= range.start && entry.insn <= range.end {
                        return false;
                    }
                    if entry.insn > range.end {
                        entry.insn -= removed;
                    }
                    true
                });
            }
            CodeSubAttribute::LocalVariableTable { entries, .. }
            | CodeSubAttribute::LocalVariableTypeTable { entries, .. } => {
                entries.retain_mut(|entry| {
                    entry.start = shift_boundary(entry.start);
                    entry.end = shift_boundary(entry.end);
                    entry.start != entry.end
                });
            }
            CodeSubAttribute::Raw(_) => (),
        }
    }
    code.attributes = attributes;

    Ok(())
}

/// Run the full pipeline: open `input`, patch the spec'd constructor, and
/// write the rewritten archive to `output`
pub fn apply(spec: &PatchSpec, input: &Path, output: &Path) -> Result<()> {
    info!("reading {}", input.display());
    let mut jar = Jar::open(input)?;
    let entry_bytes = jar.entry_bytes(spec.entry_name)?;
    let mut class = ClassFile::parse(&entry_bytes)?;

    let method_index = locate_constructor(&class, spec)?;
    let (mut code, attribute_index, descriptor, is_static) = {
        let pool = &class.constant_pool;
        let method = &class.methods[method_index];
        let attribute_index = method.code_attribute_index(pool)?.ok_or_else(|| {
            ClassFileError::Malformed("constructor has no Code attribute".to_string())
        })?;
        let code = Code::parse(&method.attributes[attribute_index].info, pool)?;
        let descriptor = MethodDescriptor::parse(method.descriptor(pool)?)
            .map_err(|err| ClassFileError::Malformed(err.to_string()))?;
        let is_static = method.access_flags.contains(MethodAccessFlags::STATIC);
        (code, attribute_index, descriptor, is_static)
    };

    let range = find_removal_range(code.instructions.iter().map(Insn::opcode), spec.fingerprint)?;
    info!(
        "removing instructions {}..={} of {}",
        range.start,
        range.end,
        code.instructions.len()
    );
    splice(&mut code, &class.constant_pool, range)?;

    let (max_stack, max_locals) =
        analysis::compute_limits(&code, &class.constant_pool, &descriptor, is_static)?;
    info!(
        "limits recomputed: max_stack {} -> {}, max_locals {} -> {}",
        code.max_stack, max_stack, code.max_locals, max_locals
    );
    code.max_stack = max_stack;
    code.max_locals = max_locals;

    let encoded = code.encode()?;
    class.methods[method_index].attributes[attribute_index].info = encoded;
    let patched = class.encode()?;

    info!("writing {}", output.display());
    jar.rewrite(spec.entry_name, &patched, output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jvm::class_file::{Attribute, Constant, Method};
    use crate::jvm::code::{ExceptionHandler, LineNumber};
    use crate::jvm::ClassAccessFlags;
    use crate::jvm::class_file::Version;

    #[test]
    fn matcher_restarts_without_retesting_the_mismatch() {
        // The leading 1,2 is a false start: the 9 resets the scan and the
        // real match begins at index 3
        let range = find_removal_range([1, 2, 9, 1, 2, 3], &[1, 2, 3]).unwrap();
        assert_eq!(range, RemovalRange { start: 3, end: 5 });
    }

    #[test]
    fn matcher_reports_first_occurrence_only() {
        let range = find_removal_range([7, 1, 2, 5, 1, 2], &[1, 2]).unwrap();
        assert_eq!(range, RemovalRange { start: 1, end: 2 });
    }

    #[test]
    fn matcher_accepts_single_opcode_fingerprints() {
        let range = find_removal_range([4, 4, 9], &[9]).unwrap();
        assert_eq!(range, RemovalRange { start: 2, end: 2 });
    }

    #[test]
    fn matcher_fails_on_empty_methods_and_absent_fingerprints() {
        assert!(matches!(
            find_removal_range([], &[1, 2, 3]),
            Err(Error::PatternNotFound)
        ));
        assert!(matches!(
            find_removal_range([1, 2, 1, 2, 1, 2], &[1, 2, 3]),
            Err(Error::PatternNotFound)
        ));
    }

    fn two_method_class(second_descriptor: &str) -> ClassFile {
        let pool = ConstantPool {
            entries: vec![
                Constant::Placeholder,
                Constant::Utf8(b"<init>".to_vec()),
                Constant::Utf8(b"(I)V".to_vec()),
                Constant::Utf8(second_descriptor.as_bytes().to_vec()),
            ],
        };
        let method = |descriptor_index| Method {
            access_flags: MethodAccessFlags::PUBLIC,
            name_index: 1,
            descriptor_index,
            attributes: vec![],
        };
        ClassFile {
            version: Version::JAVA8,
            constant_pool: pool,
            access_flags: ClassAccessFlags::PUBLIC,
            this_class: 0,
            super_class: 0,
            interfaces: vec![],
            fields: vec![],
            methods: vec![method(2), method(3)],
            attributes: vec![],
        }
    }

    fn spec_expecting(descriptor: &'static str) -> PatchSpec {
        PatchSpec {
            entry_name: "Target.class",
            method_name: "<init>",
            method_descriptor: descriptor,
            fingerprint: &[0xbb],
        }
    }

    #[test]
    fn locator_finds_the_single_match() {
        let class = two_method_class("(J)V");
        assert_eq!(locate_constructor(&class, &spec_expecting("(J)V")).unwrap(), 1);
    }

    #[test]
    fn locator_rejects_zero_and_ambiguous_matches() {
        let class = two_method_class("(J)V");
        assert!(matches!(
            locate_constructor(&class, &spec_expecting("(D)V")),
            Err(Error::ConstructorNotFound { matches: 0, .. })
        ));

        let ambiguous = two_method_class("(I)V");
        assert!(matches!(
            locate_constructor(&ambiguous, &spec_expecting("(I)V")),
            Err(Error::ConstructorNotFound { matches: 2, .. })
        ));
    }

    fn guarded_code() -> (Code, ConstantPool) {
        let pool = ConstantPool {
            entries: vec![
                Constant::Placeholder,
                Constant::Utf8(b"LineNumberTable".to_vec()),
                Constant::Utf8(b"StackMapTable".to_vec()),
            ],
        };
        // aload_1; ifnonnull -> return; new; dup; dup; invokespecial; athrow; return
        let code = Code {
            max_stack: 3,
            max_locals: 3,
            instructions: vec![
                Insn::ALoad1,
                Insn::IfNonNull(7),
                Insn::New(9),
                Insn::Dup,
                Insn::Dup,
                Insn::InvokeSpecial(10),
                Insn::AThrow,
                Insn::Return,
            ],
            exception_table: vec![ExceptionHandler {
                start: 0,
                end: 7,
                handler: 7,
                catch_type: 0,
            }],
            attributes: vec![
                CodeSubAttribute::LineNumberTable {
                    name_index: 1,
                    entries: vec![
                        LineNumber { insn: 0, line: 40 },
                        LineNumber { insn: 2, line: 41 },
                        LineNumber { insn: 7, line: 43 },
                    ],
                },
                CodeSubAttribute::Raw(Attribute {
                    name_index: 2,
                    info: vec![0, 0],
                }),
            ],
        };
        (code, pool)
    }

    #[test]
    fn splice_retargets_branches_and_tables_across_the_gap() {
        let (mut code, pool) = guarded_code();
        splice(&mut code, &pool, RemovalRange { start: 2, end: 6 }).unwrap();

        assert_eq!(
            code.instructions,
            vec![Insn::ALoad1, Insn::IfNonNull(2), Insn::Return]
        );
        assert_eq!(
            code.exception_table,
            vec![ExceptionHandler {
                start: 0,
                end: 2,
                handler: 2,
                catch_type: 0,
            }]
        );
        assert_eq!(
            code.attributes,
            vec![CodeSubAttribute::LineNumberTable {
                name_index: 1,
                entries: vec![
                    LineNumber { insn: 0, line: 40 },
                    LineNumber { insn: 2, line: 43 },
                ],
            }]
        );
    }

    #[test]
    fn splice_rejects_branches_into_the_removed_range() {
        let (mut code, pool) = guarded_code();
        // Retarget the guard branch into the middle of the range first
        code.instructions[1] = Insn::IfNonNull(4);
        assert!(matches!(
            splice(&mut code, &pool, RemovalRange { start: 2, end: 6 }),
            Err(Error::InvalidRange(_))
        ));
    }

    #[test]
    fn splice_rejects_out_of_bounds_ranges() {
        let (mut code, pool) = guarded_code();
        assert!(matches!(
            splice(&mut code, &pool, RemovalRange { start: 2, end: 8 }),
            Err(Error::InvalidRange(_))
        ));
        assert!(matches!(
            splice(&mut code, &pool, RemovalRange { start: 5, end: 2 }),
            Err(Error::InvalidRange(_))
        ));
    }
}
