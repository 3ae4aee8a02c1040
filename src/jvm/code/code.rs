use crate::jvm::class_file::{Attribute, ConstantPool, Deserialize, Serialize};
use crate::jvm::code::Insn;
use crate::jvm::errors::ClassFileError;
use std::collections::HashMap;
use std::io::Cursor;

/// Entry of the exception table, with boundaries as instruction indices
///
/// `start..end` is half-open; `end` (and only `end`) may point one past the
/// last instruction.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Clone, Debug, PartialEq)]
pub struct ExceptionHandler {
    pub start: usize,
    pub end: usize,
    pub handler: usize,
    pub catch_type: u16,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LineNumber {
    pub insn: usize,
    pub line: u16,
}

/// Entry of a `LocalVariableTable` or `LocalVariableTypeTable`
///
/// `type_index` is the descriptor for the former and the generic signature
/// for the latter; the layouts are otherwise identical.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalVariable {
    pub start: usize,
    pub end: usize,
    pub name_index: u16,
    pub type_index: u16,
    pub slot: u16,
}

/// Attribute nested inside `Code`
///
/// The tables that carry bytecode offsets are decoded so a splice can shift
/// them; everything else rides along raw.
#[derive(Clone, Debug, PartialEq)]
pub enum CodeSubAttribute {
    LineNumberTable {
        name_index: u16,
        entries: Vec<LineNumber>,
    },
    LocalVariableTable {
        name_index: u16,
        entries: Vec<LocalVariable>,
    },
    LocalVariableTypeTable {
        name_index: u16,
        entries: Vec<LocalVariable>,
    },
    Raw(Attribute),
}

impl CodeSubAttribute {
    pub fn name<'p>(&self, pool: &'p ConstantPool) -> Result<&'p [u8], ClassFileError> {
        let name_index = match self {
            CodeSubAttribute::LineNumberTable { name_index, .. }
            | CodeSubAttribute::LocalVariableTable { name_index, .. }
            | CodeSubAttribute::LocalVariableTypeTable { name_index, .. } => *name_index,
            CodeSubAttribute::Raw(attribute) => attribute.name_index,
        };
        pool.utf8(name_index)
    }
}

/// Decoded payload of a `Code` attribute
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Clone, Debug)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: Vec<Insn>,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<CodeSubAttribute>,
}

impl Code {
    /// Decode the payload of a `Code` attribute
    pub fn parse(info: &[u8], pool: &ConstantPool) -> Result<Code, ClassFileError> {
        let mut reader = Cursor::new(info);
        let max_stack = u16::deserialize(&mut reader)?;
        let max_locals = u16::deserialize(&mut reader)?;

        let code_len = u32::deserialize(&mut reader)? as usize;
        let code_start = reader.position() as usize;
        let code = info.get(code_start..code_start + code_len).ok_or_else(|| {
            ClassFileError::Malformed("code array extends past attribute".to_string())
        })?;
        reader.set_position((code_start + code_len) as u64);

        // First decode pass: instruction boundaries and raw instructions with
        // targets as absolute byte offsets
        let mut instructions = vec![];
        let mut index_of_offset: HashMap<usize, usize> = HashMap::new();
        let mut pos = 0usize;
        while pos < code.len() {
            index_of_offset.insert(pos, instructions.len());
            instructions.push(Insn::parse_at(code, &mut pos)?);
        }

        let insn_count = instructions.len();
        let to_index = |offset: usize, allow_end: bool| -> Result<usize, ClassFileError> {
            if allow_end && offset == code_len {
                return Ok(insn_count);
            }
            index_of_offset
                .get(&offset)
                .copied()
                .ok_or(ClassFileError::UnalignedOffset(offset as u32))
        };

        // Second pass: byte offsets become instruction indices
        for insn in &mut instructions {
            insn.try_map_targets(|offset| to_index(offset, false))?;
        }

        let exception_count = u16::deserialize(&mut reader)?;
        let mut exception_table = Vec::with_capacity(exception_count as usize);
        for _ in 0..exception_count {
            let start_pc = u16::deserialize(&mut reader)?;
            let end_pc = u16::deserialize(&mut reader)?;
            let handler_pc = u16::deserialize(&mut reader)?;
            let catch_type = u16::deserialize(&mut reader)?;
            exception_table.push(ExceptionHandler {
                start: to_index(start_pc as usize, false)?,
                end: to_index(end_pc as usize, true)?,
                handler: to_index(handler_pc as usize, false)?,
                catch_type,
            });
        }

        let attribute_count = u16::deserialize(&mut reader)?;
        let mut attributes = Vec::with_capacity(attribute_count as usize);
        for _ in 0..attribute_count {
            let attribute = Attribute::deserialize(&mut reader)?;
            attributes.push(match pool.utf8(attribute.name_index)? {
                b"LineNumberTable" => {
                    let mut table = Cursor::new(attribute.info.as_slice());
                    let count = u16::deserialize(&mut table)?;
                    let mut entries = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        let start_pc = u16::deserialize(&mut table)?;
                        let line = u16::deserialize(&mut table)?;
                        entries.push(LineNumber {
                            insn: to_index(start_pc as usize, false)?,
                            line,
                        });
                    }
                    CodeSubAttribute::LineNumberTable {
                        name_index: attribute.name_index,
                        entries,
                    }
                }
                name @ (b"LocalVariableTable" | b"LocalVariableTypeTable") => {
                    let is_type_table = name == b"LocalVariableTypeTable";
                    let mut table = Cursor::new(attribute.info.as_slice());
                    let count = u16::deserialize(&mut table)?;
                    let mut entries = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        let start_pc = u16::deserialize(&mut table)?;
                        let length = u16::deserialize(&mut table)?;
                        entries.push(LocalVariable {
                            start: to_index(start_pc as usize, false)?,
                            end: to_index(start_pc as usize + length as usize, true)?,
                            name_index: u16::deserialize(&mut table)?,
                            type_index: u16::deserialize(&mut table)?,
                            slot: u16::deserialize(&mut table)?,
                        });
                    }
                    if is_type_table {
                        CodeSubAttribute::LocalVariableTypeTable {
                            name_index: attribute.name_index,
                            entries,
                        }
                    } else {
                        CodeSubAttribute::LocalVariableTable {
                            name_index: attribute.name_index,
                            entries,
                        }
                    }
                }
                _ => CodeSubAttribute::Raw(attribute),
            });
        }

        if (reader.position() as usize) < info.len() {
            return Err(ClassFileError::Malformed(
                "trailing bytes after Code attribute".to_string(),
            ));
        }

        Ok(Code {
            max_stack,
            max_locals,
            instructions,
            exception_table,
            attributes,
        })
    }

    /// Byte offset of each instruction under the current sequence, plus one
    /// final entry holding the total code length
    pub fn byte_offsets(&self) -> Vec<u32> {
        let mut offsets = Vec::with_capacity(self.instructions.len() + 1);
        let mut offset = 0u32;
        for insn in &self.instructions {
            offsets.push(offset);
            offset += insn.width(offset);
        }
        offsets.push(offset);
        offsets
    }

    /// Re-encode into the payload of a `Code` attribute
    pub fn encode(&self) -> Result<Vec<u8>, ClassFileError> {
        let offsets = self.byte_offsets();
        let code_len = *offsets.last().expect("offsets never empty");
        if code_len > u16::MAX as u32 {
            return Err(ClassFileError::MethodCodeOverflow);
        }

        let mut code = Vec::with_capacity(code_len as usize);
        for (index, insn) in self.instructions.iter().enumerate() {
            insn.serialize_at(&mut code, offsets[index], index, |target| offsets[target])?;
        }
        debug_assert_eq!(code.len() as u32, code_len);

        let mut info = vec![];
        self.max_stack.serialize(&mut info)?;
        self.max_locals.serialize(&mut info)?;
        code_len.serialize(&mut info)?;
        info.extend_from_slice(&code);

        (self.exception_table.len() as u16).serialize(&mut info)?;
        for handler in &self.exception_table {
            (offsets[handler.start] as u16).serialize(&mut info)?;
            (offsets[handler.end] as u16).serialize(&mut info)?;
            (offsets[handler.handler] as u16).serialize(&mut info)?;
            handler.catch_type.serialize(&mut info)?;
        }

        (self.attributes.len() as u16).serialize(&mut info)?;
        for attribute in &self.attributes {
            match attribute {
                CodeSubAttribute::LineNumberTable {
                    name_index,
                    entries,
                } => {
                    let mut table = vec![];
                    (entries.len() as u16).serialize(&mut table)?;
                    for entry in entries {
                        (offsets[entry.insn] as u16).serialize(&mut table)?;
                        entry.line.serialize(&mut table)?;
                    }
                    Attribute {
                        name_index: *name_index,
                        info: table,
                    }
                    .serialize(&mut info)?;
                }
                CodeSubAttribute::LocalVariableTable {
                    name_index,
                    entries,
                }
                | CodeSubAttribute::LocalVariableTypeTable {
                    name_index,
                    entries,
                } => {
                    let mut table = vec![];
                    (entries.len() as u16).serialize(&mut table)?;
                    for entry in entries {
                        let start = offsets[entry.start] as u16;
                        let length = offsets[entry.end] as u16 - start;
                        start.serialize(&mut table)?;
                        length.serialize(&mut table)?;
                        entry.name_index.serialize(&mut table)?;
                        entry.type_index.serialize(&mut table)?;
                        entry.slot.serialize(&mut table)?;
                    }
                    Attribute {
                        name_index: *name_index,
                        info: table,
                    }
                    .serialize(&mut info)?;
                }
                CodeSubAttribute::Raw(raw) => raw.serialize(&mut info)?,
            }
        }

        Ok(info)
    }
}
