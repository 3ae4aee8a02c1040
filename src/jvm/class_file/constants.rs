use crate::jvm::class_file::{Deserialize, Serialize};
use crate::jvm::descriptors::{FieldType, MethodDescriptor, ParseDescriptor};
use crate::jvm::errors::ClassFileError;
use byteorder::{ReadBytesExt, WriteBytesExt};

/// One entry in the constant pool
///
/// Entries are kept exactly as read: `Float`/`Double` hold raw bit patterns
/// (NaN payloads survive a round trip) and `Utf8` holds the raw modified-UTF-8
/// bytes rather than a decoded string.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    /// Structural gap: index 0, and the unusable slot following every
    /// `Long`/`Double` entry
    Placeholder,
    Utf8(Vec<u8>),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap_method: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap_method: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
}

impl Constant {
    /// Number of constant pool slots this entry occupies
    pub fn width(&self) -> u16 {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Placeholder => (),
            Constant::Utf8(bytes) => {
                1u8.serialize(writer)?;
                (bytes.len() as u16).serialize(writer)?;
                writer.write_all(bytes)?;
            }
            Constant::Integer(value) => {
                3u8.serialize(writer)?;
                value.serialize(writer)?;
            }
            Constant::Float(bits) => {
                4u8.serialize(writer)?;
                bits.serialize(writer)?;
            }
            Constant::Long(value) => {
                5u8.serialize(writer)?;
                value.serialize(writer)?;
            }
            Constant::Double(bits) => {
                6u8.serialize(writer)?;
                bits.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(utf8) => {
                8u8.serialize(writer)?;
                utf8.serialize(writer)?;
            }
            Constant::FieldRef {
                class,
                name_and_type,
            } => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
            } => {
                10u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => {
                11u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle { kind, reference } => {
                15u8.serialize(writer)?;
                kind.serialize(writer)?;
                reference.serialize(writer)?;
            }
            Constant::MethodType(descriptor) => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                17u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                18u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::Module(name) => {
                19u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::Package(name) => {
                20u8.serialize(writer)?;
                name.serialize(writer)?;
            }
        }
        Ok(())
    }
}

/// The constant pool of a single class
///
/// Slot 0 is always a [`Constant::Placeholder`] so that pool indices from the
/// rest of the class file can be used without adjustment.
#[derive(Clone, Debug, Default)]
pub struct ConstantPool {
    pub entries: Vec<Constant>,
}

impl ConstantPool {
    pub fn get(&self, index: u16) -> Result<&Constant, ClassFileError> {
        match self.entries.get(index as usize) {
            None | Some(Constant::Placeholder) => Err(ClassFileError::BadConstantIndex(index)),
            Some(constant) => Ok(constant),
        }
    }

    /// Raw bytes of a `Utf8` entry
    pub fn utf8(&self, index: u16) -> Result<&[u8], ClassFileError> {
        match self.get(index)? {
            Constant::Utf8(bytes) => Ok(bytes),
            _ => Err(ClassFileError::BadConstantIndex(index)),
        }
    }

    pub fn utf8_str(&self, index: u16) -> Result<&str, ClassFileError> {
        std::str::from_utf8(self.utf8(index)?).map_err(|_| {
            ClassFileError::Malformed(format!("constant {} is not valid UTF-8", index))
        })
    }

    fn name_and_type(&self, index: u16) -> Result<(u16, u16), ClassFileError> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => Ok((*name, *descriptor)),
            _ => Err(ClassFileError::BadConstantIndex(index)),
        }
    }

    /// Descriptor of the field behind a `FieldRef` entry
    pub fn field_descriptor(&self, ref_index: u16) -> Result<FieldType, ClassFileError> {
        let name_and_type = match self.get(ref_index)? {
            Constant::FieldRef { name_and_type, .. } => *name_and_type,
            _ => return Err(ClassFileError::BadConstantIndex(ref_index)),
        };
        let (_, descriptor) = self.name_and_type(name_and_type)?;
        FieldType::parse(self.utf8_str(descriptor)?)
            .map_err(|err| ClassFileError::Malformed(err.to_string()))
    }

    /// Descriptor of the method behind a `MethodRef`, `InterfaceMethodRef`,
    /// or `InvokeDynamic` entry
    pub fn method_descriptor(&self, ref_index: u16) -> Result<MethodDescriptor, ClassFileError> {
        let name_and_type = match self.get(ref_index)? {
            Constant::MethodRef { name_and_type, .. }
            | Constant::InterfaceMethodRef { name_and_type, .. }
            | Constant::InvokeDynamic { name_and_type, .. }
            | Constant::Dynamic { name_and_type, .. } => *name_and_type,
            _ => return Err(ClassFileError::BadConstantIndex(ref_index)),
        };
        let (_, descriptor) = self.name_and_type(name_and_type)?;
        MethodDescriptor::parse(self.utf8_str(descriptor)?)
            .map_err(|err| ClassFileError::Malformed(err.to_string()))
    }
}

impl Serialize for ConstantPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (self.entries.len() as u16).serialize(writer)?;
        for entry in &self.entries {
            entry.serialize(writer)?;
        }
        Ok(())
    }
}

impl Deserialize for ConstantPool {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, ClassFileError> {
        let count = u16::deserialize(reader)?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Constant::Placeholder);

        while (entries.len() as u16) < count {
            let index = entries.len() as u16;
            let tag = u8::deserialize(reader)?;
            let entry = match tag {
                1 => {
                    let len = u16::deserialize(reader)?;
                    let mut bytes = vec![0u8; len as usize];
                    reader.read_exact(&mut bytes)?;
                    Constant::Utf8(bytes)
                }
                3 => Constant::Integer(i32::deserialize(reader)?),
                4 => Constant::Float(u32::deserialize(reader)?),
                5 => Constant::Long(i64::deserialize(reader)?),
                6 => Constant::Double(u64::deserialize(reader)?),
                7 => Constant::Class(u16::deserialize(reader)?),
                8 => Constant::String(u16::deserialize(reader)?),
                9 => Constant::FieldRef {
                    class: u16::deserialize(reader)?,
                    name_and_type: u16::deserialize(reader)?,
                },
                10 => Constant::MethodRef {
                    class: u16::deserialize(reader)?,
                    name_and_type: u16::deserialize(reader)?,
                },
                11 => Constant::InterfaceMethodRef {
                    class: u16::deserialize(reader)?,
                    name_and_type: u16::deserialize(reader)?,
                },
                12 => Constant::NameAndType {
                    name: u16::deserialize(reader)?,
                    descriptor: u16::deserialize(reader)?,
                },
                15 => Constant::MethodHandle {
                    kind: u8::deserialize(reader)?,
                    reference: u16::deserialize(reader)?,
                },
                16 => Constant::MethodType(u16::deserialize(reader)?),
                17 => Constant::Dynamic {
                    bootstrap_method: u16::deserialize(reader)?,
                    name_and_type: u16::deserialize(reader)?,
                },
                18 => Constant::InvokeDynamic {
                    bootstrap_method: u16::deserialize(reader)?,
                    name_and_type: u16::deserialize(reader)?,
                },
                19 => Constant::Module(u16::deserialize(reader)?),
                20 => Constant::Package(u16::deserialize(reader)?),
                tag => return Err(ClassFileError::BadConstantTag { tag, index }),
            };

            let width = entry.width();
            entries.push(entry);
            if width == 2 {
                // `Long` and `Double` burn a second slot
                entries.push(Constant::Placeholder);
            }
        }

        Ok(ConstantPool { entries })
    }
}
