use crate::jvm::class_file::{Attribute, ConstantPool, Deserialize, Serialize};
use crate::jvm::errors::ClassFileError;
use crate::jvm::MethodAccessFlags;
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Name of the attribute holding a method's bytecode
pub const CODE_ATTRIBUTE: &str = "Code";

/// Method declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6
#[derive(Debug)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl Method {
    pub fn name<'p>(&self, pool: &'p ConstantPool) -> Result<&'p str, ClassFileError> {
        pool.utf8_str(self.name_index)
    }

    pub fn descriptor<'p>(&self, pool: &'p ConstantPool) -> Result<&'p str, ClassFileError> {
        pool.utf8_str(self.descriptor_index)
    }

    /// Position of the `Code` attribute, or `None` for `abstract`/`native`
    /// methods which carry no bytecode
    pub fn code_attribute_index(&self, pool: &ConstantPool) -> Result<Option<usize>, ClassFileError> {
        for (index, attribute) in self.attributes.iter().enumerate() {
            if pool.utf8(attribute.name_index)? == CODE_ATTRIBUTE.as_bytes() {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }
}

impl Serialize for Method {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Method {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, ClassFileError> {
        Ok(Method {
            access_flags: MethodAccessFlags::deserialize(reader)?,
            name_index: u16::deserialize(reader)?,
            descriptor_index: u16::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}
