use crate::jvm::class_file::{Deserialize, Serialize};
use crate::jvm::errors::ClassFileError;
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Attributes (used in classes, fields, methods, and even on some attributes)
///
/// Attribute payloads are carried as raw bytes: everything this tool does not
/// need to understand is copied through untouched, which is what keeps
/// re-encoding an unmodified class byte-identical. The one attribute that is
/// decoded further is `Code`, over in [`crate::jvm::code`].
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;

        // Attribute info length is 4 bytes
        (self.info.len() as u32).serialize(writer)?;
        writer.write_all(&self.info)?;

        Ok(())
    }
}

impl Deserialize for Attribute {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, ClassFileError> {
        let name_index = u16::deserialize(reader)?;
        let len = u32::deserialize(reader)?;
        let mut info = vec![0u8; len as usize];
        reader.read_exact(&mut info)?;
        Ok(Attribute { name_index, info })
    }
}
