use crate::jvm::class_file::{
    Attribute, ConstantPool, Deserialize, Field, Method, Serialize, Version,
};
use crate::jvm::errors::ClassFileError;
use crate::jvm::ClassAccessFlags;
use byteorder::WriteBytesExt;
use std::io::Cursor;

/// Representation of the [`class` file format of the JVM][0]
///
/// Parsing keeps every structure it does not need to understand in raw form,
/// so that [`ClassFile::encode`] reproduces an unmodified class byte for byte.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug)]
pub struct ClassFile {
    pub version: Version,
    pub constant_pool: ConstantPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    const MAGIC: u32 = 0xCAFE_BABE;

    /// Parse a class out of the raw bytes of one archive entry
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, ClassFileError> {
        let mut reader = Cursor::new(bytes);

        let magic = u32::deserialize(&mut reader)?;
        if magic != ClassFile::MAGIC {
            return Err(ClassFileError::BadMagic(magic));
        }

        let class_file = ClassFile {
            version: Version::deserialize(&mut reader)?,
            constant_pool: ConstantPool::deserialize(&mut reader)?,
            access_flags: ClassAccessFlags::deserialize(&mut reader)?,
            this_class: u16::deserialize(&mut reader)?,
            super_class: u16::deserialize(&mut reader)?,
            interfaces: Vec::deserialize(&mut reader)?,
            fields: Vec::deserialize(&mut reader)?,
            methods: Vec::deserialize(&mut reader)?,
            attributes: Vec::deserialize(&mut reader)?,
        };

        if (reader.position() as usize) < bytes.len() {
            return Err(ClassFileError::Malformed(format!(
                "{} trailing bytes after class structure",
                bytes.len() - reader.position() as usize
            )));
        }

        Ok(class_file)
    }

    /// Encode the class back into entry bytes
    pub fn encode(&self) -> Result<Vec<u8>, ClassFileError> {
        let mut bytes = vec![];
        self.serialize(&mut bytes)?;
        Ok(bytes)
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        ClassFile::MAGIC.serialize(writer)?;
        self.version.serialize(writer)?;
        self.constant_pool.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        self.super_class.serialize(writer)?;
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}
