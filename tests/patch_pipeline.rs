//! End-to-end pipeline tests over a jar assembled in memory: a synthetic
//! player class with the guarded constructor, a manifest, and an asset blob.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use jarpatch::jvm::class_file::{
    Attribute, ClassFile, Constant, ConstantPool, Field, Method, Version,
};
use jarpatch::jvm::code::{Code, CodeSubAttribute, Insn, LineNumber};
use jarpatch::jvm::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
use jarpatch::patch::{self, PatchSpec};
use jarpatch::Error;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

const CLASS_ENTRY: &str = "com/unity3d/player/UnityPlayer.class";
const MANIFEST: &[u8] = b"Manifest-Version: 1.0\n";
const ASSET: &[u8] = &[0xde, 0xad, 0xbe, 0xef, 0x00, 0x42];

fn spec() -> PatchSpec {
    PatchSpec::unity_player()
}

/// A minimal player class: one int field, the guarded two-argument
/// constructor, and a trivial `update()` method.
fn build_player_class() -> Vec<u8> {
    let pool = ConstantPool {
        entries: vec![
            Constant::Placeholder,
            Constant::Utf8(b"com/unity3d/player/UnityPlayer".to_vec()), // 1
            Constant::Class(1),                                         // 2
            Constant::Utf8(b"java/lang/Object".to_vec()),               // 3
            Constant::Class(3),                                         // 4
            Constant::Utf8(b"<init>".to_vec()),                         // 5
            Constant::Utf8(b"()V".to_vec()),                            // 6
            Constant::NameAndType {
                name: 5,
                descriptor: 6,
            }, // 7
            Constant::MethodRef {
                class: 4,
                name_and_type: 7,
            }, // 8
            Constant::Utf8(b"java/lang/IllegalStateException".to_vec()), // 9
            Constant::Class(9),                                         // 10
            Constant::MethodRef {
                class: 10,
                name_and_type: 7,
            }, // 11
            Constant::Utf8(
                b"(Landroid/content/Context;Lcom/unity3d/player/IUnityPlayerLifecycleEvents;)V"
                    .to_vec(),
            ), // 12
            Constant::Utf8(b"Code".to_vec()),                           // 13
            Constant::Utf8(b"update".to_vec()),                         // 14
            Constant::Utf8(b"mState".to_vec()),                         // 15
            Constant::Utf8(b"I".to_vec()),                              // 16
            Constant::Utf8(b"SourceFile".to_vec()),                     // 17
            Constant::Utf8(b"UnityPlayer.java".to_vec()),               // 18
            Constant::Utf8(b"LineNumberTable".to_vec()),                // 19
        ],
    };

    // aload_0; invokespecial Object.<init>; then the guard: if the events
    // argument is non-null skip over allocating and throwing the exception
    let constructor_code = Code {
        max_stack: 3,
        max_locals: 3,
        instructions: vec![
            Insn::ALoad0,
            Insn::InvokeSpecial(8),
            Insn::ALoad1,
            Insn::IfNonNull(9),
            Insn::New(10),
            Insn::Dup,
            Insn::Dup,
            Insn::InvokeSpecial(11),
            Insn::AThrow,
            Insn::Return,
        ],
        exception_table: vec![],
        attributes: vec![CodeSubAttribute::LineNumberTable {
            name_index: 19,
            entries: vec![
                LineNumber { insn: 0, line: 40 },
                LineNumber { insn: 4, line: 41 },
                LineNumber { insn: 9, line: 42 },
            ],
        }],
    };

    let update_code = Code {
        max_stack: 0,
        max_locals: 1,
        instructions: vec![Insn::Return],
        exception_table: vec![],
        attributes: vec![],
    };

    let class = ClassFile {
        version: Version::JAVA8,
        constant_pool: pool,
        access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        this_class: 2,
        super_class: 4,
        interfaces: vec![],
        fields: vec![Field {
            access_flags: FieldAccessFlags::PRIVATE,
            name_index: 15,
            descriptor_index: 16,
            attributes: vec![],
        }],
        methods: vec![
            Method {
                access_flags: MethodAccessFlags::PUBLIC,
                name_index: 5,
                descriptor_index: 12,
                attributes: vec![Attribute {
                    name_index: 13,
                    info: constructor_code.encode().unwrap(),
                }],
            },
            Method {
                access_flags: MethodAccessFlags::PUBLIC,
                name_index: 14,
                descriptor_index: 6,
                attributes: vec![Attribute {
                    name_index: 13,
                    info: update_code.encode().unwrap(),
                }],
            },
        ],
        attributes: vec![Attribute {
            name_index: 17,
            info: 18u16.to_be_bytes().to_vec(),
        }],
    };

    class.encode().unwrap()
}

fn build_jar(path: &Path, class_bytes: &[u8]) {
    let mut writer = ZipWriter::new(File::create(path).unwrap());
    let options = FileOptions::default();

    writer.start_file("META-INF/MANIFEST.MF", options).unwrap();
    writer.write_all(MANIFEST).unwrap();

    writer.start_file(CLASS_ENTRY, options).unwrap();
    writer.write_all(class_bytes).unwrap();

    writer.add_directory("assets/", options).unwrap();

    writer.start_file("assets/bin/data", options).unwrap();
    writer.write_all(ASSET).unwrap();

    writer.finish().unwrap();
}

fn scratch_dir(test_name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("jarpatch_{}", test_name));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn entry_names(archive: &mut ZipArchive<File>) -> Vec<String> {
    (0..archive.len())
        .map(|index| archive.by_index(index).unwrap().name().to_string())
        .collect()
}

fn entry_content(archive: &mut ZipArchive<File>, name: &str) -> Vec<u8> {
    let mut entry = archive.by_name(name).unwrap();
    let mut bytes = vec![];
    entry.read_to_end(&mut bytes).unwrap();
    bytes
}

#[test]
fn class_bytes_round_trip_before_any_splice() {
    let class_bytes = build_player_class();
    let reparsed = ClassFile::parse(&class_bytes).unwrap();
    assert_eq!(reparsed.encode().unwrap(), class_bytes);
}

#[test]
fn pipeline_patches_the_constructor_and_copies_everything_else() {
    let dir = scratch_dir("pipeline");
    let input = dir.join("classes.jar");
    let output = dir.join("patched.jar");
    let class_bytes = build_player_class();
    build_jar(&input, &class_bytes);

    patch::apply(&spec(), &input, &output).unwrap();
    assert!(!dir.join("patched.jar.tmp").exists());

    let mut original = ZipArchive::new(File::open(&input).unwrap()).unwrap();
    let mut patched = ZipArchive::new(File::open(&output).unwrap()).unwrap();

    // Same entries, same order
    assert_eq!(entry_names(&mut patched), entry_names(&mut original));

    // Non-target entries are carried over raw: content, checksum, and
    // compressed form all unchanged
    for name in ["META-INF/MANIFEST.MF", "assets/", "assets/bin/data"] {
        let before = original.by_name(name).unwrap();
        let (crc, method, compressed) =
            (before.crc32(), before.compression(), before.compressed_size());
        drop(before);
        let after = patched.by_name(name).unwrap();
        assert_eq!(after.crc32(), crc);
        assert_eq!(after.compression(), method);
        assert_eq!(after.compressed_size(), compressed);
    }
    assert_eq!(entry_content(&mut patched, "META-INF/MANIFEST.MF"), MANIFEST);
    assert_eq!(entry_content(&mut patched, "assets/bin/data"), ASSET);

    // The constructor lost exactly the five fingerprinted instructions and
    // the guard branch now lands on the return that followed them
    let patched_class = ClassFile::parse(&entry_content(&mut patched, CLASS_ENTRY)).unwrap();
    let pool = &patched_class.constant_pool;
    let constructor = &patched_class.methods[0];
    let code_index = constructor.code_attribute_index(pool).unwrap().unwrap();
    let code = Code::parse(&constructor.attributes[code_index].info, pool).unwrap();

    assert_eq!(
        code.instructions,
        vec![
            Insn::ALoad0,
            Insn::InvokeSpecial(8),
            Insn::ALoad1,
            Insn::IfNonNull(4),
            Insn::Return,
        ]
    );
    assert_eq!(code.max_stack, 1);
    assert_eq!(code.max_locals, 3);
    assert_eq!(
        code.attributes,
        vec![CodeSubAttribute::LineNumberTable {
            name_index: 19,
            entries: vec![
                LineNumber { insn: 0, line: 40 },
                LineNumber { insn: 4, line: 42 },
            ],
        }]
    );

    // The other method is untouched
    let update = &patched_class.methods[1];
    assert_eq!(update.name(pool).unwrap(), "update");
    let original_class = ClassFile::parse(&class_bytes).unwrap();
    assert_eq!(update.attributes, original_class.methods[1].attributes);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn patching_twice_fails_with_pattern_not_found() {
    let dir = scratch_dir("idempotence");
    let input = dir.join("classes.jar");
    let output = dir.join("patched.jar");
    let again = dir.join("patched_again.jar");
    build_jar(&input, &build_player_class());

    patch::apply(&spec(), &input, &output).unwrap();
    let err = patch::apply(&spec(), &output, &again).unwrap_err();
    assert!(matches!(err, Error::PatternNotFound));
    assert!(!again.exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn missing_class_entry_is_reported_as_such() {
    let dir = scratch_dir("missing_entry");
    let input = dir.join("other.jar");
    let output = dir.join("patched.jar");

    let mut writer = ZipWriter::new(File::create(&input).unwrap());
    writer
        .start_file("META-INF/MANIFEST.MF", FileOptions::default())
        .unwrap();
    writer.write_all(MANIFEST).unwrap();
    writer.finish().unwrap();

    let err = patch::apply(&spec(), &input, &output).unwrap_err();
    assert!(matches!(err, Error::EntryNotFound(name) if name == CLASS_ENTRY));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn garbage_input_is_not_an_archive() {
    let dir = scratch_dir("not_an_archive");
    let input = dir.join("garbage.jar");
    let output = dir.join("patched.jar");
    fs::write(&input, b"this is not a zip file").unwrap();

    let err = patch::apply(&spec(), &input, &output).unwrap_err();
    assert!(matches!(err, Error::NotAnArchive(_)));

    let _ = fs::remove_dir_all(&dir);
}
