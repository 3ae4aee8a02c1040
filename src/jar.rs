//! Jar container access: read one entry, rewrite the archive around it.
//!
//! The rewrite is a pass-through copy: every entry except the replaced one is
//! transferred with its raw (still compressed) payload and original header
//! metadata, in the order the entries appear in the input. Only the target
//! entry is written fresh.

use crate::error::{Error, Result};
use log::debug;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

fn container_error(err: ZipError) -> Error {
    match err {
        ZipError::Io(err) => Error::Io(err),
        ZipError::InvalidArchive(reason) | ZipError::UnsupportedArchive(reason) => {
            Error::NotAnArchive(reason)
        }
        _ => Error::NotAnArchive("unreadable archive"),
    }
}

/// A jar opened for reading
///
/// Holds one read handle for the lifetime of the value; reading never
/// mutates the source file.
pub struct Jar {
    archive: ZipArchive<File>,
}

impl Jar {
    pub fn open(path: &Path) -> Result<Jar> {
        let file = File::open(path)?;
        let archive = ZipArchive::new(file).map_err(container_error)?;
        Ok(Jar { archive })
    }

    /// Number of entries in the archive
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    /// Decompressed content of the entry with exactly this name
    pub fn entry_bytes(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut entry = self.archive.by_name(name).map_err(|err| match err {
            ZipError::FileNotFound => Error::EntryNotFound(name.to_string()),
            other => container_error(other),
        })?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Write a new archive to `output`: the entry named `target_name` gets
    /// `replacement` as its content, every other entry is copied through raw,
    /// in original order.
    ///
    /// The archive is first written to a sibling `.tmp` path and renamed over
    /// `output` once complete, so a failed run never leaves a truncated
    /// archive at the destination.
    pub fn rewrite(&mut self, target_name: &str, replacement: &[u8], output: &Path) -> Result<()> {
        let mut tmp_name = output.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path: PathBuf = output.with_file_name(tmp_name);

        let result = self.rewrite_to(target_name, replacement, &tmp_path);
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
            return result;
        }

        fs::rename(&tmp_path, output)?;
        Ok(())
    }

    fn rewrite_to(&mut self, target_name: &str, replacement: &[u8], path: &Path) -> Result<()> {
        let mut writer = ZipWriter::new(File::create(path)?);

        let mut replaced = false;
        for index in 0..self.archive.len() {
            let entry = self.archive.by_index_raw(index).map_err(container_error)?;
            if entry.name() == target_name {
                drop(entry);
                let options =
                    FileOptions::default().compression_method(CompressionMethod::Deflated);
                writer
                    .start_file(target_name, options)
                    .map_err(container_error)?;
                writer.write_all(replacement)?;
                replaced = true;
                debug!("replaced entry {}", target_name);
            } else {
                debug!("copying entry {} through unchanged", entry.name());
                writer.raw_copy_file(entry).map_err(container_error)?;
            }
        }
        writer.finish().map_err(container_error)?;

        // The caller looked the entry up before rewriting, so this only
        // trips if the archive changed underneath us
        if !replaced {
            return Err(Error::EntryNotFound(target_name.to_string()));
        }
        Ok(())
    }
}
