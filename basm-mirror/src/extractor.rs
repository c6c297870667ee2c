//! Stemcell archive extraction.
//!
//! A stemcell tarball is two archives deep: the outer `.tgz` holds the
//! manifest and an inner tarball named `image`, which in turn holds the raw
//! disk image `root.vhd`. Both layers are unpacked in place, next to the
//! downloaded archive.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use tar::Archive;
use xz2::read::XzDecoder;

use crate::error::{extraction_err, MirrorError};

/// Name of the inner tarball inside the stemcell archive.
pub const INNER_ARCHIVE: &str = "image";

/// Name of the raw disk image inside the inner tarball.
pub const DISK_IMAGE: &str = "root.vhd";

/// Compression of a tar stream, detected from its leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    Gzip,
    Bzip2,
    Xz,
    None,
}

impl Compression {
    fn detect(magic: &[u8]) -> Self {
        if magic.starts_with(&[0x1f, 0x8b]) {
            Self::Gzip
        } else if magic.starts_with(b"BZh") {
            Self::Bzip2
        } else if magic.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
            Self::Xz
        } else {
            Self::None
        }
    }
}

/// Unpack `archive_path` and its inner `image` tarball into the archive's
/// directory and return the expected disk image path.
///
/// The returned path is not checked for existence; an archive with an
/// unexpected layout yields a path that does not exist.
pub fn extract(archive_path: &Path) -> Result<PathBuf, MirrorError> {
    let dest = archive_path
        .parent()
        .ok_or_else(|| extraction_err(archive_path, "archive has no parent directory"))?;

    let outer = File::open(archive_path).map_err(|e| extraction_err(archive_path, e))?;
    unpack(MultiGzDecoder::new(BufReader::new(outer)), dest, archive_path)?;
    tracing::debug!(archive = %archive_path.display(), "unpacked outer stemcell archive");

    let inner_path = dest.join(INNER_ARCHIVE);
    if !inner_path.is_file() {
        return Err(extraction_err(
            archive_path,
            format!("archive does not contain '{INNER_ARCHIVE}'"),
        ));
    }
    unpack(open_decompressed(&inner_path)?, dest, &inner_path)?;
    tracing::debug!(archive = %inner_path.display(), "unpacked inner image archive");

    Ok(dest.join(DISK_IMAGE))
}

fn open_decompressed(path: &Path) -> Result<Box<dyn Read>, MirrorError> {
    let file = File::open(path).map_err(|e| extraction_err(path, e))?;
    let mut reader = BufReader::new(file);
    let compression = Compression::detect(reader.fill_buf().map_err(|e| extraction_err(path, e))?);
    tracing::debug!(archive = %path.display(), ?compression, "detected inner archive format");

    Ok(match compression {
        Compression::Gzip => Box::new(MultiGzDecoder::new(reader)),
        Compression::Bzip2 => Box::new(MultiBzDecoder::new(reader)),
        Compression::Xz => Box::new(XzDecoder::new(reader)),
        Compression::None => Box::new(reader),
    })
}

/// Unpack every entry of a tar stream into `dest`, refusing entries that
/// would land outside it.
fn unpack(reader: impl Read, dest: &Path, archive_path: &Path) -> Result<(), MirrorError> {
    let mut archive = Archive::new(reader);
    archive.set_overwrite(true);

    let entries = archive
        .entries()
        .map_err(|e| extraction_err(archive_path, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| extraction_err(archive_path, e))?;
        let path = entry
            .path()
            .map_err(|e| extraction_err(archive_path, e))?
            .into_owned();

        if !is_contained(&path) {
            return Err(extraction_err(
                archive_path,
                format!("refusing entry '{}' outside the workspace", path.display()),
            ));
        }
        if let Some(target) = entry
            .link_name()
            .map_err(|e| extraction_err(archive_path, e))?
        {
            if !is_contained(&target) {
                return Err(extraction_err(
                    archive_path,
                    format!(
                        "refusing link '{}' -> '{}' outside the workspace",
                        path.display(),
                        target.display()
                    ),
                ));
            }
        }

        let unpacked = entry
            .unpack_in(dest)
            .map_err(|e| extraction_err(archive_path, format!("{}: {e}", path.display())))?;
        if !unpacked {
            return Err(extraction_err(
                archive_path,
                format!("refusing entry '{}' outside the workspace", path.display()),
            ));
        }
    }
    Ok(())
}

/// Relative path made only of normal components (and `.`).
fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
