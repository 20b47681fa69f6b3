//! Gzip-compressed tar archives holding the members of a partial dump.
//!
//! Members are identified by file name only; their physical order in the
//! stream carries no meaning.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use thiserror::Error;

/// Version of the partial archive member set below. Bumped whenever a member
/// is added, removed or changes its content. Stored in the gzip header comment.
pub const ARCHIVE_FORMAT_VERSION: u32 = 1;

const FORMAT_COMMENT_PREFIX: &str = "one-dump format ";

pub const SCHEMA_MEMBER: &str = "schema.dump";
pub const TABLES_MEMBER: &str = "tables.dump";
pub const SEQUENCES_MEMBER: &str = "sequences.dump";

const CHUNK_SIZE: usize = 64 * 1024;
const MEMBER_MODE: u32 = 0o644;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Missing archive members: {}", .0.join(", "))]
    MissingMembers(Vec<String>),
    #[error("Unexpected archive member `{0}`")]
    UnexpectedMember(String),
    #[error("Unsupported archive format `{0}`, expected version {ARCHIVE_FORMAT_VERSION}")]
    UnsupportedFormat(String),
    #[error("Failed to {context}: `{source}`")]
    Io {
        context: String,
        source: io::Error,
    },
}

fn io_error(context: impl Into<String>) -> impl FnOnce(io::Error) -> ArchiveError {
    move |source| ArchiveError::Io {
        context: context.into(),
        source,
    }
}

fn add_to_tar<W: Write>(
    name: &str,
    path: &Path,
    archive: &mut tar::Builder<W>,
) -> Result<(), ArchiveError> {
    let file = File::open(path).map_err(io_error(format!("open {name}")))?;
    let size = file
        .metadata()
        .map_err(io_error(format!("read size of {name}")))?
        .len();

    let mut header = tar::Header::new_gnu();
    header.set_size(size);
    header.set_mode(MEMBER_MODE);
    header.set_cksum();

    archive
        .append_data(
            &mut header,
            name,
            BufReader::with_capacity(CHUNK_SIZE, file),
        )
        .map_err(io_error(format!("write {name} to archive")))
}

/// Writes every `(member name, source file)` pair, in order, into `output`.
pub fn create_tar_gz<W: Write>(
    members: &[(String, PathBuf)],
    output: W,
) -> Result<W, ArchiveError> {
    let encoder = GzBuilder::new()
        .comment(format_comment(ARCHIVE_FORMAT_VERSION))
        .write(BufWriter::new(output), Compression::default());
    let mut archive = tar::Builder::new(encoder);

    for (name, path) in members {
        add_to_tar(name, path, &mut archive)?;
    }

    archive
        .into_inner()
        .and_then(GzEncoder::finish)
        .and_then(|writer| writer.into_inner().map_err(io::IntoInnerError::into_error))
        .map_err(io_error("finish archive"))
}

/// Extracts all regular-file members into `destination` and returns their paths.
///
/// Members may only be plain file names; anything containing a directory
/// component is rejected before it is written. Archives written with another
/// format version are rejected once the stream has been read.
pub fn extract_tar_gz(input: impl Read, destination: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(input)));
    let mut paths = vec![];

    for entry in archive.entries().map_err(io_error("read archive"))? {
        let mut entry = entry.map_err(io_error("read archive entry"))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let name = member_name(&entry.path().map_err(io_error("read entry name"))?)?;
        let target = destination.join(&name);
        entry
            .unpack(&target)
            .map_err(io_error(format!("extract {name}")))?;
        paths.push(target);
    }

    let comment = archive
        .into_inner()
        .header()
        .and_then(|header| header.comment())
        .map(|comment| String::from_utf8_lossy(comment).into_owned())
        .unwrap_or_default();
    if comment != format_comment(ARCHIVE_FORMAT_VERSION) {
        return Err(ArchiveError::UnsupportedFormat(comment));
    }

    Ok(paths)
}

fn format_comment(version: u32) -> String {
    format!("{FORMAT_COMMENT_PREFIX}{version}")
}

fn member_name(path: &Path) -> Result<String, ArchiveError> {
    let mut components = path.components().filter(|c| *c != Component::CurDir);

    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) => name
            .to_str()
            .map(ToOwned::to_owned)
            .ok_or_else(|| ArchiveError::UnexpectedMember(path.to_string_lossy().into_owned())),
        _ => Err(ArchiveError::UnexpectedMember(
            path.to_string_lossy().into_owned(),
        )),
    }
}
