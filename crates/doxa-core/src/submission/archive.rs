//! Deterministic, filtered `.tar.gz` packaging of a submission directory.
//!
//! Entries are added in sorted order with ownership normalized to a fixed
//! synthetic owner and permissions broadened to `rw` for files and `rwx`
//! for directories, so two packagings of the same content on different
//! machines only differ in embedded timestamps. Symlinks, devices and
//! sockets are skipped silently.

use std::fs::{self, File, Metadata};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use flate2::write::GzEncoder;
use flate2::Compression;
use glob::{Pattern, PatternError};
use tar::{Builder, EntryType, Header};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use super::manifest::MANIFEST_FILE;

/// VCS, editor and cache entries that never belong in a submission.
pub const BUILTIN_EXCLUSIONS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "__pycache__",
    ".DS_Store",
    ".ipynb_checkpoints",
    ".mypy_cache",
    ".pytest_cache",
];

/// Owner and group recorded for every entry.
const SYNTHETIC_OWNER: &str = "doxa";
const SYNTHETIC_ID: u64 = 1000;

/// Permission bits OR-ed into every entry's mode.
const FILE_MODE: u32 = 0o666;
const DIR_MODE: u32 = 0o777;

#[derive(Error, Debug)]
pub enum PackagingError {
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("Could not package {}: {source}", .path.display())]
    Entry {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Packaging failed: {0}")]
    Io(#[from] io::Error),
}

/// Decides which archive-relative paths are left out.
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    patterns: Vec<(Pattern, bool)>,
}

impl ExclusionRules {
    /// Compile user ignore globs. A trailing `/` restricts a pattern to
    /// directories.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, PatternError> {
        let patterns = patterns
            .iter()
            .map(|raw| {
                let raw = raw.as_ref();
                let dir_only = raw.ends_with('/');
                Pattern::new(raw.trim_end_matches('/')).map(|p| (p, dir_only))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_excluded(&self, relative: &Path, is_dir: bool) -> bool {
        let name = archive_name(relative);
        if name == MANIFEST_FILE {
            return true;
        }

        let builtin = relative.components().any(|c| match c {
            Component::Normal(part) => part
                .to_str()
                .map(|part| BUILTIN_EXCLUSIONS.contains(&part))
                .unwrap_or(false),
            _ => false,
        });
        if builtin {
            return true;
        }

        let file_name = relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.patterns.iter().any(|(pattern, dir_only)| {
            (is_dir || !dir_only) && (pattern.matches(&name) || pattern.matches(&file_name))
        })
    }
}

/// Counts of what went into an archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackStats {
    pub files: u64,
    pub directories: u64,
    pub skipped: u64,
}

/// A packed archive in a temporary file, deleted when dropped.
#[derive(Debug)]
pub struct PackedArchive {
    file: NamedTempFile,
    size: u64,
    stats: PackStats,
}

impl PackedArchive {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn stats(&self) -> PackStats {
        self.stats
    }
}

/// Archive name for a relative path, always `/`-separated.
fn archive_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Write a gzip-compressed tar of `directory` to `writer`.
///
/// `on_entry` is called with the archive-relative path of every entry added.
/// Returns the writer once the gzip stream has been finished.
pub fn pack<W, F>(
    directory: &Path,
    rules: &ExclusionRules,
    writer: W,
    mut on_entry: F,
) -> Result<(W, PackStats), PackagingError>
where
    W: Write,
    F: FnMut(&Path),
{
    if !directory.is_dir() {
        return Err(PackagingError::NotADirectory(directory.to_path_buf()));
    }

    let mut builder = Builder::new(GzEncoder::new(writer, Compression::default()));
    let mut stats = PackStats::default();
    append_dir_contents(
        &mut builder,
        directory,
        Path::new(""),
        rules,
        &mut stats,
        &mut on_entry,
    )?;

    let encoder = builder.into_inner()?;
    let writer = encoder.finish()?;
    debug!(
        files = stats.files,
        directories = stats.directories,
        skipped = stats.skipped,
        "Packed submission"
    );
    Ok((writer, stats))
}

/// Pack `directory` into a temporary file.
///
/// The file is removed when the returned archive is dropped, or right away
/// if packaging fails.
pub fn pack_to_tempfile<F>(
    directory: &Path,
    rules: &ExclusionRules,
    on_entry: F,
) -> Result<PackedArchive, PackagingError>
where
    F: FnMut(&Path),
{
    let file = tempfile::Builder::new()
        .prefix("doxa-submission-")
        .suffix(".tar.gz")
        .tempfile()?;

    let writer = BufWriter::new(file.as_file().try_clone()?);
    let (writer, stats) = pack(directory, rules, writer, on_entry)?;
    let inner = writer.into_inner().map_err(|e| e.into_error())?;
    inner.sync_all()?;

    let size = file.as_file().metadata()?.len();
    Ok(PackedArchive { file, size, stats })
}

fn append_dir_contents<W: Write, F: FnMut(&Path)>(
    builder: &mut Builder<W>,
    dir: &Path,
    prefix: &Path,
    rules: &ExclusionRules,
    stats: &mut PackStats,
    on_entry: &mut F,
) -> Result<(), PackagingError> {
    let mut entries = fs::read_dir(dir)
        .map_err(entry_error(dir))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(entry_error(dir))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let relative = prefix.join(entry.file_name());
        let metadata = fs::symlink_metadata(&path).map_err(entry_error(&path))?;
        let file_type = metadata.file_type();

        if !file_type.is_file() && !file_type.is_dir() {
            debug!(path = %relative.display(), "Skipping special file");
            stats.skipped += 1;
            continue;
        }
        if rules.is_excluded(&relative, file_type.is_dir()) {
            debug!(path = %relative.display(), "Excluded");
            stats.skipped += 1;
            continue;
        }

        let name = archive_name(&relative);
        if file_type.is_dir() {
            let mut header = normalized_header(&metadata, EntryType::Directory, 0)?;
            builder
                .append_data(&mut header, &name, io::empty())
                .map_err(entry_error(&path))?;
            stats.directories += 1;
            on_entry(&relative);
            append_dir_contents(builder, &path, &relative, rules, stats, on_entry)?;
        } else {
            let file = File::open(&path).map_err(entry_error(&path))?;
            let size = file.metadata().map_err(entry_error(&path))?.len();
            let mut header = normalized_header(&metadata, EntryType::Regular, size)?;
            builder
                .append_data(&mut header, &name, file.take(size))
                .map_err(entry_error(&path))?;
            stats.files += 1;
            on_entry(&relative);
        }
    }
    Ok(())
}

fn entry_error(path: &Path) -> impl FnOnce(io::Error) -> PackagingError {
    let path = path.to_path_buf();
    move |source| PackagingError::Entry { path, source }
}

fn normalized_header(metadata: &Metadata, entry_type: EntryType, size: u64) -> io::Result<Header> {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_size(size);

    let broadened = if entry_type.is_dir() { DIR_MODE } else { FILE_MODE };
    header.set_mode(permission_bits(metadata) | broadened);

    header.set_uid(SYNTHETIC_ID);
    header.set_gid(SYNTHETIC_ID);
    header.set_username(SYNTHETIC_OWNER)?;
    header.set_groupname(SYNTHETIC_OWNER)?;

    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    header.set_mtime(mtime);
    Ok(header)
}

#[cfg(unix)]
fn permission_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permission_bits(_metadata: &Metadata) -> u32 {
    0
}
