//! Submission packaging.
//!
//! A submission is a directory with a `doxa.yaml` manifest at its root.
//! `prepare` resolves the competition, environment and passthrough metadata;
//! `pack` / `pack_to_tempfile` build the filtered `.tar.gz` that gets
//! uploaded.

pub mod archive;
pub mod manifest;

pub use archive::{
    pack, pack_to_tempfile, ExclusionRules, PackStats, PackagingError, PackedArchive,
    BUILTIN_EXCLUSIONS,
};
pub use manifest::{prepare, ManifestError, PreparedSubmission, MANIFEST_FILE};
