//! Represents one finished chunk of a multipart upload.

use serde::{Deserialize, Serialize};

/// Part numbers accepted by every backend (S3 limits).
pub const MIN_PART_NUMBER: i32 = 1;
pub const MAX_PART_NUMBER: i32 = 10_000;

/// A single uploaded part, produced by whoever performed the actual transfer
/// and passed back into `complete_multipart`.
///
/// Backends map this onto their own SDK types; the two logical fields are the
/// same everywhere.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CompletedPart {
    /// Entity tag returned when the part was uploaded.
    pub etag: String,

    /// Part number that identifies the part, in `[1, 10000]`.
    pub part_number: i32,
}

impl CompletedPart {
    pub fn new(etag: impl Into<String>, part_number: i32) -> Self {
        Self {
            etag: etag.into(),
            part_number,
        }
    }

    /// Whether the part number is inside the range backends accept.
    pub fn in_range(&self) -> bool {
        (MIN_PART_NUMBER..=MAX_PART_NUMBER).contains(&self.part_number)
    }
}
