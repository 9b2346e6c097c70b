//! Instance readers.
//!
//! MPS (fixed and free form) and PBO/OPB pseudo-Boolean instances, read
//! transparently through gzip when the file name ends in `.gz`. Parse
//! failures are values, never panics; the CLI turns them into exit code 1.

mod mps;
mod pbo;

pub use mps::parse_mps;
pub use pbo::parse_pbo;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;
use thiserror::Error;

use crate::problem::Problem;

/// Reader failure.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Underlying IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed input with the offending line number.
    #[error("parse error at line {line}: {message}")]
    Syntax {
        /// 1-based line number.
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// The file extension does not identify a supported format.
    #[error("unrecognized instance format: {0}")]
    UnknownFormat(String),
}

impl ParseError {
    pub(crate) fn syntax(line: usize, message: impl Into<String>) -> Self {
        ParseError::Syntax {
            line,
            message: message.into(),
        }
    }
}

/// Read an instance, picking the format from the file extension
/// (`.mps[.gz]`, `.opb[.gz]`, `.pbo[.gz]`).
pub fn read_problem(path: impl AsRef<Path>) -> Result<Problem, ParseError> {
    let path = path.as_ref();
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let lower = path.to_string_lossy().to_ascii_lowercase();
    let stripped = lower.strip_suffix(".gz").unwrap_or(&lower);

    if stripped.ends_with(".mps") {
        parse_mps(open_maybe_gz(path)?, &name)
    } else if stripped.ends_with(".opb") || stripped.ends_with(".pbo") {
        parse_pbo(open_maybe_gz(path)?, &name)
    } else {
        Err(ParseError::UnknownFormat(lower))
    }
}

fn open_maybe_gz(path: &Path) -> Result<Box<dyn BufRead>, ParseError> {
    let file = File::open(path)?;
    if path.to_string_lossy().ends_with(".gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}
