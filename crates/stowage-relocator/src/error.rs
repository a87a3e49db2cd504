//! Relocation error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from relocating an archive.
///
/// Relocation runs on bytes whose integrity has already been verified, so
/// none of these are worth retrying against another repository.
#[derive(Debug, Error)]
pub enum RelocationError {
    /// The relocator was run a second time.
    #[error("relocator has already been run")]
    AlreadyRun,

    /// Reading the input or writing the output failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The archive container is unreadable or could not be written.
    #[error("archive error on {path}: {source}")]
    Archive {
        /// Archive being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: zip::result::ZipError,
    },

    /// A compiled class entry could not be rewritten.
    #[error("malformed class entry {entry}: {source}")]
    MalformedClass {
        /// Entry name inside the archive.
        entry: String,
        /// What was wrong with it.
        #[source]
        source: ClassFormatError,
    },
}

/// Structural problems in a class file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassFormatError {
    /// The data ended early.
    #[error("truncated at offset {offset}")]
    Truncated {
        /// Where more bytes were needed.
        offset: usize,
    },

    /// The file does not start with the class file magic number.
    #[error("bad magic number {found:#010x}")]
    BadMagic {
        /// What was found instead.
        found: u32,
    },

    /// A constant pool entry has an unknown tag.
    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownTag {
        /// The tag byte.
        tag: u8,
        /// Constant pool index.
        index: u16,
    },

    /// A constant references an index outside the pool.
    #[error("constant pool index {index} out of range")]
    BadReference {
        /// The bad index.
        index: u16,
    },

    /// An annotation element value has an unknown tag.
    #[error("unknown annotation element tag {tag:#04x} at offset {offset}")]
    BadElementValue {
        /// The tag byte.
        tag: u8,
        /// Where the tag was read.
        offset: usize,
    },

    /// Annotations are nested deeper than the relocator follows.
    #[error("annotations nested too deeply at offset {offset}")]
    NestingTooDeep {
        /// Where the limit was hit.
        offset: usize,
    },

    /// A rewritten string no longer fits a `Utf8` constant.
    #[error("rewritten constant at index {index} is {length} bytes, over the 65535 limit")]
    ConstantTooLong {
        /// Constant pool index.
        index: u16,
        /// Encoded length after rewriting.
        length: usize,
    },
}

/// Result type for relocation.
pub type RelocationResult<T> = Result<T, RelocationError>;
