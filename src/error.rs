use std::path::PathBuf;

use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::MalformedImage {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::MalformedImage {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Errors fall into two groups. Fatal errors abort the processing of a single image
/// ([`Error::MalformedImage`], [`Error::ImportParseFailed`], [`Error::FileError`], ...). Non-fatal
/// conditions are never returned as the `Err` of a patch operation; they are collected into
/// [`crate::PatchResult::issues`] or [`crate::FileOutcome::issues`] so every skipped rename has a
/// matching report.
///
/// # Error Categories
///
/// ## Image Parsing Errors
/// - [`Error::MalformedImage`] - Not a valid PE image (fatal for that file)
/// - [`Error::OutOfBounds`] - Attempted to read or write beyond the buffer
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::ImportParseFailed`] - The import directory could not be decoded
///
/// ## Non-fatal Patch Conditions
/// - [`Error::UnsupportedOptionalHeader`] - Version patch skipped
/// - [`Error::RvaNotMapped`] - Import directory window degrades to a full-file search
/// - [`Error::ReplacementTooLong`] - A single rename skipped
/// - [`Error::ImportStringNotFound`] - A single rename skipped
/// - [`Error::BlobMissing`] - A helper library could not be deployed
///
/// ## I/O and Configuration Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::Config`] - Invalid replacement map configuration
/// - [`Error::OutputConflict`] - Two inputs of a batch map to the same output file
///
/// # Examples
///
/// ```rust,no_run
/// use pepatch::{Error, ReplacementMap};
///
/// match ReplacementMap::from_ini_file("progwrp.ini".as_ref()) {
///     Ok(mapping) => println!("{} replacements loaded", mapping.len()),
///     Err(Error::Config { line, message }) => eprintln!("progwrp.ini:{line}: {message}"),
///     Err(e) => eprintln!("Other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // Image parsing errors
    /// The image is damaged or is not a PE file at all.
    ///
    /// Raised when the DOS or PE signature is missing, or when a header offset points
    /// outside the buffer. The error includes the source location where the malformation
    /// was detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed image - {file}:{line}: {message}")]
    MalformedImage {
        /// The message to be printed for the MalformedImage error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted.
    ///
    /// Every multi-byte access into an image goes through a bounds check; this is the
    /// error those checks produce.
    #[error("Out of Bound access would have occurred!")]
    OutOfBounds,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// The optional header magic is neither PE32 nor PE32+, or the version fields lie
    /// beyond the end of the buffer.
    ///
    /// Only the version patch is skipped; import patching still proceeds.
    #[error("Unsupported optional header - {0}")]
    UnsupportedOptionalHeader(String),

    /// No section of the image maps the given relative virtual address.
    #[error("RVA 0x{0:x} is not mapped by any section")]
    RvaNotMapped(u32),

    /// The replacement name (plus terminator) is longer than the name it would replace.
    #[error("Replacement '{replacement}' is longer than '{original}', skipping")]
    ReplacementTooLong {
        /// The import name as found in the image
        original: String,
        /// The configured replacement name
        replacement: String,
    },

    /// The null-terminated import name was found neither in the import window nor
    /// anywhere else in the file.
    #[error("Could not find import string '{0}' in the image, skipping")]
    ImportStringNotFound(String),

    /// The import directory could not be decoded.
    ///
    /// Wraps the failure reported by `goblin` while walking the import descriptors.
    #[error("Failed to parse imports - {0}")]
    ImportParseFailed(#[from] goblin::error::Error),

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur during file operations
    /// such as reading from disk, permission issues, or filesystem errors.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// The replacement map configuration could not be parsed.
    #[error("Invalid configuration at line {line}: {message}")]
    Config {
        /// 1-based line number of the offending line
        line: usize,
        /// Description of the problem
        message: String,
    },

    /// Another input of the same batch already writes to this output path.
    ///
    /// Happens when same-named files from different directories are patched into one
    /// output directory. Only the first of them is processed.
    #[error("Output {} is already written for {}", .output.display(), .first.display())]
    OutputConflict {
        /// The contested output path
        output: PathBuf,
        /// The input that claimed it first
        first: PathBuf,
    },

    /// A helper library requested for deployment does not exist in the blob store.
    #[error("Helper library not available: {}", .0.display())]
    BlobMissing(PathBuf),
}
