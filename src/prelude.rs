//! # pepatch Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and functions
//! from the pepatch library.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all pepatch operations
pub use crate::Error;

/// The result type used throughout pepatch
pub use crate::Result;

// ================================================================================================
// Image Inspection
// ================================================================================================

/// Read-only image access
pub use crate::{PeFile, RawImage};

/// Header classification
pub use crate::{detect_architecture, Architecture, HeaderInfo, OptionalHeaderMagic};

/// Import descriptors
pub use crate::{ImportEntry, SearchScope};

// ================================================================================================
// Patching
// ================================================================================================

/// Import renaming
pub use crate::{patch_image, PatchResult, PatchedImage, Rename, ReplacementMap};

/// Version floor
pub use crate::{patch_version_fields, VERSION_FLOOR};

// ================================================================================================
// Sessions and Deployment
// ================================================================================================

/// Per-file orchestration
pub use crate::{FileOutcome, PatchSession, SessionConfig, SessionState};

/// Batch driver
pub use crate::session::{process_batch, BatchEntry, BatchSummary};

/// Helper library deployment
pub use crate::{BlobDeployer, BlobStore};
