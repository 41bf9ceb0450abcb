//! Hand-rolled PE/COFF structure readers.
//!
//! The patcher needs exact file offsets for a handful of structures: the optional header
//! version fields, the section table and the import data directory. These are read directly
//! from the raw buffer through [`crate::file::io`], so every access is bounds checked and
//! works on images `goblin` would reject. `goblin` is only used where a complete decode is
//! wanted, i.e. for the import descriptor list in [`imports::parse_imports`].
//!
//! # Key Components
//!
//! - [`header::HeaderInfo`] - DOS/PE signature validation and header offsets
//! - [`sections::SectionTable`] - Section enumeration and RVA translation
//! - [`imports::SearchWindow`] - First-pass search region for import name strings
//! - [`imports::parse_imports`] - Import descriptor list

pub mod header;
pub mod imports;
pub mod sections;
