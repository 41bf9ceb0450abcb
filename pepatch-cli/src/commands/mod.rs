pub mod common;
pub mod detect;
pub mod fetch;
pub mod imports;
pub mod patch;
