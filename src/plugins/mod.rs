//! Plugins shipped with the bridge.

pub mod static_files;

pub use static_files::{directory, file, DirectoryConfig, FileConfig, StaticFilesOptions, StaticTarget};
