pub mod archive;
pub mod image;
pub mod layer_files;
pub mod navigator;
pub mod notifier;
pub mod tui;

// Re-exports for easy access
pub use archive::{ArchiveError, EntryKind, FileEntry, OuterArchive};
pub use image::{Image, ImageSummary, Layer};
pub use layer_files::{CrossLayerHits, Extraction, FileIndex, LayerFiles};
pub use navigator::{dispatch, Flow, Key, NavState, View};
pub use notifier::Notifier;
