//! Linux targets: the pinned base runtime and the AppImage built on it.

pub mod appimage;
pub mod runtime;

pub use runtime::{RuntimeMarker, RuntimeWorkspace};
