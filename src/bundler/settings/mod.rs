//! Configuration structures for the packaging pipeline.
//!
//! The pipeline file (`packaging.toml`) is deserialized into the per-stage
//! structs below and frozen into a [`Settings`] by [`SettingsBuilder`].

mod arch;
mod builder;
mod core;
mod linux;
mod macos;
mod package;
mod resources;

// Re-export all public types
pub use arch::{MacArch, MachArch, host_machine};
pub use builder::{DEFAULT_CONFIG_FILE, SettingsBuilder};
pub use self::core::Settings;
pub use linux::{AppImageSettings, LinuxSettings, RuntimeSettings};
pub use macos::{MacOsSettings, SigningSettings, UNSUPPORTED_GUI_TOOLKIT};
pub use package::ProjectSettings;
pub use resources::{ResourceSettings, SdistSettings};
