// sky-server/src/plugins/astro/mod.rs
mod operations;
mod plugin;

pub use operations::{local_offset, moon, sun};
pub use plugin::{MoonPlugin, SunPlugin};
