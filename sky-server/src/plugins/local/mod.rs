// sky-server/src/plugins/local/mod.rs
mod plugin;

pub use plugin::LocalPlugin;
