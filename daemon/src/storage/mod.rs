//! Persistent storage: on-disk layout and the settings file

pub mod layout;
pub mod settings;
