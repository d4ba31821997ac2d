//! Configuration management for TurboFile.
//!
//! Client preferences ([`settings::Config`]) are stored as TOML and loaded
//! at startup.

pub mod settings;
