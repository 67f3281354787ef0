//! labsync: jumpstarter lab configuration tool
//!
//! Loads the lab configuration, validates its references and pushes
//! rendered exporter configuration to every exporter host over SSH.

pub mod cli;
pub mod commands;
pub mod factory;
pub mod lint;
pub mod loader;
pub mod service;
pub mod settings;
