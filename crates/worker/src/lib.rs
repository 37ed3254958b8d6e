//! Command-line worker around the generation pipeline.
//!
//! [`config::WorkerConfig`] reads the environment, [`app::App`] builds the
//! pipeline from it, and [`commands`] runs one [`cli::Command`] to
//! completion.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
