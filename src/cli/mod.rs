//! CLI module for cadence - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for running a demo
//! organization and inspecting configuration.

pub mod commands;
pub mod demo;

pub use commands::Cli;
