#![doc = "External simulator integration for the `sweep` command line tool."]

pub mod runner;

pub use runner::{resolve_program, BuildProfile, CommandRunner};
