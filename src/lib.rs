// ABOUTME: Library root for kubeling - the container engine layer of a k3s-in-containers tool.
// ABOUTME: The diagnostic binary is in main.rs.

pub mod config;
pub mod error;
pub mod runtime;
pub mod types;
