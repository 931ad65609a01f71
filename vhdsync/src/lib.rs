//! vhdsync - Resumable disk image download and block fingerprinting
//!
//! This library provides the two actions of the `vhdsync` tool:
//!
//! - [`download`]: fetch a large image over HTTP in fixed-size ranged
//!   chunks, resuming from a `.part` file after interruption
//! - [`synchash`]: write a `.synchash` file with a rolling checksum and a
//!   strong digest for every block of a local image
//!
//! Supporting modules cover checksums, configuration, logging and the
//! bounded diagnostic log printed at exit.

pub mod checksum;
pub mod config;
pub mod diagnostics;
pub mod download;
pub mod error;
pub mod logging;
pub mod synchash;

pub use error::ErrorKind;
