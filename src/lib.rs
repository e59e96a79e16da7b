//! Read and write privileged Linux hardware control files
//!
//! # Implementation details
//!
//! Hardware sensors and control knobs are provided through files in `/sys`
//! and `/proc`. Many of them are root-owned, so a process running as a
//! regular user can only reach them by routing the access through a
//! privilege escalation front-end.
//!
//! This crate provides [`client::FileClient`], which binds to one such file
//! and reads or writes it either directly or through a shared
//! [`shell::Shell`], chosen per file at construction.
//!
//! Most of these files are undocumented kernel interfaces, and some may
//! change between kernel versions. Whether a given file exists at all
//! depends on the hardware and the loaded drivers, so accessibility is
//! probed at construction and queryable at runtime; a missing file is a
//! recorded, degraded state, not a hard error.

pub mod client;
pub mod control;
pub mod error;

pub mod shell;
mod util;
