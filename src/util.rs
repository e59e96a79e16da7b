//! Utility functions

/// Technically Linux requires sysfs to be at `/sys`, calling it a system
/// configuration error otherwise.
///
/// Some distros are experimenting with filesystem layout changes though,
/// so do this to allow easily changing it.
pub(crate) const SYSFS_PATH: &str = "/sys";

/// Proc filesystem location. Same reasons as [`SYSFS_PATH`].
pub(crate) const PROC_PATH: &str = "/proc";
