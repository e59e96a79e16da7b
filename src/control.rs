//! Typed bindings for specific control files.
//!
//! Thin wrappers that construct a [`FileClient`] for a well-known path and
//! translate between the raw on-disk values and typed accessors. They are
//! also the reference for how drivers outside this crate are expected to
//! use the builder.
use std::{path::Path, sync::Arc};

use crate::{
    client::{FileClient, Result},
    shell::Shell,
    util::{PROC_PATH, SYSFS_PATH},
};

/// One known CPU boost control file.
///
/// The on/off encoding differs per driver: `intel_pstate` exposes
/// `no_turbo`, which inverts the sense.
#[derive(Debug)]
struct BoostControl {
    /// Relative to the sysfs root
    path: &'static str,
    on: &'static str,
    off: &'static str,
}

impl BoostControl {
    fn is_on(&self, raw: &str) -> bool {
        raw.trim() == self.on
    }

    fn value(&self, on: bool) -> &'static str {
        if on {
            self.on
        } else {
            self.off
        }
    }
}

/// Known boost control files, probed in order.
const BOOST_CONTROLS: &[BoostControl] = &[
    BoostControl {
        path: "devices/system/cpu/intel_pstate/no_turbo",
        on: "0",
        off: "1",
    },
    BoostControl {
        path: "devices/system/cpu/cpufreq/boost",
        on: "1",
        off: "0",
    },
];

/// CPU frequency boost switch.
///
/// Binds to the first boost control file present on this system. The files
/// are root-owned, so access is routed through the elevated shell.
#[derive(Debug)]
pub struct CpuBoost {
    client: FileClient,
    control: &'static BoostControl,
}

impl CpuBoost {
    /// Bind to the system's boost control file.
    ///
    /// Returns [`None`] when the CPU driver exposes none of the known
    /// control files.
    pub fn detect(shell: Arc<Shell>) -> Option<Self> {
        let control = BOOST_CONTROLS
            .iter()
            .find(|c| Path::new(SYSFS_PATH).join(c.path).exists())?;
        let client = FileClient::builder(Path::new(SYSFS_PATH).join(control.path), "cpu-boost")
            .sudo()
            .build(shell);
        Some(Self { client, control })
    }

    /// Whether boost is currently enabled.
    pub fn enabled(&self) -> Result<bool> {
        let raw = self.client.read(0, 0)?;
        Ok(self.control.is_on(&raw))
    }

    /// Turn boost on or off.
    pub fn set_enabled(&self, on: bool) -> Result<()> {
        self.client.write(self.control.value(on))
    }
}

/// CPU vendor, from `/proc/cpuinfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuBrand {
    Intel,
    Amd,
}

/// Identify the CPU vendor.
///
/// Returns [`None`] when `/proc/cpuinfo` is unreadable or reports a vendor
/// this crate doesn't know about.
pub fn cpu_brand(shell: Arc<Shell>) -> Option<CpuBrand> {
    let client = FileClient::builder(Path::new(PROC_PATH).join("cpuinfo"), "cpuinfo")
        .optional()
        .build(shell);
    if !client.available() {
        return None;
    }
    parse_cpu_brand(&client.read(0, 0).ok()?)
}

fn parse_cpu_brand(cpuinfo: &str) -> Option<CpuBrand> {
    if cpuinfo.contains("GenuineIntel") {
        Some(CpuBrand::Intel)
    } else if cpuinfo.contains("AuthenticAMD") {
        Some(CpuBrand::Amd)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;

    #[test]
    fn no_turbo_inverts_the_sense() {
        let no_turbo = &BOOST_CONTROLS[0];
        assert!(no_turbo.is_on("0\n"));
        assert!(!no_turbo.is_on("1\n"));
        assert_eq!(no_turbo.value(true), "0");

        let cpufreq = &BOOST_CONTROLS[1];
        assert!(cpufreq.is_on("1\n"));
        assert!(!cpufreq.is_on("0\n"));
        assert_eq!(cpufreq.value(true), "1");
    }

    #[test]
    fn vendor_strings() {
        assert_eq!(
            parse_cpu_brand("vendor_id\t: GenuineIntel\nmodel name\t: ..."),
            Some(CpuBrand::Intel)
        );
        assert_eq!(
            parse_cpu_brand("vendor_id\t: AuthenticAMD\n"),
            Some(CpuBrand::Amd)
        );
        assert_eq!(parse_cpu_brand("vendor_id\t: SomethingElse\n"), None);
    }

    /// `/proc/cpuinfo` is world-readable on every Linux system.
    #[test]
    fn cpuinfo_is_readable() -> Result<()> {
        let client = FileClient::builder("/proc/cpuinfo", "cpuinfo").build(Arc::new(Shell::new()));
        assert!(client.available());
        assert_eq!(client.read(7, 0)?.len(), 7);
        Ok(())
    }
}
