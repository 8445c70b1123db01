//! AMD GPU architecture identification.
//!
//! The backend is configured with a numeric gfx version (`900`, `906`,
//! `1030`, ...). Architecture families matter for two things here: the
//! wavefront size the lane simulator uses, and the processor name handed to
//! code generation.
//!
//! ```rust,ignore
//! use rocmlower::target::arch::GpuArchitecture;
//!
//! assert_eq!(GpuArchitecture::from_gfx_ip("gfx1100"), GpuArchitecture::Rdna3);
//! assert_eq!(GpuArchitecture::from_version(906).wave_size(), 64);
//! ```

use std::fmt;

/// GPU architecture families for AMD GPUs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuArchitecture {
    /// GCN 5 / Vega (gfx900, gfx902, gfx904, gfx906)
    /// - Wave64 execution
    Gcn5,
    /// CDNA1 (gfx908)
    /// - Instinct MI100
    /// - Wave64 execution
    Cdna1,
    /// CDNA2 (gfx90a)
    /// - Instinct MI200 series
    /// - Wave64 execution
    Cdna2,
    /// CDNA3 (gfx940, gfx941, gfx942)
    /// - Instinct MI300 series
    /// - Wave64 execution
    Cdna3,
    /// RDNA1 (gfx1010, gfx1011, gfx1012)
    /// - Wave32 execution
    Rdna1,
    /// RDNA2 (gfx1030 series)
    /// - Radeon RX 6000 series
    /// - Wave32 execution
    Rdna2,
    /// RDNA3 (gfx1100 series)
    /// - Radeon RX 7000 series
    /// - Wave32 execution
    Rdna3,
    /// Unknown/fallback architecture
    Unknown,
}

impl GpuArchitecture {
    /// Parse architecture from a GFX IP name such as `gfx90a` or `gfx1030`.
    ///
    /// Feature suffixes (`gfx90a:xnack-`) are ignored.
    pub fn from_gfx_ip(gfx_ip: &str) -> Self {
        let ip = gfx_ip.split(':').next().unwrap_or(gfx_ip).trim();
        match ip {
            ip if ip.starts_with("gfx110") => GpuArchitecture::Rdna3,
            ip if ip.starts_with("gfx103") => GpuArchitecture::Rdna2,
            ip if ip.starts_with("gfx101") => GpuArchitecture::Rdna1,
            ip if ip.starts_with("gfx94") => GpuArchitecture::Cdna3,
            "gfx90a" => GpuArchitecture::Cdna2,
            "gfx908" => GpuArchitecture::Cdna1,
            ip if ip.starts_with("gfx90") => GpuArchitecture::Gcn5,
            _ => GpuArchitecture::Unknown,
        }
    }

    /// Architecture for the numeric version the backend is configured with.
    pub fn from_version(version: u32) -> Self {
        Self::from_gfx_ip(&gfx_name(version))
    }

    /// Wavefront size (lanes per wave)
    ///
    /// - GCN/CDNA: Wave64
    /// - RDNA: Wave32 (the native mode the device libraries assume)
    pub fn wave_size(&self) -> u32 {
        match self {
            GpuArchitecture::Gcn5
            | GpuArchitecture::Cdna1
            | GpuArchitecture::Cdna2
            | GpuArchitecture::Cdna3 => 64,
            GpuArchitecture::Rdna1 | GpuArchitecture::Rdna2 | GpuArchitecture::Rdna3 => 32,
            GpuArchitecture::Unknown => 64, // GCN default
        }
    }

    pub fn is_rdna(&self) -> bool {
        matches!(
            self,
            GpuArchitecture::Rdna1 | GpuArchitecture::Rdna2 | GpuArchitecture::Rdna3
        )
    }

    pub fn family_name(&self) -> &'static str {
        match self {
            GpuArchitecture::Gcn5 => "GCN5",
            GpuArchitecture::Cdna1 => "CDNA1",
            GpuArchitecture::Cdna2 => "CDNA2",
            GpuArchitecture::Cdna3 => "CDNA3",
            GpuArchitecture::Rdna1 => "RDNA1",
            GpuArchitecture::Rdna2 => "RDNA2",
            GpuArchitecture::Rdna3 => "RDNA3",
            GpuArchitecture::Unknown => "unknown",
        }
    }
}

impl fmt::Display for GpuArchitecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.family_name())
    }
}

/// Processor name for a numeric gfx version, e.g. `900` -> `gfx900`.
pub fn gfx_name(version: u32) -> String {
    format!("gfx{}", version)
}
