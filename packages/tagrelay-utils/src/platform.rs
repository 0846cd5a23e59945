//! Platform keys and the tables that derive them.
//!
//! A platform is an operating-system family paired with a word size and is
//! written as `<os>_<arch>`, e.g. `osx_64`, `windows_32`, `linux_deb_64`.
//! Keys can be detected from a free-form string (a client-supplied name such
//! as `win64` or `darwin`, or an asset filename) or computed from coarse
//! client capability signals.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Os {
    Osx,
    Windows,
    Linux,
    LinuxDeb,
    LinuxRpm,
}

impl Os {
    pub const ALL: [Os; 5] = [Os::Osx, Os::Windows, Os::Linux, Os::LinuxDeb, Os::LinuxRpm];

    pub fn as_str(&self) -> &'static str {
        match self {
            Os::Osx => "osx",
            Os::Windows => "windows",
            Os::Linux => "linux",
            Os::LinuxDeb => "linux_deb",
            Os::LinuxRpm => "linux_rpm",
        }
    }

    /// Word size assumed when a name carries no architecture hint.
    fn default_arch(&self) -> Arch {
        match self {
            Os::Osx => Arch::X64,
            _ => Arch::X32,
        }
    }

    /// File types in descending preference when several assets of a release
    /// target this OS family. Unlisted file types rank last.
    pub fn default_file_preference(&self) -> &'static [&'static str] {
        match self {
            Os::Osx => &[".dmg", ".zip", ".tar.gz"],
            Os::Windows => &[".exe", ".msi", ".zip", ".nupkg"],
            Os::Linux => &[".appimage", ".tar.gz", ".tgz", ".zip"],
            Os::LinuxDeb => &[".deb"],
            Os::LinuxRpm => &[".rpm"],
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Os {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Os::ALL
            .into_iter()
            .find(|os| os.as_str() == s)
            .ok_or_else(|| GatewayError::bad_request(format!("unknown os family '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Arch {
    #[serde(rename = "32")]
    X32,
    #[serde(rename = "64")]
    X64,
}

impl Arch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X32 => "32",
            Arch::X64 => "64",
        }
    }
}

/// Operating-system family as reported by a client's capability signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Mac,
    Windows,
    Linux,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Platform key for a client that reported its OS family and word size.
    ///
    /// | family  | 32-bit       | 64-bit       |
    /// |---------|--------------|--------------|
    /// | Mac     | `osx_32`     | `osx_64`     |
    /// | Windows | `windows_32` | `windows_64` |
    /// | Linux   | `linux_32`   | `linux_64`   |
    pub fn from_capabilities(family: OsFamily, is_64_bit: bool) -> Self {
        let os = match family {
            OsFamily::Mac => Os::Osx,
            OsFamily::Windows => Os::Windows,
            OsFamily::Linux => Os::Linux,
        };
        let arch = if is_64_bit { Arch::X64 } else { Arch::X32 };
        Platform { os, arch }
    }

    /// Detect a platform from a free-form name or a filename.
    ///
    /// Returns `None` when the name hints at no known OS family.
    pub fn detect(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        let os = detect_os(&name)?;
        let arch = detect_arch(&name).unwrap_or_else(|| os.default_arch());
        Some(Platform { os, arch })
    }

    pub fn key(&self) -> String {
        format!("{}_{}", self.os.as_str(), self.arch.as_str())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.os.as_str(), self.arch.as_str())
    }
}

fn detect_os(name: &str) -> Option<Os> {
    // Squirrel.Windows manifests and packages
    if name.starts_with("releases") || name.ends_with(".nupkg") {
        return Some(Os::Windows);
    }
    // "darwin" contains "win", so mac wins over windows
    if name.contains("mac") || name.contains("osx") || name.contains("darwin") || name.ends_with(".dmg")
    {
        return Some(Os::Osx);
    }
    if name.contains("win") || name.ends_with(".exe") || name.ends_with(".msi") {
        return Some(Os::Windows);
    }
    if name.contains("linux_deb") || name.ends_with(".deb") {
        return Some(Os::LinuxDeb);
    }
    if name.contains("linux_rpm") || name.ends_with(".rpm") {
        return Some(Os::LinuxRpm);
    }
    if name.contains("linux")
        || name.contains("ubuntu")
        || name.ends_with(".tgz")
        || name.ends_with(".tar.gz")
        || name.ends_with(".appimage")
    {
        return Some(Os::Linux);
    }
    None
}

static DOTTED_NUMBER_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(\.\d+)+").unwrap());

static ARCH_64_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[^a-z0-9])(x86_64|x64|amd64|arm64|aarch64|win64|linux64|64)([^a-z0-9]|$)").unwrap()
});

static ARCH_32_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[^a-z0-9])(x86|ia32|i386|i686|win32|linux32|32)([^a-z0-9]|$)").unwrap()
});

/// Architecture from a delimited token. Version numbers are blanked first so
/// `2.0.32` or `3.64.0` never read as a word size.
fn detect_arch(name: &str) -> Option<Arch> {
    let name = DOTTED_NUMBER_REGEX.replace_all(name, "-");
    if ARCH_64_REGEX.is_match(&name) {
        return Some(Arch::X64);
    }
    if ARCH_32_REGEX.is_match(&name) {
        return Some(Arch::X32);
    }
    None
}

/// File type of an asset: its lowercase extension including the dot,
/// with `.tar.gz` treated as one extension.
pub fn file_type(filename: &str) -> String {
    let lower = filename.to_lowercase();
    if lower.ends_with(".tar.gz") {
        return ".tar.gz".to_string();
    }
    match lower.rfind('.') {
        Some(idx) if idx > 0 => lower[idx..].to_string(),
        _ => String::new(),
    }
}
