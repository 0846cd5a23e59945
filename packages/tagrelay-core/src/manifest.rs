//! Squirrel.Windows `RELEASES` manifests.
//!
//! Each line reads `<sha1> <filename> <size>[ <semver>]`. The transcoder
//! only ever changes the filename column: digest, size and every byte of
//! framing (BOM, line terminators, final newline) survive a parse and
//! generate cycle untouched.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::routes::RouteTemplate;
use tagrelay_provider::{Asset, Release};
use tagrelay_utils::{Arch, GatewayError, Os, Platform, Result, Version};

/// Manifest served to 64-bit Windows clients when a release ships one.
pub const MANIFEST_X64: &str = "RELEASES-x64";
/// Architecture-independent manifest.
pub const MANIFEST: &str = "RELEASES";

/// Pre-release channels encoded in the fourth component of a Windows
/// package version, in encoding order.
const CHANNELS: [&str; 4] = ["alpha", "beta", "unstable", "rc"];
const CHANNEL_MAGNITUDE: u64 = 1000;

const BOM: &str = "\u{feff}";

static NUMERIC_PART: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub sha1: String,
    pub filename: String,
    /// Kept as written; the relay never interprets it.
    pub size: String,
    pub semver: Option<String>,
}

impl ManifestEntry {
    pub fn is_delta(&self) -> bool {
        !self.filename.ends_with("-full.nupkg")
    }

    /// The version this package installs: the explicit column when present,
    /// otherwise decoded from the package filename.
    pub fn version(&self) -> Option<String> {
        self.semver.clone().or_else(|| derive_semver(&self.filename))
    }

    fn to_line(&self) -> String {
        match &self.semver {
            Some(semver) => format!("{} {} {} {}", self.sha1, self.filename, self.size, semver),
            None => format!("{} {} {}", self.sha1, self.filename, self.size),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// A parsed manifest together with the framing needed to reproduce it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
    bom: bool,
    line_ending: LineEnding,
    trailing_newline: bool,
}

impl Manifest {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(raw).map_err(|e| GatewayError::MalformedManifest {
            line: 1,
            reason: format!("not utf-8: {}", e),
        })?;
        let (bom, text) = match text.strip_prefix(BOM) {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let line_ending = if text.contains("\r\n") {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        };
        let (body, trailing_newline) = match text.strip_suffix(line_ending.as_str()) {
            Some(body) => (body, true),
            None => (text, false),
        };

        let mut entries = Vec::new();
        if !body.is_empty() {
            for (idx, line) in body.split(line_ending.as_str()).enumerate() {
                entries.push(parse_line(line, idx + 1)?);
            }
        }
        Ok(Manifest {
            entries,
            bom,
            line_ending,
            trailing_newline,
        })
    }

    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    /// Same framing, new entries.
    pub fn with_entries(mut self, entries: Vec<ManifestEntry>) -> Self {
        self.entries = entries;
        self
    }

    pub fn generate(&self) -> Vec<u8> {
        let terminator = self.line_ending.as_str();
        let mut out = String::new();
        if self.bom {
            out.push_str(BOM);
        }
        let lines: Vec<String> = self.entries.iter().map(ManifestEntry::to_line).collect();
        out.push_str(&lines.join(terminator));
        if self.trailing_newline {
            out.push_str(terminator);
        }
        out.into_bytes()
    }
}

fn parse_line(line: &str, number: usize) -> Result<ManifestEntry> {
    let malformed = |reason: &str| GatewayError::MalformedManifest {
        line: number,
        reason: reason.to_string(),
    };
    if line.contains(['\r', '\n']) {
        return Err(malformed("mixed line endings"));
    }
    let fields: Vec<&str> = line.split(' ').collect();
    if fields.len() != 3 && fields.len() != 4 {
        return Err(malformed(&format!(
            "expected 3 or 4 space-separated fields, found {}",
            fields.len()
        )));
    }
    if fields.iter().any(|f| f.is_empty()) {
        return Err(malformed("empty field"));
    }
    Ok(ManifestEntry {
        sha1: fields[0].to_string(),
        filename: fields[1].to_string(),
        size: fields[2].to_string(),
        semver: fields.get(3).map(|s| s.to_string()),
    })
}

/// Point every entry at the gateway's `/download/<semver>/<filename>` route.
///
/// Entries whose version cannot be read from the filename are routed under
/// `fallback_tag`.
pub fn rewrite(entries: &[ManifestEntry], routes: &RouteTemplate, fallback_tag: &str) -> Vec<ManifestEntry> {
    entries
        .iter()
        .map(|entry| {
            let version = entry.version().unwrap_or_else(|| fallback_tag.to_string());
            ManifestEntry {
                filename: routes.download_file(&version, &entry.filename),
                ..entry.clone()
            }
        })
        .collect()
}

/// Semantic version encoded in a Squirrel package filename.
///
/// `App-1.2.3-full.nupkg` is `1.2.3`. A fourth numeric component encodes a
/// pre-release as `channel_index * 1000 + count`, so
/// `App-1.2.3.2004-delta.nupkg` is `1.2.3-beta.4`.
pub fn derive_semver(filename: &str) -> Option<String> {
    let stem = filename
        .replace(".nupkg", "")
        .replace("-delta", "")
        .replace("-full", "");
    let numbers: Vec<&str> = stem
        .split(['.', '-'])
        .filter(|part| NUMERIC_PART.is_match(part))
        .collect();
    if numbers.len() < 3 {
        return None;
    }
    let version = numbers[..3].join(".");
    let prerelease = numbers
        .get(3)
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or(0);
    if prerelease == 0 {
        return Some(version);
    }
    let channel_id = prerelease / CHANNEL_MAGNITUDE;
    let count = prerelease - channel_id * CHANNEL_MAGNITUDE;
    match channel_id
        .checked_sub(1)
        .and_then(|idx| CHANNELS.get(idx as usize))
    {
        Some(channel) => Some(format!("{}-{}.{}", version, channel, count)),
        None => Some(version),
    }
}

/// Windows package version for a release tag, inverse of [`derive_semver`].
pub fn windows_version(version: &Version) -> String {
    let semver = version.as_semver();
    let base = format!("{}.{}.{}", semver.major, semver.minor, semver.patch);
    if semver.pre.is_empty() {
        return base;
    }
    let mut parts = semver.pre.as_str().split('.');
    let channel = parts.next().unwrap_or_default();
    let count = parts
        .next()
        .and_then(|c| c.parse::<u64>().ok())
        .unwrap_or(0);
    match CHANNELS.iter().position(|c| *c == channel) {
        Some(idx) => format!("{}.{}", base, (idx as u64 + 1) * CHANNEL_MAGNITUDE + count),
        None => base,
    }
}

/// The manifest asset a Windows client on `platform` should receive:
/// `RELEASES-x64` for 64-bit clients when present, `RELEASES` otherwise.
pub fn select_manifest_asset<'a>(release: &'a Release, platform: &Platform) -> Result<&'a Asset> {
    let find = |name: &str| release.assets.iter().find(|asset| asset.filename == name);
    let specific = if platform.os == Os::Windows && platform.arch == Arch::X64 {
        find(MANIFEST_X64)
    } else {
        None
    };
    specific.or_else(|| find(MANIFEST)).ok_or_else(|| {
        GatewayError::ManifestNotFound(format!("{} ships no {} file", release.tag, MANIFEST))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const SAMPLE: &str = "E1FA6C0C1CE8B7A1C9A5B1E1F2A3B4C5D6E7F809 App-1.2.0-full.nupkg 51234567\n\
94689FEDE03FED7AB59C24337673A27837F0C3EC App-1.3.0-delta.nupkg 1024\n\
1A2B3C4D5E6F708192A3B4C5D6E7F8091A2B3C4D App-1.3.0-full.nupkg 52234567\n";

    #[test]
    fn test_parse() {
        let manifest = Manifest::parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(manifest.entries.len(), 3);
        let entry = &manifest.entries[1];
        assert_eq!(entry.sha1, "94689FEDE03FED7AB59C24337673A27837F0C3EC");
        assert_eq!(entry.filename, "App-1.3.0-delta.nupkg");
        assert_eq!(entry.size, "1024");
        assert_eq!(entry.semver, None);
        assert!(entry.is_delta());
        assert!(!manifest.entries[0].is_delta());
        assert_eq!(manifest.line_ending(), LineEnding::Lf);
    }

    #[test]
    fn test_round_trip_preserves_framing() {
        let samples = [
            SAMPLE.to_string(),
            SAMPLE.trim_end().to_string(),
            SAMPLE.replace('\n', "\r\n"),
            format!("{}{}", BOM, SAMPLE.replace('\n', "\r\n").trim_end()),
            "abc App-1.0.0-full.nupkg 10 1.0.0-beta.1\n".to_string(),
            String::new(),
        ];
        for sample in samples {
            let manifest = Manifest::parse(sample.as_bytes()).unwrap();
            assert_eq!(manifest.generate(), sample.as_bytes(), "{:?}", sample);
        }
    }

    #[test]
    fn test_malformed_lines() {
        let err = Manifest::parse(b"abc App.nupkg\n").unwrap_err();
        assert!(matches!(err, GatewayError::MalformedManifest { line: 1, .. }));

        let err = Manifest::parse(b"a b 1\nx  y 2\n").unwrap_err();
        assert!(matches!(err, GatewayError::MalformedManifest { line: 2, .. }));

        let err = Manifest::parse(b"a b 1\n\nc d 2\n").unwrap_err();
        assert!(matches!(err, GatewayError::MalformedManifest { line: 2, .. }));

        let err = Manifest::parse(b"a b 1 2 3").unwrap_err();
        assert!(matches!(err, GatewayError::MalformedManifest { line: 1, .. }));

        assert!(Manifest::parse(&[0xff, 0xfe, 0x00]).is_err());
    }

    #[test]
    fn test_derive_semver() {
        assert_eq!(derive_semver("App-1.2.3-full.nupkg").as_deref(), Some("1.2.3"));
        assert_eq!(derive_semver("App-1.2.3-delta.nupkg").as_deref(), Some("1.2.3"));
        assert_eq!(derive_semver("App-1.2.3.2004-full.nupkg").as_deref(), Some("1.2.3-beta.4"));
        assert_eq!(derive_semver("App-2.0.0.4001-full.nupkg").as_deref(), Some("2.0.0-rc.1"));
        assert_eq!(derive_semver("App-2.0.0.9001-full.nupkg").as_deref(), Some("2.0.0"));
        assert_eq!(derive_semver("App-full.nupkg"), None);
    }

    #[test]
    fn test_windows_version() {
        let v = |s: &str| Version::parse(s).unwrap();
        assert_eq!(windows_version(&v("1.2.3")), "1.2.3");
        assert_eq!(windows_version(&v("v1.2.3-beta.4")), "1.2.3.2004");
        assert_eq!(windows_version(&v("1.2.3-alpha")), "1.2.3.1000");
        assert_eq!(derive_semver("App-1.2.3.2004-full.nupkg").unwrap(), "1.2.3-beta.4");
    }

    #[test]
    fn test_rewrite_changes_only_location() {
        let manifest = Manifest::parse(SAMPLE.as_bytes()).unwrap();
        let routes = RouteTemplate::new("https://updates.example.com").unwrap();
        let rewritten = rewrite(&manifest.entries, &routes, "v1.3.0");

        for (before, after) in manifest.entries.iter().zip(&rewritten) {
            assert_eq!(before.sha1, after.sha1);
            assert_eq!(before.size, after.size);
            assert_eq!(before.semver, after.semver);
        }
        assert_eq!(
            rewritten[1].filename,
            "https://updates.example.com/download/1.3.0/App-1.3.0-delta.nupkg"
        );

        let output = manifest.clone().with_entries(rewritten).generate();
        let text = String::from_utf8(output).unwrap();
        assert!(text.ends_with('\n'));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_rewrite_uses_explicit_semver_then_fallback() {
        let entries = vec![
            ManifestEntry {
                sha1: "a".into(),
                filename: "App-1.0.0-full.nupkg".into(),
                size: "1".into(),
                semver: Some("1.0.0-beta.1".into()),
            },
            ManifestEntry {
                sha1: "b".into(),
                filename: "Setup.nupkg".into(),
                size: "2".into(),
                semver: None,
            },
        ];
        let routes = RouteTemplate::new("http://localhost:5000").unwrap();
        let rewritten = rewrite(&entries, &routes, "v9.0.0");
        assert_eq!(
            rewritten[0].filename,
            "http://localhost:5000/download/1.0.0-beta.1/App-1.0.0-full.nupkg"
        );
        assert_eq!(
            rewritten[1].filename,
            "http://localhost:5000/download/v9.0.0/Setup.nupkg"
        );
    }

    #[test]
    fn test_select_manifest_asset() {
        let both = Release::new("1.0.0", Utc::now()).unwrap().with_assets([
            Asset::new(MANIFEST, "https://dl/RELEASES"),
            Asset::new(MANIFEST_X64, "https://dl/RELEASES-x64"),
        ]);
        let win64 = Platform::new(Os::Windows, Arch::X64);
        let win32 = Platform::new(Os::Windows, Arch::X32);
        assert_eq!(select_manifest_asset(&both, &win64).unwrap().filename, MANIFEST_X64);
        assert_eq!(select_manifest_asset(&both, &win32).unwrap().filename, MANIFEST);

        let generic = Release::new("1.0.0", Utc::now())
            .unwrap()
            .with_asset(Asset::new(MANIFEST, "https://dl/RELEASES"));
        assert_eq!(select_manifest_asset(&generic, &win64).unwrap().filename, MANIFEST);

        let none = Release::new("1.0.0", Utc::now())
            .unwrap()
            .with_asset(Asset::new("App.exe", "https://dl/App.exe"));
        assert!(matches!(
            select_manifest_asset(&none, &win64),
            Err(GatewayError::ManifestNotFound(_))
        ));
    }
}
