use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;

/// Channel assigned to tags without a pre-release component.
pub const STABLE_CHANNEL: &str = "stable";

static VERSION_NUMBER_STRICT_MATCH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(\.\d+)+(-[0-9A-Za-z][0-9A-Za-z.\-]*)?").unwrap());

static VERSION_NUMBER_MATCH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(-[0-9A-Za-z][0-9A-Za-z.\-]*)?").unwrap());

/// A release tag read leniently as a semantic version.
///
/// Prefixes such as `v` or `release-` are ignored, missing minor and patch
/// numbers are padded with zero and build metadata is dropped, so `v1.2`
/// and `1.2.0` compare equal.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    semver: semver::Version,
}

impl Version {
    pub fn parse(string: &str) -> Option<Self> {
        let matched = VERSION_NUMBER_STRICT_MATCH_REGEX
            .find(string)
            .or_else(|| VERSION_NUMBER_MATCH_REGEX.find(string))?
            .as_str();
        let (core, pre) = match matched.split_once('-') {
            Some((core, pre)) => (core, Some(pre.trim_end_matches(['.', '-']))),
            None => (matched, None),
        };

        let mut numbers = core.split('.').map(|n| n.parse::<u64>());
        let major = numbers.next()?.ok()?;
        let minor = numbers.next().transpose().ok()?.unwrap_or(0);
        let patch = numbers.next().transpose().ok()?.unwrap_or(0);

        let mut semver = semver::Version::new(major, minor, patch);
        if let Some(pre) = pre.filter(|p| !p.is_empty()) {
            semver.pre = semver::Prerelease::new(pre).ok()?;
        }
        Some(Version {
            raw: string.to_string(),
            semver,
        })
    }

    pub fn is_valid(string: &str) -> bool {
        Self::parse(string).is_some()
    }

    /// The tag exactly as the source published it.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn as_semver(&self) -> &semver::Version {
        &self.semver
    }

    pub fn is_prerelease(&self) -> bool {
        !self.semver.pre.is_empty()
    }

    /// Release track derived from the pre-release component:
    /// `2.0.0-beta.3` is on `beta`, `1.0.0-rc1` on `rc`, `1.0.0` on `stable`.
    pub fn channel(&self) -> String {
        let first = self.semver.pre.as_str().split('.').next().unwrap_or("");
        let name: String = first
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_lowercase();
        if name.is_empty() {
            STABLE_CHANNEL.to_string()
        } else {
            name
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.semver)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.semver == other.semver
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.semver.cmp(&other.semver)
    }
}
