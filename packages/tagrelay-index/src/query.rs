use std::fmt;
use std::str::FromStr;

use tagrelay_provider::Release;
use tagrelay_utils::{GatewayError, Platform, Version};

/// Wildcard accepted for both channels and tags.
pub const WILDCARD: &str = "*";
/// Tag alias for "newest available".
pub const LATEST: &str = "latest";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChannelFilter {
    #[default]
    Any,
    Named(String),
}

impl ChannelFilter {
    pub fn named(channel: &str) -> Self {
        channel.parse().unwrap_or(ChannelFilter::Any)
    }

    pub fn matches(&self, release: &Release) -> bool {
        match self {
            ChannelFilter::Any => true,
            ChannelFilter::Named(channel) => release.channel == *channel,
        }
    }
}

impl FromStr for ChannelFilter {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == WILDCARD {
            Ok(ChannelFilter::Any)
        } else {
            Ok(ChannelFilter::Named(s.to_string()))
        }
    }
}

impl fmt::Display for ChannelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelFilter::Any => f.write_str(WILDCARD),
            ChannelFilter::Named(channel) => f.write_str(channel),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
}

impl Comparator {
    fn as_str(&self) -> &'static str {
        match self {
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Eq => "=",
        }
    }
}

/// Tag constraint of a query: `*`/`latest`, an exact tag, or a
/// comparator-prefixed version such as `>=1.2.0`.
///
/// Comparison uses semantic-version precedence, pre-releases included:
/// `>=1.0.0` admits `2.0.0-beta.1`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TagConstraint {
    #[default]
    Any,
    Exact(Version),
    Compare(Comparator, Version),
}

impl TagConstraint {
    pub fn at_least(version: Version) -> Self {
        TagConstraint::Compare(Comparator::Ge, version)
    }

    pub fn is_any(&self) -> bool {
        matches!(self, TagConstraint::Any)
    }

    pub fn matches(&self, version: &Version) -> bool {
        match self {
            TagConstraint::Any => true,
            TagConstraint::Exact(wanted) => version == wanted,
            TagConstraint::Compare(op, bound) => match op {
                Comparator::Gt => version > bound,
                Comparator::Ge => version >= bound,
                Comparator::Lt => version < bound,
                Comparator::Le => version <= bound,
                Comparator::Eq => version == bound,
            },
        }
    }
}

impl FromStr for TagConstraint {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == WILDCARD || s.eq_ignore_ascii_case(LATEST) {
            return Ok(TagConstraint::Any);
        }
        // longest prefixes first
        let comparators = [
            Comparator::Ge,
            Comparator::Le,
            Comparator::Gt,
            Comparator::Lt,
            Comparator::Eq,
        ];
        let (op, rest) = comparators
            .iter()
            .find_map(|op| s.strip_prefix(op.as_str()).map(|rest| (Some(*op), rest)))
            .unwrap_or((None, s));
        let version = Version::parse(rest.trim())
            .ok_or_else(|| GatewayError::bad_request(format!("invalid version '{}'", s)))?;
        Ok(match op {
            Some(op) => TagConstraint::Compare(op, version),
            None => TagConstraint::Exact(version),
        })
    }
}

impl fmt::Display for TagConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagConstraint::Any => f.write_str(WILDCARD),
            TagConstraint::Exact(version) => write!(f, "{}", version),
            TagConstraint::Compare(op, version) => write!(f, "{}{}", op.as_str(), version),
        }
    }
}

/// Selection criteria for [`ReleaseIndex::filter`](crate::ReleaseIndex::filter).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReleaseQuery {
    pub channel: ChannelFilter,
    pub tag: TagConstraint,
    pub platform: Option<Platform>,
}

impl ReleaseQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(mut self, channel: ChannelFilter) -> Self {
        self.channel = channel;
        self
    }

    pub fn tag(mut self, tag: TagConstraint) -> Self {
        self.tag = tag;
        self
    }

    pub fn platform(mut self, platform: Option<Platform>) -> Self {
        self.platform = platform;
        self
    }

    pub fn matches(&self, release: &Release) -> bool {
        self.channel.matches(release)
            && self.tag.matches(release.version())
            && self
                .platform
                .as_ref()
                .map_or(true, |platform| release.has_platform(platform))
    }
}

impl fmt::Display for ReleaseQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel={} tag={}", self.channel, self.tag)?;
        if let Some(platform) = &self.platform {
            write!(f, " platform={}", platform)?;
        }
        Ok(())
    }
}
