//! Coarse client capabilities from a `User-Agent` header.

use tagrelay_utils::{OsFamily, Platform};

/// OS family and word size advertised by a user agent, or `None` when the
/// agent names no supported desktop OS.
pub fn capabilities(user_agent: &str) -> Option<(OsFamily, bool)> {
    let ua = user_agent.to_lowercase();
    let family = if ua.contains("macintosh") || ua.contains("mac os x") || ua.contains("darwin") {
        OsFamily::Mac
    } else if ua.contains("windows") {
        OsFamily::Windows
    } else if ua.contains("linux") && !ua.contains("android") {
        OsFamily::Linux
    } else {
        return None;
    };
    let is_64_bit = match family {
        // every supported macOS build is 64-bit
        OsFamily::Mac => true,
        _ => ["x86_64", "x64", "win64", "wow64", "amd64", "aarch64", "arm64"]
            .iter()
            .any(|hint| ua.contains(hint)),
    };
    Some((family, is_64_bit))
}

pub fn detect_platform(user_agent: &str) -> Option<Platform> {
    capabilities(user_agent).map(|(family, is_64_bit)| Platform::from_capabilities(family, is_64_bit))
}
