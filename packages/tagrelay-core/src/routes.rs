use hyper::Uri;
use std::fmt;
use urlencoding::encode;

use tagrelay_utils::{GatewayError, Platform, Result};

/// Absolute links back into the gateway's download routes.
///
/// Every path segment is percent-encoded, so tags or filenames containing
/// `/` or `..` cannot escape the route they are placed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTemplate {
    base: String,
}

impl RouteTemplate {
    /// `base_url` must be absolute (`scheme://host[:port][/prefix]`); query
    /// and fragment are dropped.
    pub fn new(base_url: &str) -> Result<Self> {
        let uri = base_url
            .trim()
            .parse::<Uri>()
            .map_err(|e| GatewayError::bad_request(format!("invalid base url '{}': {}", base_url, e)))?;
        let (scheme, authority) = match (uri.scheme_str(), uri.authority()) {
            (Some(scheme), Some(authority)) => (scheme, authority),
            _ => {
                return Err(GatewayError::bad_request(format!(
                    "base url '{}' is not absolute",
                    base_url
                )))
            }
        };
        let path = uri.path().trim_end_matches('/');
        Ok(RouteTemplate {
            base: format!("{}://{}{}", scheme, authority, path),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// `/download/version/<tag>/<platform>[?filetype=<filetype>]`
    pub fn download_version(&self, tag: &str, platform: &Platform, filetype: Option<&str>) -> String {
        let mut url = format!(
            "{}/download/version/{}/{}",
            self.base,
            encode(tag),
            platform.key()
        );
        if let Some(filetype) = filetype.filter(|f| !f.is_empty()) {
            url.push_str("?filetype=");
            url.push_str(&encode(filetype.trim_start_matches('.')));
        }
        url
    }

    /// `/download/version/<tag>`, the platform left to the client's user agent.
    pub fn download_release(&self, tag: &str) -> String {
        format!("{}/download/version/{}", self.base, encode(tag))
    }

    /// `/download/<tag>/<filename>`
    pub fn download_file(&self, tag: &str, filename: &str) -> String {
        format!("{}/download/{}/{}", self.base, encode(tag), encode(filename))
    }
}

impl fmt::Display for RouteTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagrelay_utils::{Arch, Os};

    #[test]
    fn test_base_url_normalized() {
        let routes = RouteTemplate::new("https://updates.example.com/").unwrap();
        assert_eq!(routes.base(), "https://updates.example.com");

        let routes = RouteTemplate::new("http://127.0.0.1:5000/app/?x=1").unwrap();
        assert_eq!(routes.base(), "http://127.0.0.1:5000/app");
    }

    #[test]
    fn test_relative_base_rejected() {
        assert!(matches!(
            RouteTemplate::new("/update/osx/1.0.0"),
            Err(GatewayError::BadRequest(_))
        ));
        assert!(RouteTemplate::new("not a url").is_err());
    }

    #[test]
    fn test_download_links() {
        let routes = RouteTemplate::new("https://updates.example.com").unwrap();
        let platform = Platform::new(Os::Osx, Arch::X64);
        assert_eq!(
            routes.download_version("v2.0.0", &platform, Some("zip")),
            "https://updates.example.com/download/version/v2.0.0/osx_64?filetype=zip"
        );
        assert_eq!(
            routes.download_version("v2.0.0", &platform, None),
            "https://updates.example.com/download/version/v2.0.0/osx_64"
        );
        assert_eq!(
            routes.download_file("1.2.0-beta.1", "App-1.2.0-full.nupkg"),
            "https://updates.example.com/download/1.2.0-beta.1/App-1.2.0-full.nupkg"
        );
        assert_eq!(
            routes.download_release("v1.0.0"),
            "https://updates.example.com/download/version/v1.0.0"
        );
    }

    #[test]
    fn test_segments_encoded() {
        let routes = RouteTemplate::new("https://updates.example.com").unwrap();
        assert_eq!(
            routes.download_file("1.0.0", "../../etc/passwd"),
            "https://updates.example.com/download/1.0.0/..%2F..%2Fetc%2Fpasswd"
        );
    }
}
