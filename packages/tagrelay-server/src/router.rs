use urlencoding::decode;

/// Manifest filename Squirrel.Windows appends to its update URL.
const RELEASES_SEGMENT: &str = "RELEASES";
const FEED_SUFFIX: &str = ".atom";

/// One gateway endpoint with its path parameters, percent-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `/`, `/download/:platform?`, `/download/channel/:channel/:platform?`,
    /// `/download/version/:tag/:platform?`
    Download {
        channel: Option<String>,
        tag: Option<String>,
        platform: Option<String>,
    },
    /// `/download/:tag/:filename`
    DownloadFile { tag: String, filename: String },
    /// `/update?platform=&version=`
    UpdateRedirect,
    /// `/update/:platform/:version`, `/update/channel/:channel/:platform/:version`
    Update {
        channel: Option<String>,
        platform: String,
        version: String,
    },
    /// The two update routes above with a trailing `/RELEASES`.
    UpdateManifest {
        channel: Option<String>,
        platform: String,
        version: String,
    },
    /// `/notes/:version?`
    Notes { version: Option<String> },
    /// `/feed/channel/:channel.atom`
    Feed { channel: String },
    /// `/versions`
    Versions,
    /// `/ping`, `/health`
    Ping,
}

impl Route {
    /// Route for a request path, or `None` when no endpoint matches.
    pub fn parse(path: &str) -> Option<Route> {
        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| decode(s).map(|s| s.into_owned()))
            .collect::<Result<Vec<String>, _>>()
            .ok()?;
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        fn owned(s: &str) -> String {
            s.to_string()
        }

        let route = match segments.as_slice() {
            [] | ["download"] => Route::Download {
                channel: None,
                tag: None,
                platform: None,
            },
            ["ping"] | ["health"] => Route::Ping,
            ["versions"] => Route::Versions,

            ["download", "channel", channel, rest @ ..] if rest.len() <= 1 => Route::Download {
                channel: Some(owned(channel)),
                tag: None,
                platform: rest.first().map(|p| owned(p)),
            },
            ["download", "version", tag, rest @ ..] if rest.len() <= 1 => Route::Download {
                channel: None,
                tag: Some(owned(tag)),
                platform: rest.first().map(|p| owned(p)),
            },
            ["download", tag, filename] => Route::DownloadFile {
                tag: owned(tag),
                filename: owned(filename),
            },
            ["download", platform] => Route::Download {
                channel: None,
                tag: None,
                platform: Some(owned(platform)),
            },

            ["update"] => Route::UpdateRedirect,
            ["update", "channel", channel, platform, version, RELEASES_SEGMENT] => {
                Route::UpdateManifest {
                    channel: Some(owned(channel)),
                    platform: owned(platform),
                    version: owned(version),
                }
            }
            ["update", "channel", channel, platform, version] => Route::Update {
                channel: Some(owned(channel)),
                platform: owned(platform),
                version: owned(version),
            },
            ["update", platform, version, RELEASES_SEGMENT] => Route::UpdateManifest {
                channel: None,
                platform: owned(platform),
                version: owned(version),
            },
            ["update", platform, version] => Route::Update {
                channel: None,
                platform: owned(platform),
                version: owned(version),
            },

            ["notes"] => Route::Notes { version: None },
            ["notes", version] => Route::Notes {
                version: Some(owned(version)),
            },
            ["feed", "channel", file] => Route::Feed {
                channel: owned(file.strip_suffix(FEED_SUFFIX)?),
            },
            _ => return None,
        };
        Some(route)
    }
}

/// Value of `key` in a raw query string, percent-decoded.
pub fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(k, _)| *k == key)
        .and_then(|(_, v)| decode(&v.replace('+', " ")).ok().map(|v| v.into_owned()))
        .filter(|v| !v.is_empty())
}
