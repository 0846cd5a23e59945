/// Convenient result alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Failure outcomes of release resolution, asset selection and manifest
/// transcoding.
///
/// "You are already up to date" is not represented here; it is a successful
/// outcome of the update check.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The release source could not be reached, timed out or answered garbage.
    #[error("release source unavailable: {0}")]
    SourceUnavailable(String),
    /// No release satisfies the query.
    #[error("not found: {0}")]
    NotFound(String),
    /// A release matched but carries no usable asset.
    #[error("asset not found: {0}")]
    AssetNotFound(String),
    /// A release matched but ships no delta-update manifest.
    #[error("manifest not found: {0}")]
    ManifestNotFound(String),
    /// Manifest content fetched from the source does not follow the line grammar.
    #[error("malformed manifest at line {line}: {reason}")]
    MalformedManifest { line: usize, reason: String },
    /// A required client parameter is missing or unreadable.
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl GatewayError {
    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        GatewayError::SourceUnavailable(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        GatewayError::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        GatewayError::BadRequest(msg.into())
    }

    /// `true` for "nothing matched" outcomes, which a caller may retry with a
    /// wider query.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GatewayError::NotFound(_)
                | GatewayError::AssetNotFound(_)
                | GatewayError::ManifestNotFound(_)
        )
    }

    /// HTTP status the request layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::BadRequest(_) => 400,
            GatewayError::NotFound(_)
            | GatewayError::AssetNotFound(_)
            | GatewayError::ManifestNotFound(_) => 404,
            GatewayError::MalformedManifest { .. } => 502,
            GatewayError::SourceUnavailable(_) => 503,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(GatewayError::bad_request("x").status_code(), 400);
        assert_eq!(GatewayError::not_found("x").status_code(), 404);
        assert_eq!(GatewayError::AssetNotFound("x".into()).status_code(), 404);
        assert_eq!(
            GatewayError::MalformedManifest {
                line: 1,
                reason: "x".into()
            }
            .status_code(),
            502
        );
        assert_eq!(GatewayError::source_unavailable("x").status_code(), 503);
    }

    #[test]
    fn test_not_found_family() {
        assert!(GatewayError::not_found("x").is_not_found());
        assert!(GatewayError::ManifestNotFound("x".into()).is_not_found());
        assert!(!GatewayError::source_unavailable("x").is_not_found());
        assert!(!GatewayError::bad_request("x").is_not_found());
    }
}
