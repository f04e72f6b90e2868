//! Session configuration

use url::Url;

use posesync_core::{PoseConfig, PoseError, PoseResult};

/// Everything needed to open a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// WebSocket endpoint, `ws://` or `wss://`
    pub endpoint: String,
    /// Pipeline tunables
    pub pose: PoseConfig,
}

impl SessionConfig {
    /// Default pipeline settings for `endpoint`
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            pose: PoseConfig::default(),
        }
    }

    pub fn with_pose(mut self, pose: PoseConfig) -> Self {
        self.pose = pose;
        self
    }

    /// Validate the endpoint and the pipeline settings
    pub fn validate(&self) -> PoseResult<()> {
        parse_endpoint(&self.endpoint)?;
        self.pose.validate()
    }
}

/// Parse a WebSocket endpoint
pub fn parse_endpoint(endpoint: &str) -> PoseResult<Url> {
    let invalid = |reason: String| PoseError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };

    let url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => return Err(invalid(format!("unsupported scheme {:?}", other))),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".into()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_ws_and_wss() {
        assert!(parse_endpoint("ws://127.0.0.1:8765").is_ok());
        assert!(parse_endpoint("wss://pose.example.com/stream").is_ok());
    }

    #[test]
    fn test_rejects_other_schemes() {
        let err = parse_endpoint("http://127.0.0.1:8765").unwrap_err();
        assert!(matches!(err, PoseError::InvalidEndpoint { .. }));
        assert!(parse_endpoint("not a url").is_err());
    }

    #[test]
    fn test_validate_checks_pose_config() {
        let mut config = SessionConfig::new("ws://localhost:8765");
        assert!(config.validate().is_ok());

        config.pose.frame_buffer_cap = 0;
        assert!(config.validate().is_err());
    }
}
