//! Backend endpoint configuration, read once at startup.

const URL_VAR: &str = "PAINTER_BACKEND_URL";
const TOKEN_VAR: &str = "PAINTER_BACKEND_TOKEN";

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    MissingVar(&'static str),
}

/// Base URL and bearer token for the mask backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub token: String,
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            token: token.into(),
        }
    }

    /// Read the backend endpoint from the environment. The token may be
    /// empty (unauthenticated local backends), the URL may not.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var(URL_VAR).map_err(|_| ConfigError::MissingVar(URL_VAR))?;
        let token = std::env::var(TOKEN_VAR).unwrap_or_default();
        if token.is_empty() {
            log::warn!("{TOKEN_VAR} not set, sending unauthenticated requests");
        }
        Ok(Self::new(base_url, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slashes() {
        let config = BackendConfig::new("http://localhost:8000//", "tok");
        assert_eq!(config.base_url, "http://localhost:8000");
    }
}
