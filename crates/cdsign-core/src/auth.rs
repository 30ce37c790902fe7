//! Token authentication for registries and remote signing backends.

use crate::error::RegistryResult;

/// Token provider for bearer authentication.
#[derive(Debug, Clone)]
pub enum TokenProvider {
    /// Static token (from config or env).
    Static(String),

    /// No authentication.
    None,
}

impl TokenProvider {
    /// Create a static token provider.
    pub fn static_token(token: impl Into<String>) -> Self {
        Self::Static(token.into())
    }

    /// Create from the `CDSIGN_REGISTRY_TOKEN` environment variable, falling
    /// back to no auth.
    pub fn from_env() -> Self {
        match std::env::var("CDSIGN_REGISTRY_TOKEN") {
            Ok(token) if !token.is_empty() => Self::Static(token),
            _ => Self::None,
        }
    }

    /// Get the current token.
    pub async fn get_token(&self) -> RegistryResult<Option<String>> {
        match self {
            Self::Static(token) => Ok(Some(token.clone())),
            Self::None => Ok(None),
        }
    }

    /// Check if authentication is configured.
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl Default for TokenProvider {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[tokio::test]
    async fn test_static_token() {
        let provider = TokenProvider::static_token("abc");
        assert!(provider.is_authenticated());
        assert_eq!(provider.get_token().await.unwrap(), Some("abc".to_string()));
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_empty_token() {
        std::env::set_var("CDSIGN_REGISTRY_TOKEN", "");
        assert!(!TokenProvider::from_env().is_authenticated());
        std::env::remove_var("CDSIGN_REGISTRY_TOKEN");
    }
}
