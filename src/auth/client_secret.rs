//! OAuth client descriptor (`credentials.json` downloaded from the Google
//! Cloud console).

use std::fmt;
use std::path::Path;

use serde::Deserialize;

use super::token::GOOGLE_TOKEN_URI;
use crate::error::AuthError;

pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Client identity used by the consent flow.
#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("client_id", &self.client_id)
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientConfig>,
    web: Option<ClientConfig>,
}

/// Read and parse the client descriptor. A missing file is reported as
/// [`AuthError::ClientSecretMissing`].
pub async fn load_client_config(path: &Path) -> Result<ClientConfig, AuthError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AuthError::ClientSecretMissing(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    parse_client_config(path, &raw)
}

pub fn parse_client_config(path: &Path, raw: &str) -> Result<ClientConfig, AuthError> {
    let invalid = |reason: String| AuthError::InvalidClientSecret {
        path: path.to_path_buf(),
        reason,
    };

    let file: ClientSecretFile = serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))?;
    let client = file
        .installed
        .or(file.web)
        .ok_or_else(|| invalid("expected an 'installed' or 'web' client".to_string()))?;

    if client.client_id.trim().is_empty() {
        return Err(invalid("client_id is empty".to_string()));
    }
    Ok(client)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn path() -> PathBuf {
        PathBuf::from("credentials.json")
    }

    #[test]
    fn parses_installed_client() {
        let raw = r#"{"installed":{
            "client_id":"123.apps.googleusercontent.com",
            "project_id":"keepa",
            "auth_uri":"https://accounts.google.com/o/oauth2/auth",
            "token_uri":"https://oauth2.googleapis.com/token",
            "client_secret":"GOCSPX-abc",
            "redirect_uris":["http://localhost"]
        }}"#;
        let client = parse_client_config(&path(), raw).unwrap();
        assert_eq!(client.client_id, "123.apps.googleusercontent.com");
        assert_eq!(client.client_secret, "GOCSPX-abc");
    }

    #[test]
    fn parses_web_client_with_default_uris() {
        let raw = r#"{"web":{"client_id":"abc","client_secret":"s"}}"#;
        let client = parse_client_config(&path(), raw).unwrap();
        assert_eq!(client.auth_uri, GOOGLE_AUTH_URI);
        assert_eq!(client.token_uri, GOOGLE_TOKEN_URI);
    }

    #[test]
    fn rejects_unknown_client_kind() {
        let err = parse_client_config(&path(), r#"{"service_account":{}}"#).unwrap_err();
        assert!(matches!(err, AuthError::InvalidClientSecret { .. }));
    }

    #[test]
    fn debug_hides_secret() {
        let client = parse_client_config(
            &path(),
            r#"{"installed":{"client_id":"abc","client_secret":"GOCSPX-hidden"}}"#,
        )
        .unwrap();
        assert!(!format!("{client:?}").contains("GOCSPX-hidden"));
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("credentials.json");
        let err = load_client_config(&missing).await.unwrap_err();
        assert!(matches!(err, AuthError::ClientSecretMissing(p) if p == missing));
    }
}
