//! Resolves the forge authentication token: environment variable first,
//! falling back to a small JSON credential file under the config
//! directory.

use serde::Deserialize;
use tracing::{debug, warn};

const ENV_VAR: &str = "MY_UNICORN_TOKEN";

#[derive(Debug, Deserialize)]
struct Credentials {
    token: Option<String>,
}

/// Path to the credential file (`<config_dir>/credentials.json`).
pub fn credential_file_path() -> std::path::PathBuf {
    crate::DIRS.config_dir().join("credentials.json")
}

/// Resolves the forge token: `MY_UNICORN_TOKEN` if set, else the `token`
/// field of the credential file, else `None` (unauthenticated requests).
pub fn resolve_token() -> Option<String> {
    if let Ok(token) = std::env::var(ENV_VAR) {
        if !token.is_empty() {
            return Some(token);
        }
    }

    read_credential_file()
}

fn read_credential_file() -> Option<String> {
    let path = credential_file_path();
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(?path, error = %e, "failed to read credential file");
            return None;
        }
    };

    match serde_json::from_str::<Credentials>(&text) {
        Ok(creds) => {
            if creds.token.is_some() {
                debug!(?path, "resolved forge token from credential file");
            }
            creds.token.filter(|t| !t.is_empty())
        }
        Err(e) => {
            warn!(?path, error = %e, "credential file is not valid JSON");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_token_field() {
        let creds: Credentials = serde_json::from_str(r#"{"token": "abc123"}"#).unwrap();
        assert_eq!(creds.token.as_deref(), Some("abc123"));
    }

    #[test]
    fn tolerates_missing_token_field() {
        let creds: Credentials = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(creds.token, None);
    }
}
