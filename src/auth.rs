//! Credential source for the orchestration API
//!
//! The installer persists its agent auth token inside a shared JSON state
//! blob on disk. The token appears partway through bootstrap and can be
//! rewritten at any time, so every API call re-reads the file instead of
//! caching a value that may have gone stale.

use serde_json::Value;
use std::path::PathBuf;

/// The state-blob key the installer stores its auth config under
const AUTH_CONFIG_KEY: &str = "*gencrypto.AuthConfig";
const TOKEN_FIELD: &str = "UserAuthToken";

/// Stateless reader of the shared install-state credential.
///
/// Absence is a normal early-bootstrap condition, not an error: the state
/// file does not exist until the installer has generated it.
#[derive(Debug, Clone)]
pub struct TokenSource {
    state_file: PathBuf,
}

impl TokenSource {
    pub fn new(state_file: PathBuf) -> Self {
        Self { state_file }
    }

    /// Read the current auth token.
    ///
    /// # Returns
    /// * `Some(token)` - a non-empty token is present in the state store
    /// * `None` - the file is missing, unreadable, unparsable, or the
    ///   token field is absent or empty
    pub fn read(&self) -> Option<String> {
        let raw = std::fs::read_to_string(&self.state_file).ok()?;
        let state: Value = serde_json::from_str(&raw).ok()?;

        let token = state.get(AUTH_CONFIG_KEY)?.get(TOKEN_FIELD)?.as_str()?;

        if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        }
    }
}
