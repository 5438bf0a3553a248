//! HTTP Basic credentials.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{ProtocolError, ProtocolResult};

/// Username and password for Basic authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Value for an `Authorization` header.
    pub fn header_value(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.user, self.password));
        format!("Basic {token}")
    }

    /// Parse an `Authorization` header value.
    pub fn from_header(value: &str) -> ProtocolResult<Self> {
        let value = value.trim();
        let token = value
            .strip_prefix("Basic ")
            .or_else(|| value.strip_prefix("basic "))
            .ok_or_else(|| ProtocolError::InvalidAuthorization("not Basic".to_string()))?;
        let decoded = STANDARD
            .decode(token.trim())
            .map_err(|e| ProtocolError::InvalidAuthorization(e.to_string()))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| ProtocolError::InvalidAuthorization("not UTF-8".to_string()))?;
        let (user, password) = decoded
            .split_once(':')
            .ok_or_else(|| ProtocolError::InvalidAuthorization("missing ':'".to_string()))?;
        Ok(Self::new(user, password))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let creds = Credentials::new("anon", "password");
        assert_eq!(creds.header_value(), "Basic YW5vbjpwYXNzd29yZA==");
        assert_eq!(Credentials::from_header(&creds.header_value()).unwrap(), creds);
    }

    #[test]
    fn password_may_contain_colon() {
        let creds = Credentials::new("user", "pa:ss");
        let parsed = Credentials::from_header(&creds.header_value()).unwrap();
        assert_eq!(parsed.password, "pa:ss");
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(Credentials::from_header("Bearer abc").is_err());
        assert!(Credentials::from_header("Basic !!!").is_err());
    }

    #[test]
    fn debug_redacts_password() {
        let debug = format!("{:?}", Credentials::new("u", "secret"));
        assert!(!debug.contains("secret"));
    }
}
