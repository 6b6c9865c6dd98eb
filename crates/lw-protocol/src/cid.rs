//! Connection identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::ProtocolError;

/// Prefix shared by every minted connection id
pub const CID_PREFIX: &str = "labwire-";

/// Separator between the class name and the unique suffix
pub const CID_SEPARATOR: char = '|';

/// Class name for handles to arbitrary registered objects
pub const CONNECTION_CLASS: &str = "Connection";

/// Class name for handles to widgets placed in the shell
pub const SHELL_CONNECTION_CLASS: &str = "ShellConnection";

/// Globally unique id of a registered GUI object
///
/// Format: `<prefix><ClassName><separator><uuid>`. The class name decides
/// which model type is created when a peer connects using only the id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Mint a fresh id for the given class
    pub fn new(class_name: &str) -> Self {
        Self(format!(
            "{}{}{}{}",
            CID_PREFIX,
            class_name,
            CID_SEPARATOR,
            Uuid::new_v4()
        ))
    }

    /// Parse and validate an id string
    pub fn parse(value: &str) -> Result<Self, ProtocolError> {
        let invalid = || ProtocolError::InvalidConnectionId(value.to_string());
        let rest = value.strip_prefix(CID_PREFIX).ok_or_else(invalid)?;
        let (class, suffix) = rest.split_once(CID_SEPARATOR).ok_or_else(invalid)?;
        if class.is_empty() || suffix.is_empty() {
            return Err(invalid());
        }
        Ok(Self(value.to_string()))
    }

    /// Check whether a string looks like a connection id
    pub fn is_cid(value: &str) -> bool {
        Self::parse(value).is_ok()
    }

    /// The class-name segment
    pub fn class_name(&self) -> &str {
        self.0[CID_PREFIX.len()..]
            .split(CID_SEPARATOR)
            .next()
            .unwrap_or_default()
    }

    /// Get the raw id string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ConnectionId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ConnectionId> for String {
    fn from(cid: ConnectionId) -> Self {
        cid.0
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cid_has_class_segment() {
        let cid = ConnectionId::new(SHELL_CONNECTION_CLASS);
        assert!(cid.as_str().starts_with("labwire-ShellConnection|"));
        assert_eq!(cid.class_name(), SHELL_CONNECTION_CLASS);
    }

    #[test]
    fn test_cids_are_unique() {
        assert_ne!(
            ConnectionId::new(CONNECTION_CLASS),
            ConnectionId::new(CONNECTION_CLASS)
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(ConnectionId::parse("Connection|123").is_err());
        assert!(ConnectionId::parse("labwire-Connection").is_err());
        assert!(ConnectionId::parse("labwire-|123").is_err());
        assert!(ConnectionId::parse("labwire-Connection|").is_err());
        assert!(ConnectionId::is_cid("labwire-Connection|123"));
    }

    #[test]
    fn test_serde_is_a_plain_string() {
        let cid = ConnectionId::parse("labwire-Connection|42").unwrap();
        let json = serde_json::to_string(&cid).unwrap();
        assert_eq!(json, r#""labwire-Connection|42""#);
        let back: ConnectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cid);
    }
}
