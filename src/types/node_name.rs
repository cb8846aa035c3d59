// ABOUTME: Validated node name, usable both as container name and hostname.
// ABOUTME: Enforces the engine's container-name alphabet and the hostname length cap.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Hostnames are limited to a single DNS label.
const MAX_LEN: usize = 63;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeNameError {
    #[error("node name cannot be empty")]
    Empty,

    #[error("node name exceeds maximum length of {MAX_LEN} characters")]
    TooLong,

    #[error("node name must start with a letter or digit")]
    BadFirstChar,

    #[error("invalid character in node name: '{0}'")]
    InvalidChar(char),
}

/// Name of a cluster node.
///
/// The same string is used as the container name and as the container's
/// hostname, so it has to satisfy both: `[a-zA-Z0-9][a-zA-Z0-9_.-]*`, at most
/// 63 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeName(String);

impl NodeName {
    pub fn new(value: &str) -> Result<Self, NodeNameError> {
        let mut chars = value.chars();
        let first = chars.next().ok_or(NodeNameError::Empty)?;

        if value.len() > MAX_LEN {
            return Err(NodeNameError::TooLong);
        }

        if !first.is_ascii_alphanumeric() {
            return Err(NodeNameError::BadFirstChar);
        }

        if let Some(c) = chars.find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(NodeNameError::InvalidChar(c));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for NodeName {
    type Err = NodeNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for NodeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
