//! Operating mode of the helper.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// How the helper answers `Check` calls. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Mint a JWT-SVID and attach it to requests without credentials.
    Injection,
    /// Validate the JWT-SVID presented as a bearer token.
    Validation,
}

impl Mode {
    /// Canonical configuration name of the mode.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Injection => "jwt_injection",
            Self::Validation => "jwt_svid_validator",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned for any mode name other than the two recognized ones.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown mode {0:?}: must be one of: jwt_injection, jwt_svid_validator")]
pub struct ParseModeError(pub String);

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jwt_injection" => Ok(Self::Injection),
            "jwt_svid_validator" => Ok(Self::Validation),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}
