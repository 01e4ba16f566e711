use crate::ChimeraError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Social platform a piece of content targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// X (formerly Twitter).
    X,
    /// LinkedIn.
    #[serde(rename = "linkedin")]
    LinkedIn,
}

impl Platform {
    /// Every supported platform.
    pub const ALL: [Platform; 2] = [Platform::X, Platform::LinkedIn];
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::X => write!(f, "x"),
            Platform::LinkedIn => write!(f, "linkedin"),
        }
    }
}

impl FromStr for Platform {
    type Err = ChimeraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "x" | "twitter" => Ok(Platform::X),
            "linkedin" => Ok(Platform::LinkedIn),
            other => Err(ChimeraError::Config(format!("Unknown platform: {other}"))),
        }
    }
}
