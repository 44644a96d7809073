//! Administrative level definitions
//!
//! The hierarchy is fixed at five levels. Each level's listing page only ever
//! links to the next level down, which bounds recursion depth.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One tier of the administrative hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Province,
    City,
    County,
    Town,
    Village,
}

impl Level {
    /// Returns the level listed on a page linked from a node of this level
    ///
    /// Villages are always leaves, so they have no next level.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Province => Some(Self::City),
            Self::City => Some(Self::County),
            Self::County => Some(Self::Town),
            Self::Town => Some(Self::Village),
            Self::Village => None,
        }
    }

    /// Key under which a parent stores a list of nodes of this level
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Province => "provinces",
            Self::City => "cities",
            Self::County => "counties",
            Self::Town => "towns",
            Self::Village => "villages",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Province => "province",
            Self::City => "city",
            Self::County => "county",
            Self::Town => "town",
            Self::Village => "village",
        }
    }

    /// Parses a level name as used in configuration files
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "province" => Some(Self::Province),
            "city" => Some(Self::City),
            "county" => Some(Self::County),
            "town" => Some(Self::Town),
            "village" => Some(Self::Village),
            _ => None,
        }
    }

    pub fn all() -> [Self; 5] {
        [
            Self::Province,
            Self::City,
            Self::County,
            Self::Town,
            Self::Village,
        ]
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
