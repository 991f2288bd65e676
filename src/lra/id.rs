//! LRA and participant identifiers
//!
//! Root LRA ids are a UUID v4 in simple (hex) form. A nested LRA id embeds
//! its parent id: `<parent-id>.<uuid>`, so the ancestry of any LRA can be
//! recovered from the id alone.
//!
//! Ids name store files, so they are capped at `MAX_LRA_ID_LEN` bytes. With
//! 32-character segments that allows nesting `MAX_NESTING_DEPTH` deep.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::LraError;

/// Separator between a parent id and the child segment of a nested id
const NESTING_SEPARATOR: char = '.';

/// Longest accepted id, well under common 255-byte file name limits
pub const MAX_LRA_ID_LEN: usize = 200;

/// Deepest nesting a generated id can reach within `MAX_LRA_ID_LEN`
pub const MAX_NESTING_DEPTH: usize = 5;

/// Globally unique LRA identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LraId(String);

impl LraId {
    /// Generate a new top-level id
    pub fn new_root() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Generate a new id nested under `parent`
    pub fn nested(parent: &LraId) -> Result<Self, LraError> {
        if parent.depth() >= MAX_NESTING_DEPTH {
            return Err(LraError::InvalidRequest(format!(
                "LRA {} is nested {} deep; no further nesting allowed",
                parent,
                parent.depth()
            )));
        }
        let id = format!("{}{}{}", parent.0, NESTING_SEPARATOR, Uuid::new_v4().simple());
        if id.len() > MAX_LRA_ID_LEN {
            return Err(LraError::InvalidRequest(format!(
                "nested id under {} would exceed {} bytes",
                parent, MAX_LRA_ID_LEN
            )));
        }
        Ok(Self(id))
    }

    /// The enclosing LRA, if this id is nested
    pub fn parent(&self) -> Option<LraId> {
        self.0
            .rsplit_once(NESTING_SEPARATOR)
            .map(|(parent, _)| LraId(parent.to_string()))
    }

    /// Nesting depth (0 for a top-level LRA)
    pub fn depth(&self) -> usize {
        self.0.matches(NESTING_SEPARATOR).count()
    }

    /// Returns the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LraId {
    type Err = LraError;

    /// Parse an id received from a caller.
    ///
    /// Ids are used as store keys, so anything outside `[0-9A-Za-z_.-]` is
    /// rejected, as are empty segments.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(LraError::InvalidRequest("LRA id must not be empty".into()));
        }
        if s.len() > MAX_LRA_ID_LEN {
            return Err(LraError::InvalidRequest(format!(
                "LRA id is {} bytes, longer than {}",
                s.len(),
                MAX_LRA_ID_LEN
            )));
        }
        if s.split(NESTING_SEPARATOR).any(|segment| segment.is_empty()) {
            return Err(LraError::InvalidRequest(format!(
                "LRA id '{}' has an empty segment",
                s
            )));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == NESTING_SEPARATOR)
        {
            return Err(LraError::InvalidRequest(format!(
                "LRA id '{}' contains invalid characters",
                s
            )));
        }
        Ok(Self(s.to_string()))
    }
}

/// Participant identifier, unique within its LRA
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Generate a new participant id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
