//! Document type and entry identifier parsing and validation
//!
//! Both identifiers travel through every persisted file (checkpoint keys,
//! ledger sets, item cache keys), so they are validated once at the edge and
//! carried as newtypes afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote document type (e.g. `bill`, `motion`, `committee`)
///
/// Normalized to lowercase. Only ASCII alphanumerics, `-` and `_` are
/// accepted so the value is safe as a JSON key, URL path segment, and file
/// name component.
///
/// # Examples
///
/// ```
/// use index_harvester::identifier::DocumentType;
///
/// let t = DocumentType::parse(" Bill ").unwrap();
/// assert_eq!(t.as_str(), "bill");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentType(String);

impl DocumentType {
    /// Parse a document type string
    ///
    /// # Errors
    ///
    /// Returns an error if the value is empty or contains characters outside
    /// `[a-z0-9_-]` after normalization.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        let normalized = s.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(IdentifierError::InvalidFormat(
                "document type cannot be empty".to_string(),
            ));
        }

        if let Some(bad) = normalized
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(IdentifierError::InvalidFormat(format!(
                "document type '{normalized}' contains invalid character '{bad}'"
            )));
        }

        Ok(Self(normalized))
    }

    /// Get the normalized type name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocumentType {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DocumentType> for String {
    fn from(value: DocumentType) -> Self {
        value.0
    }
}

impl std::str::FromStr for DocumentType {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Identifier of one index entry (e.g. `20.3041`, `BILL-2023-0042`)
///
/// Kept verbatim apart from surrounding whitespace; ids are compared
/// byte-for-byte across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntryId(String);

impl EntryId {
    /// Parse an entry id
    ///
    /// # Errors
    ///
    /// Returns an error if the id is empty or contains whitespace or control
    /// characters.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(IdentifierError::InvalidFormat(
                "entry id cannot be empty".to_string(),
            ));
        }
        if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(IdentifierError::InvalidFormat(format!(
                "entry id '{trimmed}' contains whitespace or control characters"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric suffix of the id, used as the entry's position in the remote
    /// listing
    ///
    /// Returns `None` when the id does not end in a digit.
    ///
    /// # Examples
    ///
    /// ```
    /// use index_harvester::identifier::EntryId;
    ///
    /// assert_eq!(EntryId::parse("BILL-2023-0042").unwrap().ordinal(), Some(42));
    /// assert_eq!(EntryId::parse("20.3041").unwrap().ordinal(), Some(3041));
    /// assert_eq!(EntryId::parse("draft").unwrap().ordinal(), None);
    /// ```
    pub fn ordinal(&self) -> Option<u64> {
        let digits_start = self
            .0
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(idx, _)| idx)?;
        self.0[digits_start..].parse().ok()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EntryId {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EntryId> for String {
    fn from(value: EntryId) -> Self {
        value.0
    }
}

impl std::borrow::Borrow<str> for EntryId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur during identifier parsing
#[derive(Debug, thiserror::Error)]
pub enum IdentifierError {
    /// Invalid identifier format
    #[error("identifier error: {0}")]
    InvalidFormat(String),
}
