use crate::shortcode::ShortCode;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Owner id used for records created without an authenticated user.
pub const ANONYMOUS_OWNER: &str = "";

/// A stored URL mapping.
///
/// Records are created once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlRecord {
    /// Unique short code of the record.
    pub code: ShortCode,
    /// The original URL that was shortened.
    pub original_url: String,
    /// Id of the user who created the record, empty for anonymous records.
    pub owner_id: String,
    /// When the record was first saved.
    pub created_at: Timestamp,
}

impl UrlRecord {
    pub fn new(code: ShortCode, original_url: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            code,
            original_url: original_url.into(),
            owner_id: owner_id.into(),
            created_at: Timestamp::now(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.owner_id == ANONYMOUS_OWNER
    }
}

/// Result of saving a URL.
///
/// A save of a `(url, owner)` pair that is already stored does not create a
/// second record; it returns the code issued the first time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A new record was persisted under this code.
    Created(ShortCode),
    /// The pair was already stored under this code.
    Existing(ShortCode),
}

impl SaveOutcome {
    pub fn code(&self) -> &ShortCode {
        match self {
            SaveOutcome::Created(code) | SaveOutcome::Existing(code) => code,
        }
    }

    pub fn into_code(self) -> ShortCode {
        match self {
            SaveOutcome::Created(code) | SaveOutcome::Existing(code) => code,
        }
    }

    /// Returns `true` if no new record was created.
    pub fn is_existing(&self) -> bool {
        matches!(self, SaveOutcome::Existing(_))
    }
}

/// One entry of a user's URL listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUrl {
    pub short_url: String,
    pub original_url: String,
}
