//! Records extracted from aircraft pages
//!
//! Each record kind has a validating factory (`Aircraft::new`,
//! `AircraftHistory::new`, `AircraftAlias::new`) that normalizes its fields and
//! returns a [`ValidationError`] instead of constructing an invalid value.
//! Invalid records are dropped by the extractor and counted; they never reach
//! the persistence queue.

mod aircraft;
mod alias;
mod history;

pub use aircraft::Aircraft;
pub use alias::AircraftAlias;
pub use history::{AircraftHistory, HistoryFields};

use thiserror::Error;

/// Why a record could not be constructed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("registration must not be empty")]
    EmptyRegistration,

    #[error("term start must not be empty for {registration}")]
    EmptyTermStart { registration: String },

    #[error("alias registration must not be empty for {base}")]
    EmptyAlias { base: String },

    #[error("alias must differ from its base registration: {registration}")]
    SelfAlias { registration: String },
}

/// One structured record bound for the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Aircraft(Aircraft),
    History(AircraftHistory),
    Alias(AircraftAlias),
}

impl Record {
    /// Short name of the record kind, used in logs and counters
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Aircraft(_) => "aircraft",
            Self::History(_) => "history",
            Self::Alias(_) => "alias",
        }
    }
}

impl From<Aircraft> for Record {
    fn from(value: Aircraft) -> Self {
        Self::Aircraft(value)
    }
}

impl From<AircraftHistory> for Record {
    fn from(value: AircraftHistory) -> Self {
        Self::History(value)
    }
}

impl From<AircraftAlias> for Record {
    fn from(value: AircraftAlias) -> Self {
        Self::Alias(value)
    }
}

/// Trims and uppercases a registration identifier, rejecting empty ones
pub fn normalize_registration(raw: &str) -> Result<String, ValidationError> {
    let reg = raw.trim().to_uppercase();
    if reg.is_empty() {
        return Err(ValidationError::EmptyRegistration);
    }
    Ok(reg)
}

/// Trims an optional text field; blank values become `None`
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
