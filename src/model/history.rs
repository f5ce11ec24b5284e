use crate::model::{non_blank, normalize_registration, ValidationError};

/// One operating period: a registration flown by one operator from one start
///
/// Unique on `(registration, operator_slug, term_start)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AircraftHistory {
    pub registration: String,

    /// Operator identifier taken from the operator URL (e.g. "starflyer")
    pub operator_slug: String,

    /// Operator display name as shown on the page
    pub operator_name: String,

    /// Model designation (e.g. "A320neo")
    pub model: String,

    /// Free-text operating status
    pub status: String,

    /// Start of the period as printed on the site (e.g. "2025/12")
    pub term_start: String,

    /// End of the period; `None` while the period is ongoing
    pub term_end: Option<String>,
}

/// Unvalidated history fields as read from a page
#[derive(Debug, Clone, Default)]
pub struct HistoryFields<'a> {
    pub operator_slug: &'a str,
    pub operator_name: &'a str,
    pub model: &'a str,
    pub status: &'a str,
    pub term_start: &'a str,
    pub term_end: Option<&'a str>,
}

impl AircraftHistory {
    pub fn new(registration: &str, fields: HistoryFields<'_>) -> Result<Self, ValidationError> {
        let registration = normalize_registration(registration)?;

        let term_start = fields.term_start.trim();
        if term_start.is_empty() {
            return Err(ValidationError::EmptyTermStart { registration });
        }

        Ok(Self {
            operator_slug: fields.operator_slug.trim().to_string(),
            operator_name: fields.operator_name.trim().to_string(),
            model: fields.model.trim().to_string(),
            status: fields.status.trim().to_string(),
            term_start: term_start.to_string(),
            term_end: non_blank(fields.term_end),
            registration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields<'a>(term_start: &'a str, term_end: Option<&'a str>) -> HistoryFields<'a> {
        HistoryFields {
            operator_slug: " starflyer ",
            operator_name: "SFJ",
            model: "A320neo",
            status: "運用中",
            term_start,
            term_end,
        }
    }

    #[test]
    fn test_builds_history() {
        let history = AircraftHistory::new("ja31mc", fields(" 2025/12 ", None)).unwrap();
        assert_eq!(history.registration, "JA31MC");
        assert_eq!(history.operator_slug, "starflyer");
        assert_eq!(history.term_start, "2025/12");
        assert_eq!(history.term_end, None);
    }

    #[test]
    fn test_blank_term_end_is_ongoing() {
        let history = AircraftHistory::new("JA31MC", fields("2020/01", Some(" "))).unwrap();
        assert_eq!(history.term_end, None);
    }

    #[test]
    fn test_empty_term_start_rejected() {
        let err = AircraftHistory::new("JA31MC", fields("  ", None)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::EmptyTermStart {
                registration: "JA31MC".to_string()
            }
        );
    }

    #[test]
    fn test_empty_registration_rejected() {
        let err = AircraftHistory::new("", fields("2020/01", None)).unwrap_err();
        assert_eq!(err, ValidationError::EmptyRegistration);
    }
}
