use crate::model::{non_blank, normalize_registration, ValidationError};

/// Aircraft master record, keyed by its registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aircraft {
    /// Uppercase, trimmed, non-empty registration (primary key)
    pub registration: String,

    /// Manufacturer serial number
    pub serial_number: Option<String>,

    /// ICAO 24-bit transponder address, uppercase hex
    pub hex_code: Option<String>,
}

impl Aircraft {
    pub fn new(
        registration: &str,
        serial_number: Option<&str>,
        hex_code: Option<&str>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            registration: normalize_registration(registration)?,
            serial_number: non_blank(serial_number),
            hex_code: non_blank(hex_code).map(|h| h.to_uppercase()),
        })
    }
}
