use crate::model::{normalize_registration, ValidationError};

/// "The aircraft registered as `base` is, or was, also registered as `alias`"
///
/// Stored directed: `(A, B)` and `(B, A)` are distinct rows. A registration is
/// never its own alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AircraftAlias {
    pub base_registration: String,
    pub alias_registration: String,
}

impl AircraftAlias {
    pub fn new(base: &str, alias: &str) -> Result<Self, ValidationError> {
        let base_registration = normalize_registration(base)?;
        let alias_registration = normalize_registration(alias).map_err(|_| {
            ValidationError::EmptyAlias {
                base: base_registration.clone(),
            }
        })?;

        if base_registration == alias_registration {
            return Err(ValidationError::SelfAlias {
                registration: base_registration,
            });
        }

        Ok(Self {
            base_registration,
            alias_registration,
        })
    }
}
