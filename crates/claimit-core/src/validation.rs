//! Client-side form validation
//!
//! Nothing here touches the store: a form that fails validation never
//! produces a write.

use thiserror::Error;

pub const MIN_CLAIM_REASON: usize = 10;
pub const MIN_CONTACT: usize = 5;
pub const MIN_ITEM_NAME: usize = 3;
pub const MIN_DESCRIPTION: usize = 10;
pub const MIN_LOCATION: usize = 3;

/// Guidance attached to one form field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{summary}")]
pub struct ValidationError {
    pub summary: String,
    pub fields: Vec<FieldError>,
}

impl ValidationError {
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            summary: message.clone(),
            fields: vec![FieldError { field, message }],
        }
    }

    pub fn for_field(&self, field: &str) -> Option<&FieldError> {
        self.fields.iter().find(|f| f.field == field)
    }
}

/// Collects field errors while a form is checked
#[derive(Debug, Default)]
pub(crate) struct Checker {
    fields: Vec<FieldError>,
}

impl Checker {
    pub(crate) fn min_len(&mut self, field: &'static str, value: &str, min: usize, message: &str) {
        if value.chars().count() < min {
            self.fail(field, message);
        }
    }

    pub(crate) fn fail(&mut self, field: &'static str, message: &str) {
        self.fields.push(FieldError {
            field,
            message: message.to_string(),
        });
    }

    /// Finish with `summary` as the headline, or with the first field
    /// message when `summary` is `None`.
    pub(crate) fn finish(self, summary: Option<&str>) -> Result<(), ValidationError> {
        let Some(first) = self.fields.first() else {
            return Ok(());
        };
        Err(ValidationError {
            summary: summary.map(str::to_string).unwrap_or_else(|| first.message.clone()),
            fields: self.fields,
        })
    }
}

/// Details a claimant gives to prove ownership
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimForm {
    pub reason: String,
    pub contact: String,
}

impl ClaimForm {
    pub fn new(reason: impl Into<String>, contact: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            contact: contact.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut checker = Checker::default();
        checker.min_len(
            "claimReason",
            &self.reason,
            MIN_CLAIM_REASON,
            "Please provide a detailed reason (at least 10 characters).",
        );
        checker.min_len(
            "contactInformation",
            &self.contact,
            MIN_CONTACT,
            "Please provide valid contact information (at least 5 characters).",
        );
        checker.finish(None)
    }
}

/// Administrator reasons only need to say something
pub fn validate_admin_reason(reason: &str) -> Result<&str, ValidationError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::single(
            "adminReason",
            "Please give a reason for this decision.",
        ));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_reason_boundary() {
        let short = ClaimForm::new("123456789", "12345");
        let err = short.validate().unwrap_err();
        assert_eq!(err.fields.len(), 1);
        assert!(err.for_field("claimReason").is_some());
        assert!(err.summary.contains("at least 10 characters"));

        assert!(ClaimForm::new("1234567890", "12345").validate().is_ok());
    }

    #[test]
    fn test_contact_boundary() {
        let err = ClaimForm::new("1234567890", "1234").validate().unwrap_err();
        assert!(err.for_field("contactInformation").is_some());
        assert!(err.for_field("claimReason").is_none());
    }

    #[test]
    fn test_both_fields_reported_with_reason_first() {
        let err = ClaimForm::new("short", "x").validate().unwrap_err();
        assert_eq!(err.fields.len(), 2);
        assert_eq!(err.fields[0].field, "claimReason");
        assert_eq!(err.summary, err.fields[0].message);
    }

    #[test]
    fn test_lengths_count_characters_not_bytes() {
        assert!(ClaimForm::new("ééééééééé", "12345").validate().is_err());
        assert!(ClaimForm::new("éééééééééé", "12345").validate().is_ok());
    }

    #[test]
    fn test_admin_reason_must_not_be_blank() {
        assert!(validate_admin_reason("   ").is_err());
        assert_eq!(validate_admin_reason(" ID matched ").unwrap(), "ID matched");
    }
}
