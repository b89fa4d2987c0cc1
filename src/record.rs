//! Customer record model and field-set validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FieldError;

/// Opaque persisted identifier of a customer record.
///
/// Assigned by the repository on the first successful create (UUID v7, so
/// ids sort by creation time). Serialized as a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wrap an identifier received from the UI.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The field set the UI submits for create and update.
///
/// Every field is plain text as typed into the form. Missing fields
/// deserialize to empty strings so partially-filled forms decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomerFields {
    /// Customer name.
    pub name: String,
    /// National tax identifier, the natural key.
    pub tax_id: String,
    /// Email address.
    pub email: String,
    /// Phone number.
    pub phone: String,
    /// Postal code.
    pub postal_code: String,
    /// Street name.
    pub street: String,
    /// Street number.
    pub number: String,
    /// Address complement (apartment, block).
    pub complement: String,
    /// Neighborhood.
    pub neighborhood: String,
    /// City.
    pub city: String,
    /// Two-letter state code.
    pub state_code: String,
}

impl CustomerFields {
    /// Validate and normalize the field set.
    ///
    /// Trims every field and upper-cases the state code. Rules:
    ///
    /// - `name` and `tax_id` are required.
    /// - `tax_id` contains only ASCII digits, `.`, `-` and `/`.
    /// - a non-empty `email` has one `@` with text on both sides.
    /// - a non-empty `state_code` is two ASCII letters.
    ///
    /// # Errors
    ///
    /// Returns the first [`FieldError`] found, in form order.
    pub fn validate(self) -> Result<Self, FieldError> {
        let fields = self.normalized();

        if fields.name.is_empty() {
            return Err(FieldError::new("name", "is required"));
        }
        if fields.tax_id.is_empty() {
            return Err(FieldError::new("tax_id", "is required"));
        }
        if !fields
            .tax_id
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '/'))
        {
            return Err(FieldError::new(
                "tax_id",
                "may only contain digits, '.', '-' and '/'",
            ));
        }
        if !fields.email.is_empty() && !is_plausible_email(&fields.email) {
            return Err(FieldError::new("email", "is not a valid address"));
        }
        if !fields.state_code.is_empty()
            && !(fields.state_code.len() == 2
                && fields.state_code.chars().all(|c| c.is_ascii_alphabetic()))
        {
            return Err(FieldError::new("state_code", "must be two letters"));
        }

        Ok(fields)
    }

    fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_owned(),
            tax_id: self.tax_id.trim().to_owned(),
            email: self.email.trim().to_owned(),
            phone: self.phone.trim().to_owned(),
            postal_code: self.postal_code.trim().to_owned(),
            street: self.street.trim().to_owned(),
            number: self.number.trim().to_owned(),
            complement: self.complement.trim().to_owned(),
            neighborhood: self.neighborhood.trim().to_owned(),
            city: self.city.trim().to_owned(),
            state_code: self.state_code.trim().to_ascii_uppercase(),
        }
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

/// A persisted customer.
///
/// Serialized flat: `{"id": "...", "name": "...", "tax_id": "...", ...}`,
/// which is also the element shape of `search-results` lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRecord {
    /// Persisted identifier.
    pub id: RecordId,
    /// Field values.
    #[serde(flatten)]
    pub fields: CustomerFields,
}

impl CustomerRecord {
    /// Build a record from an already validated field set.
    pub fn new(id: RecordId, fields: CustomerFields) -> Self {
        Self { id, fields }
    }

    /// Returns `true` if the name contains `needle_lower` ignoring case.
    ///
    /// `needle_lower` must already be lower-cased.
    pub(crate) fn name_contains(&self, needle_lower: &str) -> bool {
        self.fields.name.to_lowercase().contains(needle_lower)
    }
}


#[cfg(test)]
mod tests {
    use super::test_fixtures::fields;
    use super::*;

    #[test]
    fn valid_fields_pass() {
        let input = fields("Ana", "111");
        assert_eq!(input.clone().validate().expect("valid"), input);
    }

    #[test]
    fn fields_are_trimmed_and_state_upper_cased() {
        let mut input = fields("  Ana  ", " 123.456.789-00 ");
        input.state_code = " sp".into();
        let out = input.validate().expect("valid");
        assert_eq!(out.name, "Ana");
        assert_eq!(out.tax_id, "123.456.789-00");
        assert_eq!(out.state_code, "SP");
    }

    #[test]
    fn blank_name_rejected() {
        let err = fields("   ", "111").validate().unwrap_err();
        assert_eq!(err.field, "name");
    }

    #[test]
    fn missing_tax_id_rejected() {
        let err = fields("Ana", "").validate().unwrap_err();
        assert_eq!(err.field, "tax_id");
        assert_eq!(err.message, "is required");
    }

    #[test]
    fn tax_id_with_letters_rejected() {
        let err = fields("Ana", "12a").validate().unwrap_err();
        assert_eq!(err.field, "tax_id");
    }

    #[test]
    fn malformed_email_rejected() {
        for bad in ["ana", "@example.com", "ana@", "a@b@c"] {
            let mut input = fields("Ana", "111");
            input.email = bad.into();
            let err = input.validate().unwrap_err();
            assert_eq!(err.field, "email", "{bad} should be rejected");
        }
    }

    #[test]
    fn optional_fields_may_be_empty() {
        let input = CustomerFields {
            name: "Ana".into(),
            tax_id: "111".into(),
            ..CustomerFields::default()
        };
        assert!(input.validate().is_ok());
    }

    #[test]
    fn three_letter_state_rejected() {
        let mut input = fields("Ana", "111");
        input.state_code = "SPX".into();
        assert_eq!(input.validate().unwrap_err().field, "state_code");
    }

    #[test]
    fn missing_fields_deserialize_empty() {
        let parsed: CustomerFields =
            serde_json::from_str(r#"{"name": "Ana", "tax_id": "111"}"#).expect("decode");
        assert_eq!(parsed.name, "Ana");
        assert!(parsed.city.is_empty());
    }

    #[test]
    fn record_serializes_flat() {
        let record = CustomerRecord::new(RecordId::new("r-1"), fields("Ana", "111"));
        let value = serde_json::to_value(&record).expect("encode");
        assert_eq!(value["id"], "r-1");
        assert_eq!(value["name"], "Ana");
        assert_eq!(value["tax_id"], "111");
    }

    #[test]
    fn name_match_ignores_case() {
        let record = CustomerRecord::new(RecordId::new("r-1"), fields("Ana Maria", "111"));
        assert!(record.name_contains("an"));
        assert!(record.name_contains("maria"));
        assert!(record.name_contains(""));
        assert!(!record.name_contains("bia"));
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(RecordId::generate(), RecordId::generate());
    }
}
