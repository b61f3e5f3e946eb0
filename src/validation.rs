use crate::errors::{ValidationError, DomainResult, DomainError};
use uuid::Uuid;

/// A trait that entities should implement for validation.
pub trait Validate {
    /// Validates the entity and returns an error if validation fails.
    fn validate(&self) -> DomainResult<()>;
}

/// Struct for configuring validations in a fluent style
#[derive(Default)]
pub struct ValidationBuilder<T> {
    field_name: String,
    value: Option<T>,
    errors: Vec<ValidationError>,
}

/// Generic validation implementations
impl<T> ValidationBuilder<T> {
    pub fn new(field_name: &str, value: Option<T>) -> Self {
        Self {
            field_name: field_name.to_string(),
            value,
            errors: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self
    where T: Default + PartialEq {
        if self.value.is_none() || self.value == Some(T::default()) {
            self.errors.push(ValidationError::required(&self.field_name));
        }
        self
    }

    /// Complete validation and return result
    pub fn validate(self) -> DomainResult<()> {
        match self.errors.into_iter().next() {
            None => Ok(()),
            // Return the first error for simplicity
            Some(first) => Err(DomainError::Validation(first)),
        }
    }
}

/// String-specific validations. Lengths are counted in characters.
impl ValidationBuilder<String> {
    pub fn not_blank(mut self) -> Self {
        if let Some(value) = &self.value {
            if value.trim().is_empty() {
                self.errors.push(ValidationError::required(&self.field_name));
            }
        }
        self
    }

    pub fn min_length(mut self, min: usize) -> Self {
        if let Some(value) = &self.value {
            if value.chars().count() < min {
                self.errors.push(ValidationError::min_length(&self.field_name, min));
            }
        }
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        if let Some(value) = &self.value {
            if value.chars().count() > max {
                self.errors.push(ValidationError::max_length(&self.field_name, max));
            }
        }
        self
    }
}

impl ValidationBuilder<Uuid> {
    pub fn not_nil(mut self) -> Self {
        if let Some(value) = &self.value {
            if value.is_nil() {
                self.errors.push(ValidationError::invalid_value(&self.field_name, "cannot be nil UUID"));
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_bounds_count_chars() {
        // 2000 two-byte characters are still 2000 characters
        let long_accented = "é".repeat(2000);
        assert!(ValidationBuilder::new("content", Some(long_accented))
            .min_length(1)
            .max_length(2000)
            .validate()
            .is_ok());

        let too_long = "a".repeat(2001);
        let err = ValidationBuilder::new("content", Some(too_long))
            .max_length(2000)
            .validate()
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(ValidationError::MaxLength { max: 2000, .. })));
    }

    #[test]
    fn test_blank_and_required() {
        assert!(ValidationBuilder::new("content", Some("   ".to_string())).not_blank().validate().is_err());
        assert!(ValidationBuilder::new("content", Some(String::new())).required().validate().is_err());
        let missing: Option<String> = None;
        assert!(ValidationBuilder::new("content", missing).required().validate().is_err());
    }

    #[test]
    fn test_nil_uuid_is_rejected() {
        assert!(ValidationBuilder::new("sender_id", Some(Uuid::nil())).not_nil().validate().is_err());
        assert!(ValidationBuilder::new("sender_id", Some(Uuid::new_v4())).not_nil().validate().is_ok());
    }
}
