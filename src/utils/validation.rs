// src/utils/validation.rs

use std::{borrow::Cow, collections::BTreeMap};

use validator::{ValidationError, ValidationErrors};

/// Records `message` against `field` when `ok` is false.
///
/// Checks never short-circuit: callers run every rule and inspect the
/// accumulated errors once at the end.
pub fn check(errors: &mut ValidationErrors, ok: bool, field: &'static str, message: &'static str) {
    if !ok {
        let mut error = ValidationError::new("invalid");
        error.message = Some(Cow::Borrowed(message));
        errors.add(field, error);
    }
}

/// Converts accumulated errors into the `Validate::validate` return shape.
pub fn finish(errors: ValidationErrors) -> Result<(), ValidationErrors> {
    if errors.errors().is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn permitted_value(value: &str, permitted: &[&str]) -> bool {
    permitted.contains(&value)
}

/// Flattens errors into `field -> message`, keeping the first message per field.
pub fn messages(errors: &ValidationErrors) -> BTreeMap<String, String> {
    errors
        .field_errors()
        .into_iter()
        .filter_map(|(field, errs)| {
            errs.first().map(|e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                (field.to_string(), message)
            })
        })
        .collect()
}
