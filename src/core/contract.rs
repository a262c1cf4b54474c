//! Contract application: preprocessing, defaults and validation.
//!
//! Inbound order is fixed: preprocess, then defaults, then validate.
//! Outbound copies pass-through values, applies defaults, validates, and
//! finalizes the state. Validation reports every violated field at once.

use std::collections::HashMap;

use serde_json::Value;
use tracing::trace;

use crate::domain::field::DefaultScope;
use crate::domain::{ActionError, ExecutionState, Field, ValidationErrors};

use super::action::Definition;

/// Apply the inbound contract to `state.provided`
pub fn apply_inbound(def: &Definition, state: &mut ExecutionState) -> Result<(), ActionError> {
    preprocess(&def.inputs, state.provided_mut())?;

    for field in &def.inputs {
        let Some(default) = field.default() else {
            continue;
        };
        if !field.is_absent(state.provided().get(field.name())) {
            continue;
        }
        let scope = DefaultScope {
            action: &def.name,
            provided: state.provided(),
            exposed: state.exposed(),
        };
        let value = default
            .resolve(&scope)
            .map_err(|source| ActionError::DefaultAssignment {
                field: field.name().to_string(),
                source,
            })?;
        trace!(field = field.name(), "Applied inbound default");
        state.provided_mut().insert(field.name().to_string(), value);
    }

    validate(&def.inputs, state.provided()).map_err(ActionError::InboundValidation)
}

/// Apply the outbound contract to `state.exposed` and finalize on success
pub fn apply_outbound(def: &Definition, state: &mut ExecutionState) -> Result<(), ActionError> {
    {
        let (provided, exposed) = state.split_mut();
        for field in &def.outputs {
            if exposed.contains_key(field.name()) {
                continue;
            }
            if let Some(value) = provided.get(field.name()) {
                exposed.insert(field.name().to_string(), value.clone());
            }
        }
    }

    for field in &def.outputs {
        let Some(default) = field.default() else {
            continue;
        };
        if !field.is_absent(state.exposed().get(field.name())) {
            continue;
        }
        let scope = DefaultScope {
            action: &def.name,
            provided: state.provided(),
            exposed: state.exposed(),
        };
        let value = default
            .resolve(&scope)
            .map_err(|source| ActionError::DefaultAssignment {
                field: field.name().to_string(),
                source,
            })?;
        trace!(field = field.name(), "Applied outbound default");
        state.exposed_mut().insert(field.name().to_string(), value);
    }

    validate(&def.outputs, state.exposed()).map_err(ActionError::OutboundValidation)?;
    state.finalize();
    Ok(())
}

/// Run preprocess transforms over present values, stopping at the first error
fn preprocess(fields: &[Field], values: &mut HashMap<String, Value>) -> Result<(), ActionError> {
    for field in fields {
        let Some(transform) = field.preprocessor() else {
            continue;
        };
        let Some(value) = values.remove(field.name()) else {
            continue;
        };
        let transformed = transform(value).map_err(|source| ActionError::Preprocessing {
            field: field.name().to_string(),
            source,
        })?;
        values.insert(field.name().to_string(), transformed);
    }
    Ok(())
}

/// Check every field's rules, collecting all violations
pub fn validate(fields: &[Field], values: &HashMap<String, Value>) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    for field in fields {
        let value = values.get(field.name());
        let value = match value {
            Some(v) if !v.is_null() => v,
            _ => {
                if field.is_required() {
                    errors.push(field.name(), "is required");
                }
                continue;
            }
        };

        for rule in field.rules() {
            if let Err(message) = rule.check(value) {
                errors.push(field.name(), message);
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Rule, ValueKind};
    use serde_json::json;

    fn values(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_validation_aggregates_every_field() {
        let fields = vec![
            Field::new("name").kind(ValueKind::String),
            Field::new("age").kind(ValueKind::Integer),
            Field::new("nickname").optional().kind(ValueKind::String),
        ];

        let errors = validate(&fields, &values(&[("age", json!("ten"))])).unwrap_err();
        assert_eq!(errors.fields(), vec!["name", "age"]);
        assert!(!errors.contains("nickname"));
    }

    #[test]
    fn test_null_counts_as_missing() {
        let fields = vec![Field::new("name")];
        let errors = validate(&fields, &values(&[("name", Value::Null)])).unwrap_err();
        assert!(errors.contains("name"));
    }

    #[test]
    fn test_false_satisfies_required() {
        let fields = vec![Field::new("flag").kind(ValueKind::Boolean)];
        assert!(validate(&fields, &values(&[("flag", json!(false))])).is_ok());
    }

    #[test]
    fn test_optional_rules_skipped_when_absent() {
        let fields = vec![Field::new("limit")
            .optional()
            .rule(Rule::Range { min: Some(1.0), max: None })];
        assert!(validate(&fields, &HashMap::new()).is_ok());
        assert!(validate(&fields, &values(&[("limit", json!(0))])).is_err());
    }

    #[test]
    fn test_preprocess_skips_absent_fields() {
        let fields = vec![Field::new("name").preprocess(|_| anyhow::bail!("should not run"))];
        let mut map = HashMap::new();
        assert!(preprocess(&fields, &mut map).is_ok());
        assert!(map.is_empty());
    }
}
