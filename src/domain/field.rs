//! Field contracts.
//!
//! A `Field` describes one inbound or outbound value: its validation rules,
//! an optional default, an optional preprocessing transform, and whether it
//! may be absent. Fields are immutable once the owning action is built.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Transform applied to a provided inbound value before defaults and validation
pub type Preprocess = Arc<dyn Fn(Value) -> anyhow::Result<Value> + Send + Sync>;

/// Computes a default value from the rest of the invocation
pub type ComputeDefault = Arc<dyn Fn(&DefaultScope<'_>) -> anyhow::Result<Value> + Send + Sync>;

/// Custom rule check; `Err` carries the violation message
pub type RuleCheck = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Direction a field flows through the action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => f.write_str("inbound"),
            Self::Outbound => f.write_str("outbound"),
        }
    }
}

/// JSON value kinds a field can be restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ValueKind {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "a string",
            Self::Integer => "an integer",
            Self::Number => "a number",
            Self::Boolean => "a boolean",
            Self::Array => "an array",
            Self::Object => "an object",
        };
        f.write_str(name)
    }
}

/// Read access handed to computed defaults
#[derive(Debug, Clone, Copy)]
pub struct DefaultScope<'a> {
    pub action: &'a str,
    pub provided: &'a HashMap<String, Value>,
    pub exposed: &'a HashMap<String, Value>,
}

/// Default applied when a field is absent
#[derive(Clone)]
pub enum DefaultValue {
    Static(Value),
    Computed(ComputeDefault),
}

impl DefaultValue {
    pub fn resolve(&self, scope: &DefaultScope<'_>) -> anyhow::Result<Value> {
        match self {
            Self::Static(value) => Ok(value.clone()),
            Self::Computed(compute) => compute(scope),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// A validation rule run against a present value
#[derive(Clone)]
pub enum Rule {
    /// Value must be present and non-null; implied for non-optional fields
    Required,
    Kind(ValueKind),
    /// Strings must contain a non-whitespace character
    NotBlank,
    OneOf(Vec<Value>),
    /// Character count for strings, element count for arrays
    Length {
        min: Option<usize>,
        max: Option<usize>,
    },
    Range {
        min: Option<f64>,
        max: Option<f64>,
    },
    Custom {
        name: String,
        check: RuleCheck,
    },
}

impl Rule {
    pub fn custom(
        name: impl Into<String>,
        check: impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Self::Custom {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Check a present value. Presence itself is handled by the contract engine.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            Self::Required => Ok(()),
            Self::Kind(kind) => {
                if kind.matches(value) {
                    Ok(())
                } else {
                    Err(format!("must be {}", kind))
                }
            }
            Self::NotBlank => match value {
                Value::String(s) if s.trim().is_empty() => Err("must not be blank".to_string()),
                _ => Ok(()),
            },
            Self::OneOf(allowed) => {
                if allowed.contains(value) {
                    Ok(())
                } else {
                    let listed: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                    Err(format!("must be one of {}", listed.join(", ")))
                }
            }
            Self::Length { min, max } => {
                let len = match value {
                    Value::String(s) => s.chars().count(),
                    Value::Array(items) => items.len(),
                    _ => return Err("has no length".to_string()),
                };
                if let Some(min) = min {
                    if len < *min {
                        return Err(format!("is too short (minimum is {})", min));
                    }
                }
                if let Some(max) = max {
                    if len > *max {
                        return Err(format!("is too long (maximum is {})", max));
                    }
                }
                Ok(())
            }
            Self::Range { min, max } => {
                let number = value
                    .as_f64()
                    .ok_or_else(|| "must be a number".to_string())?;
                if let Some(min) = min {
                    if number < *min {
                        return Err(format!("must be greater than or equal to {}", min));
                    }
                }
                if let Some(max) = max {
                    if number > *max {
                        return Err(format!("must be less than or equal to {}", max));
                    }
                }
                Ok(())
            }
            Self::Custom { check, .. } => check(value),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => f.write_str("Required"),
            Self::Kind(kind) => f.debug_tuple("Kind").field(kind).finish(),
            Self::NotBlank => f.write_str("NotBlank"),
            Self::OneOf(values) => f.debug_tuple("OneOf").field(values).finish(),
            Self::Length { min, max } => f
                .debug_struct("Length")
                .field("min", min)
                .field("max", max)
                .finish(),
            Self::Range { min, max } => f
                .debug_struct("Range")
                .field("min", min)
                .field("max", max)
                .finish(),
            Self::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish(),
        }
    }
}

/// Declaration of one inbound or outbound field
#[derive(Clone)]
pub struct Field {
    name: String,
    rules: Vec<Rule>,
    default: Option<DefaultValue>,
    preprocess: Option<Preprocess>,
    optional: bool,
    sensitive: bool,
    blank_is_absent: bool,
}

impl Field {
    /// A required field with no rules beyond presence
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
            default: None,
            preprocess: None,
            optional: false,
            sensitive: false,
            blank_is_absent: false,
        }
    }

    /// Allow the field to be absent or null
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn kind(self, kind: ValueKind) -> Self {
        self.rule(Rule::Kind(kind))
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Static(value.into()));
        self
    }

    pub fn default_with(
        mut self,
        compute: impl Fn(&DefaultScope<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.default = Some(DefaultValue::Computed(Arc::new(compute)));
        self
    }

    pub fn preprocess(
        mut self,
        transform: impl Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.preprocess = Some(Arc::new(transform));
        self
    }

    /// Hide the value in logs, lifecycle events and exception reports
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Treat an empty string like an absent value when applying the default
    pub fn blank_is_absent(mut self) -> Self {
        self.blank_is_absent = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn default(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    pub fn preprocessor(&self) -> Option<&Preprocess> {
        self.preprocess.as_ref()
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    /// Presence must be enforced: non-optional, or explicitly `Required`
    pub fn is_required(&self) -> bool {
        !self.optional || self.rules.iter().any(|r| matches!(r, Rule::Required))
    }

    /// Whether `value` counts as missing for defaults and presence checks.
    ///
    /// Absence is decided by key presence and null, never by truthiness, so an
    /// explicit `false` or `0` is present.
    pub fn is_absent(&self, value: Option<&Value>) -> bool {
        match value {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) if self.blank_is_absent => s.is_empty(),
            Some(_) => false,
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("rules", &self.rules)
            .field("default", &self.default)
            .field("preprocess", &self.preprocess.is_some())
            .field("optional", &self.optional)
            .field("sensitive", &self.sensitive)
            .field("blank_is_absent", &self.blank_is_absent)
            .finish()
    }
}

/// Copy of `values` with sensitive fields replaced by `[FILTERED]`
pub fn filter_sensitive(fields: &[Field], values: &HashMap<String, Value>) -> HashMap<String, Value> {
    values
        .iter()
        .map(|(key, value)| {
            let hidden = fields.iter().any(|f| f.name == *key && f.sensitive);
            let shown = if hidden {
                Value::String("[FILTERED]".to_string())
            } else {
                value.clone()
            };
            (key.clone(), shown)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_explicit_false_is_present() {
        let field = Field::new("flag").default_value(true);
        assert!(!field.is_absent(Some(&json!(false))));
        assert!(!field.is_absent(Some(&json!(0))));
        assert!(field.is_absent(Some(&Value::Null)));
        assert!(field.is_absent(None));
    }

    #[test]
    fn test_blank_is_present_unless_opted_in() {
        let plain = Field::new("title");
        assert!(!plain.is_absent(Some(&json!(""))));

        let opted = Field::new("title").blank_is_absent();
        assert!(opted.is_absent(Some(&json!(""))));
        assert!(!opted.is_absent(Some(&json!(" "))));
    }

    #[test]
    fn test_rule_checks() {
        assert!(Rule::Kind(ValueKind::Integer).check(&json!(3)).is_ok());
        assert!(Rule::Kind(ValueKind::Integer).check(&json!(3.5)).is_err());
        assert!(Rule::NotBlank.check(&json!("  ")).is_err());
        assert!(Rule::OneOf(vec![json!("a"), json!("b")]).check(&json!("c")).is_err());
        assert!(Rule::Length { min: Some(2), max: Some(3) }.check(&json!("héé")).is_ok());
        assert!(Rule::Length { min: Some(2), max: None }.check(&json!([1])).is_err());
        assert!(Rule::Range { min: Some(0.0), max: Some(10.0) }.check(&json!(11)).is_err());

        let even = Rule::custom("even", |v| {
            if v.as_i64().is_some_and(|n| n % 2 == 0) {
                Ok(())
            } else {
                Err("must be even".to_string())
            }
        });
        assert_eq!(even.check(&json!(3)), Err("must be even".to_string()));
    }

    #[test]
    fn test_optional_with_required_rule_is_required() {
        assert!(Field::new("a").is_required());
        assert!(!Field::new("a").optional().is_required());
        assert!(Field::new("a").optional().rule(Rule::Required).is_required());
    }

    #[test]
    fn test_filter_sensitive() {
        let fields = vec![Field::new("token").sensitive(), Field::new("user")];
        let values: HashMap<String, Value> =
            [("token".to_string(), json!("s3cret")), ("user".to_string(), json!("bob"))]
                .into_iter()
                .collect();

        let filtered = filter_sensitive(&fields, &values);
        assert_eq!(filtered["token"], json!("[FILTERED]"));
        assert_eq!(filtered["user"], json!("bob"));
    }
}
