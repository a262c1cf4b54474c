//! Field Contract Integration Tests
//!
//! Preprocessing, defaults and validation as seen through a full run.

use std::thread;
use std::time::Duration;

use actionkit::{values, ActionDef, ActionError, Field, Flow, Outcome, Rule, Settings, ValueKind};
use serde_json::json;

fn echo(field: Field) -> ActionDef {
    let name = field.name().to_string();
    ActionDef::builder("Echo")
        .input(field)
        .output(Field::new(name).optional())
        .work(|_| Ok(Flow::Continue))
        .build()
        .unwrap()
}

#[test]
fn test_preprocess_runs_before_validation() {
    let action = echo(
        Field::new("email")
            .kind(ValueKind::String)
            .preprocess(|value| Ok(json!(value.as_str().unwrap_or_default().to_lowercase())))
            .rule(Rule::custom("lowercase", |value| {
                match value.as_str() {
                    Some(s) if s == s.to_lowercase() => Ok(()),
                    _ => Err("must be lowercase".to_string()),
                }
            })),
    );

    let result = action.run_with(&Settings::default(), values(json!({ "email": "ADA@X.IO" })));

    assert!(result.ok());
    assert_eq!(result.get("email").unwrap(), &json!("ada@x.io"));
}

#[test]
fn test_preprocess_error_is_exception() {
    let action = echo(Field::new("n").preprocess(|_| anyhow::bail!("cannot parse")));

    let result = action.run_with(&Settings::default(), values(json!({ "n": "x" })));

    assert_eq!(result.outcome(), Outcome::ExceptionRaised);
    match result.exception() {
        Some(ActionError::Preprocessing { field, .. }) => assert_eq!(field, "n"),
        other => panic!("Expected Preprocessing, got {:?}", other),
    }
}

#[test]
fn test_failing_computed_default_is_exception() {
    let action = echo(Field::new("region").default_with(|_| anyhow::bail!("no region configured")));

    let result = action.run_with(&Settings::default(), values(json!({})));

    assert_eq!(result.outcome(), Outcome::ExceptionRaised);
    let exception = result.exception().unwrap();
    assert!(exception.is_contract_error());
    match exception {
        ActionError::DefaultAssignment { field, source } => {
            assert_eq!(field, "region");
            assert_eq!(source.to_string(), "no region configured");
        }
        other => panic!("Expected DefaultAssignment, got {:?}", other),
    }
}

#[test]
fn test_elapsed_time_covers_failed_preprocessing() {
    let action = echo(Field::new("payload").preprocess(|_| {
        thread::sleep(Duration::from_millis(5));
        anyhow::bail!("malformed payload")
    }));

    let result = action.run_with(&Settings::default(), values(json!({ "payload": "{" })));

    assert!(matches!(
        result.exception(),
        Some(ActionError::Preprocessing { .. })
    ));
    assert!(result.elapsed_ms() >= 5.0);
}

#[test]
fn test_elapsed_time_covers_failed_validation() {
    let action = echo(Field::new("slow").rule(Rule::custom("slow_check", |_| {
        thread::sleep(Duration::from_millis(5));
        Err("rejected".to_string())
    })));

    let result = action.run_with(&Settings::default(), values(json!({ "slow": 1 })));

    let exception = result.exception().unwrap();
    assert!(matches!(exception, ActionError::InboundValidation(_)));
    assert!(exception.is_contract_error());
    assert!(result.elapsed_ms() >= 5.0);
}

#[test]
fn test_computed_default_sees_provided_inputs() {
    let action = ActionDef::builder("Slugger")
        .input(Field::new("title").kind(ValueKind::String))
        .input(Field::new("slug").default_with(|scope| {
            let title = scope
                .provided
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            Ok(json!(title.to_lowercase().replace(' ', "-")))
        }))
        .output(Field::new("slug"))
        .work(|_| Ok(Flow::Continue))
        .build()
        .unwrap();

    let result = action.run_with(&Settings::default(), values(json!({ "title": "Hello World" })));

    assert!(result.ok());
    assert_eq!(result.get("slug").unwrap(), &json!("hello-world"));
}

#[test]
fn test_blank_is_absent_applies_default() {
    let action = echo(Field::new("color").blank_is_absent().default_value("blue"));
    let settings = Settings::default();

    let blank = action.run_with(&settings, values(json!({ "color": "" })));
    assert_eq!(blank.get("color").unwrap(), &json!("blue"));

    let explicit = action.run_with(&settings, values(json!({ "color": "red" })));
    assert_eq!(explicit.get("color").unwrap(), &json!("red"));
}

#[test]
fn test_false_and_zero_inputs_are_present() {
    let action = echo(Field::new("flag").default_value(true));

    let result = action.run_with(&Settings::default(), values(json!({ "flag": false })));

    assert_eq!(result.get("flag").unwrap(), &json!(false));
}

#[test]
fn test_every_violation_is_collected() {
    let action = ActionDef::builder("Picky")
        .input(Field::new("size").rule(Rule::OneOf(vec![json!("s"), json!("m"), json!("l")])))
        .input(Field::new("code").rule(Rule::Length {
            min: Some(3),
            max: Some(5),
        }))
        .input(Field::new("qty").rule(Rule::Range {
            min: Some(1.0),
            max: Some(10.0),
        }))
        .input(Field::new("note").optional().rule(Rule::NotBlank))
        .work(|_| Ok(Flow::Continue))
        .build()
        .unwrap();

    let result = action.run_with(
        &Settings::default(),
        values(json!({ "size": "xl", "code": "ab", "qty": 0, "note": "  " })),
    );

    let violations = result.exception().unwrap().validation_errors().unwrap();
    assert_eq!(violations.fields(), vec!["size", "code", "qty", "note"]);
}

#[test]
fn test_optional_field_may_be_absent() {
    let action = echo(Field::new("nickname").optional().kind(ValueKind::String));

    let result = action.run_with(&Settings::default(), values(json!({})));

    assert!(result.ok());
    assert!(result.get("nickname").unwrap().is_null());
}

#[test]
fn test_duplicate_field_is_a_definition_error() {
    let err = ActionDef::builder("Twice")
        .input(Field::new("a"))
        .input(Field::new("a"))
        .work(|_| Ok(Flow::Continue))
        .build()
        .unwrap_err();

    assert!(err.to_string().contains("more than once"));
}

#[test]
fn test_missing_work_is_a_definition_error() {
    let err = ActionDef::builder("Idle").build().unwrap_err();
    assert!(err.to_string().contains("no work function"));
}
