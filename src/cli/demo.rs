//! Sample actions driven by the CLI.

use serde_json::Value;

use crate::core::{ActionDef, Flow};
use crate::domain::{DefinitionError, EventKind, Field, Halt, Rule, ValueKind};

/// Greets `name`; fails with `fail` as the message when it is given
pub fn greet_action() -> Result<ActionDef, DefinitionError> {
    ActionDef::builder("Greet")
        .input(
            Field::new("name")
                .kind(ValueKind::String)
                .rule(Rule::NotBlank)
                .blank_is_absent()
                .default_value("world")
                .preprocess(|value| {
                    Ok(match value {
                        Value::String(s) => Value::String(s.trim().to_string()),
                        other => other,
                    })
                }),
        )
        .input(Field::new("fail").optional().kind(ValueKind::String))
        .output(Field::new("greeting").kind(ValueKind::String))
        .work(|ctx| {
            if let Some(reason) = ctx.input("fail")?.as_str() {
                return Err(ctx.fail(reason));
            }
            let greeting = format!("Hello, {}!", ctx.input_str("name")?);
            ctx.expose("greeting", greeting)?;
            Ok(Flow::Continue)
        })
        .message_with(EventKind::Success, |scope| {
            let name = scope
                .inputs
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("nobody");
            Ok(format!("Greeted {}", name))
        })
        .error_message("Could not greet")
        .build()
}

/// Raises an exception on the first `fail_times` delivery attempts
pub fn flaky_action(fail_times: u32) -> Result<ActionDef, DefinitionError> {
    ActionDef::builder("FlakyJob")
        .output(Field::new("attempt").kind(ValueKind::Integer))
        .work(move |ctx| {
            let attempt = ctx.retry().map(|r| r.attempt()).unwrap_or(1);
            if attempt <= fail_times {
                return Err(Halt::error(anyhow::anyhow!(
                    "Upstream unavailable on attempt {}",
                    attempt
                )));
            }
            ctx.expose("attempt", attempt)?;
            Ok(Flow::Continue)
        })
        .build()
}
