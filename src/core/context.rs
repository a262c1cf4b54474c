//! Schema-checked access to an invocation from hooks and work.
//!
//! Only fields the action declares can be read or written. Touching an
//! undeclared name fails immediately with `ActionError::UndeclaredField`.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::domain::{ActionError, Direction, ExecutionState, Halt, RetryRecord};

use super::action::Definition;

pub(crate) static NULL: Value = Value::Null;

/// Handle passed to before/around/after hooks and to the work function
pub struct Context<'a> {
    def: &'a Definition,
    state: &'a mut ExecutionState,
    retry: Option<&'a RetryRecord>,
    depth: usize,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        def: &'a Definition,
        state: &'a mut ExecutionState,
        retry: Option<&'a RetryRecord>,
        depth: usize,
    ) -> Self {
        Self {
            def,
            state,
            retry,
            depth,
        }
    }

    /// Name of the running action
    pub fn action(&self) -> &str {
        &self.def.name
    }

    /// Number of enclosing action invocations
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Retry metadata when running inside a retrying job
    pub fn retry(&self) -> Option<&RetryRecord> {
        self.retry
    }

    /// Value of a declared inbound field; `Null` when absent
    pub fn input(&self, name: &str) -> Result<&Value, ActionError> {
        self.check_declared(Direction::Inbound, name)?;
        Ok(self.state.provided().get(name).unwrap_or(&NULL))
    }

    /// Declared inbound field as a string slice
    pub fn input_str(&self, name: &str) -> Result<&str, ActionError> {
        let value = self.input(name)?;
        value.as_str().ok_or_else(|| ActionError::FieldType {
            field: name.to_string(),
            source: <serde_json::Error as serde::de::Error>::custom(format!(
                "expected a string, found {}",
                value
            )),
        })
    }

    /// Declared inbound field deserialized into `T`
    pub fn input_as<T: DeserializeOwned>(&self, name: &str) -> Result<T, ActionError> {
        let value = self.input(name)?.clone();
        serde_json::from_value(value).map_err(|source| ActionError::FieldType {
            field: name.to_string(),
            source,
        })
    }

    /// All provided inputs, after preprocessing and defaults
    pub fn inputs(&self) -> &HashMap<String, Value> {
        self.state.provided()
    }

    /// Set a declared outbound field
    pub fn expose(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ActionError> {
        self.check_declared(Direction::Outbound, name)?;
        self.state.exposed_mut().insert(name.to_string(), value.into());
        Ok(())
    }

    /// Value already exposed for a declared outbound field
    pub fn output(&self, name: &str) -> Result<Option<&Value>, ActionError> {
        self.check_declared(Direction::Outbound, name)?;
        Ok(self.state.exposed().get(name))
    }

    /// Business failure signal, for `return Err(ctx.fail("..."))`
    pub fn fail(&self, message: impl Into<String>) -> Halt {
        Halt::fail(message)
    }

    fn check_declared(&self, direction: Direction, name: &str) -> Result<(), ActionError> {
        if self.def.declares(direction, name) {
            Ok(())
        } else {
            Err(ActionError::UndeclaredField {
                action: self.def.name.clone(),
                field: name.to_string(),
                direction,
            })
        }
    }
}
