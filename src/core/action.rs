//! Action definitions.
//!
//! An `ActionDef` is an immutable, cheaply clonable value holding the field
//! contract, hooks, callbacks, messages and work of one action. It is built
//! once through `ActionBuilder`; `extend` starts a new builder seeded with a
//! copy of an existing definition.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::config::{self, Settings};
use crate::domain::callbacks::{Callback, MessageEntry, MessageSource};
use crate::domain::{
    CallbackScope, DefinitionError, Direction, EventKind, Field, Halt, ReportMode,
};

use super::context::Context;
use super::hooks::{AroundHook, Flow, Hook, Next};
use super::pipeline;
use super::result::ResultView;

/// Everything an action declares
pub struct Definition {
    pub(crate) name: String,
    pub(crate) inputs: Vec<Field>,
    pub(crate) outputs: Vec<Field>,
    pub(crate) before: Vec<Hook>,
    pub(crate) around: Vec<AroundHook>,
    pub(crate) after: Vec<Hook>,
    pub(crate) work: Hook,
    pub(crate) callbacks: Vec<Callback>,
    pub(crate) messages: Vec<MessageEntry>,
    pub(crate) report_mode: Option<ReportMode>,
}

impl Definition {
    pub(crate) fn declares(&self, direction: Direction, name: &str) -> bool {
        let fields = match direction {
            Direction::Inbound => &self.inputs,
            Direction::Outbound => &self.outputs,
        };
        fields.iter().any(|f| f.name() == name)
    }
}

/// A built action, ready to run
#[derive(Clone)]
pub struct ActionDef {
    inner: Arc<Definition>,
}

impl ActionDef {
    /// Start defining an action
    pub fn builder(name: impl Into<String>) -> ActionBuilder {
        ActionBuilder::new(name)
    }

    /// Start a new definition that copies everything declared here
    pub fn extend(&self, name: impl Into<String>) -> ActionBuilder {
        let parent = &self.inner;
        ActionBuilder {
            name: name.into(),
            inputs: parent.inputs.clone(),
            outputs: parent.outputs.clone(),
            before: parent.before.clone(),
            around: parent.around.clone(),
            after: parent.after.clone(),
            work: Some(parent.work.clone()),
            callbacks: parent.callbacks.clone(),
            messages: parent.messages.clone(),
            report_mode: parent.report_mode,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn inputs(&self) -> &[Field] {
        &self.inner.inputs
    }

    pub fn outputs(&self) -> &[Field] {
        &self.inner.outputs
    }

    /// Per-action override of the exception reporting mode
    pub fn report_mode(&self) -> Option<ReportMode> {
        self.inner.report_mode
    }

    /// Run against the process-wide settings. Never fails; see `ResultView`.
    pub fn run(&self, inputs: HashMap<String, Value>) -> ResultView {
        self.run_with(&config::settings(), inputs)
    }

    /// Run against explicit settings
    pub fn run_with(&self, settings: &Settings, inputs: HashMap<String, Value>) -> ResultView {
        pipeline::execute(self, settings, inputs)
    }

    /// Run, then turn a non-ok result back into the `Halt` that caused it.
    ///
    /// Inside another action's work this lets `?` re-raise the inner failure
    /// into the outer action; nested business failures are attributed to
    /// this action.
    pub fn call(&self, inputs: HashMap<String, Value>) -> Result<ResultView, Halt> {
        self.call_with(&config::settings(), inputs)
    }

    pub fn call_with(
        &self,
        settings: &Settings,
        inputs: HashMap<String, Value>,
    ) -> Result<ResultView, Halt> {
        let nested = super::nesting::depth() > 0;
        let result = self.run_with(settings, inputs);
        if result.ok() {
            return Ok(result);
        }
        let mut halt = result.into_halt();
        if nested {
            if let Halt::Failure(failure) = &mut halt {
                failure.attribute_to(self.name());
            }
        }
        Err(halt)
    }

    pub(crate) fn definition(&self) -> &Definition {
        &self.inner
    }
}

impl fmt::Debug for ActionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let def = &self.inner;
        f.debug_struct("ActionDef")
            .field("name", &def.name)
            .field("inputs", &def.inputs)
            .field("outputs", &def.outputs)
            .field("before", &def.before.len())
            .field("around", &def.around.len())
            .field("after", &def.after.len())
            .field("callbacks", &def.callbacks)
            .field("messages", &def.messages)
            .field("report_mode", &def.report_mode)
            .finish()
    }
}

/// Collects declarations for an `ActionDef`
pub struct ActionBuilder {
    name: String,
    inputs: Vec<Field>,
    outputs: Vec<Field>,
    before: Vec<Hook>,
    around: Vec<AroundHook>,
    after: Vec<Hook>,
    work: Option<Hook>,
    callbacks: Vec<Callback>,
    messages: Vec<MessageEntry>,
    report_mode: Option<ReportMode>,
}

impl ActionBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            before: Vec::new(),
            around: Vec::new(),
            after: Vec::new(),
            work: None,
            callbacks: Vec::new(),
            messages: Vec::new(),
            report_mode: None,
        }
    }

    /// Declare an inbound field
    pub fn input(mut self, field: Field) -> Self {
        self.inputs.push(field);
        self
    }

    /// Declare an outbound field
    pub fn output(mut self, field: Field) -> Self {
        self.outputs.push(field);
        self
    }

    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> Result<Flow, Halt> + Send + Sync + 'static,
    {
        self.before.push(Arc::new(hook));
        self
    }

    pub fn around<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Context<'_>, Next<'_>) -> Result<Flow, Halt> + Send + Sync + 'static,
    {
        self.around.push(Arc::new(hook));
        self
    }

    /// After hooks run in reverse declaration order
    pub fn after<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> Result<Flow, Halt> + Send + Sync + 'static,
    {
        self.after.push(Arc::new(hook));
        self
    }

    /// The action's work; replaces an inherited one
    pub fn work<F>(mut self, work: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> Result<Flow, Halt> + Send + Sync + 'static,
    {
        self.work = Some(Arc::new(work));
        self
    }

    /// Register a callback for every invocation ending in `kind`
    pub fn on<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(&CallbackScope<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let order = self.callbacks.len();
        self.callbacks.push(Callback {
            kind,
            matcher: None,
            handler: Arc::new(handler),
            order,
        });
        self
    }

    /// Register a callback that fires only when `matcher` returns true
    pub fn on_if<M, F>(mut self, kind: EventKind, matcher: M, handler: F) -> Self
    where
        M: Fn(&CallbackScope<'_>) -> bool + Send + Sync + 'static,
        F: Fn(&CallbackScope<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let order = self.callbacks.len();
        self.callbacks.push(Callback {
            kind,
            matcher: Some(Arc::new(matcher)),
            handler: Arc::new(handler),
            order,
        });
        self
    }

    pub fn on_success<F>(self, handler: F) -> Self
    where
        F: Fn(&CallbackScope<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on(EventKind::Success, handler)
    }

    pub fn on_error<F>(self, handler: F) -> Self
    where
        F: Fn(&CallbackScope<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on(EventKind::Error, handler)
    }

    pub fn on_failure<F>(self, handler: F) -> Self
    where
        F: Fn(&CallbackScope<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on(EventKind::Failure, handler)
    }

    pub fn on_exception<F>(self, handler: F) -> Self
    where
        F: Fn(&CallbackScope<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on(EventKind::Exception, handler)
    }

    /// Static message for `Success` or `Error`
    pub fn message(self, kind: EventKind, text: impl Into<String>) -> Self {
        self.push_message(kind, None, MessageSource::Static(text.into()))
    }

    /// Static message used only when `matcher` returns true
    pub fn message_if<M>(self, kind: EventKind, matcher: M, text: impl Into<String>) -> Self
    where
        M: Fn(&CallbackScope<'_>) -> bool + Send + Sync + 'static,
    {
        self.push_message(kind, Some(Arc::new(matcher)), MessageSource::Static(text.into()))
    }

    /// Message computed from the settled invocation
    pub fn message_with<F>(self, kind: EventKind, compute: F) -> Self
    where
        F: Fn(&CallbackScope<'_>) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.push_message(kind, None, MessageSource::Dynamic(Arc::new(compute)))
    }

    pub fn success_message(self, text: impl Into<String>) -> Self {
        self.message(EventKind::Success, text)
    }

    pub fn error_message(self, text: impl Into<String>) -> Self {
        self.message(EventKind::Error, text)
    }

    /// Override the process-wide exception reporting mode for this action
    pub fn report_mode(mut self, mode: ReportMode) -> Self {
        self.report_mode = Some(mode);
        self
    }

    fn push_message(
        mut self,
        kind: EventKind,
        matcher: Option<crate::domain::callbacks::Matcher>,
        source: MessageSource,
    ) -> Self {
        let order = self.messages.len();
        self.messages.push(MessageEntry {
            kind,
            matcher,
            source,
            order,
        });
        self
    }

    /// Check the declarations and freeze them
    pub fn build(self) -> Result<ActionDef, DefinitionError> {
        if self.name.trim().is_empty() {
            return Err(DefinitionError::EmptyName);
        }
        check_unique(&self.name, Direction::Inbound, &self.inputs)?;
        check_unique(&self.name, Direction::Outbound, &self.outputs)?;

        let work = self.work.ok_or_else(|| DefinitionError::MissingWork {
            action: self.name.clone(),
        })?;

        Ok(ActionDef {
            inner: Arc::new(Definition {
                name: self.name,
                inputs: self.inputs,
                outputs: self.outputs,
                before: self.before,
                around: self.around,
                after: self.after,
                work,
                callbacks: self.callbacks,
                messages: self.messages,
                report_mode: self.report_mode,
            }),
        })
    }
}

fn check_unique(action: &str, direction: Direction, fields: &[Field]) -> Result<(), DefinitionError> {
    let mut seen = HashSet::new();
    for field in fields {
        if !seen.insert(field.name()) {
            return Err(DefinitionError::DuplicateField {
                action: action.to_string(),
                field: field.name().to_string(),
                direction,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> ActionBuilder {
        ActionDef::builder("Noop").work(|_| Ok(Flow::Continue))
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let err = noop()
            .input(Field::new("id"))
            .input(Field::new("id"))
            .build()
            .unwrap_err();

        assert_eq!(
            err,
            DefinitionError::DuplicateField {
                action: "Noop".to_string(),
                field: "id".to_string(),
                direction: Direction::Inbound,
            }
        );
    }

    #[test]
    fn test_same_name_in_both_directions_allowed() {
        assert!(noop()
            .input(Field::new("id"))
            .output(Field::new("id"))
            .build()
            .is_ok());
    }

    #[test]
    fn test_missing_work_rejected() {
        let err = ActionDef::builder("Idle").build().unwrap_err();
        assert!(matches!(err, DefinitionError::MissingWork { .. }));
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = ActionDef::builder("  ")
            .work(|_| Ok(Flow::Continue))
            .build()
            .unwrap_err();
        assert_eq!(err, DefinitionError::EmptyName);
    }

    #[test]
    fn test_extend_copies_parent_without_mutating_it() {
        let parent = noop()
            .input(Field::new("id"))
            .success_message("parent done")
            .build()
            .unwrap();

        let child = parent
            .extend("Child")
            .input(Field::new("extra"))
            .report_mode(ReportMode::OnlyExhausted)
            .build()
            .unwrap();

        assert_eq!(parent.inputs().len(), 1);
        assert_eq!(child.inputs().len(), 2);
        assert_eq!(child.name(), "Child");
        assert_eq!(child.report_mode(), Some(ReportMode::OnlyExhausted));
        assert_eq!(parent.report_mode(), None);
    }

    #[test]
    fn test_extend_rejects_redeclared_parent_field() {
        let parent = noop().input(Field::new("id")).build().unwrap();
        let err = parent.extend("Child").input(Field::new("id")).build();
        assert!(matches!(err, Err(DefinitionError::DuplicateField { .. })));
    }
}
