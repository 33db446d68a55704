//! Evaluation context
//!
//! Carries the model, environment variables (external plus the processed
//! `%context`/`%resource`/`%rootResource` family), variables introduced by
//! `defineVariable`, the scoped `$this`/`$index`/`$total` slots, the async
//! mode, the cancellation signal, the trace sink and the per-evaluation
//! "now" snapshot.

use crate::error::{Error, Result};
use crate::value::{Collection, DatePrecision, DateTimePrecision, TimePrecision, Value};
use chrono::{DateTime, FixedOffset, Local, Utc};
use corten_model::Model;
use corten_terminology::{CancelSignal, TerminologyClient};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// Asynchronous capability of an evaluation.
///
/// `Always` is accepted for interface fidelity with promise-promoting
/// hosts; at runtime it behaves like `Allowed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AsyncMode {
    #[default]
    Disallowed,
    Allowed,
    Always,
}

impl AsyncMode {
    pub fn allows_suspension(&self) -> bool {
        !matches!(self, AsyncMode::Disallowed)
    }
}

impl FromStr for AsyncMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "false" => Ok(AsyncMode::Disallowed),
            "true" => Ok(AsyncMode::Allowed),
            "always" => Ok(AsyncMode::Always),
            other => Err(Error::Domain(format!("invalid async mode '{}'", other))),
        }
    }
}

/// Sink for `trace()` output.
pub type TraceFn = Arc<dyn Fn(&str, &Collection) + Send + Sync>;

/// The instant captured once per top-level evaluation; `now()`, `today()`
/// and `timeOfDay()` all derive from it.
#[derive(Debug, Clone, Copy)]
pub struct NowSnapshot {
    now: DateTime<FixedOffset>,
}

impl NowSnapshot {
    pub fn capture() -> Self {
        Self {
            now: Local::now().fixed_offset(),
        }
    }

    /// Pin the snapshot to a known instant (test hook).
    pub fn at(now: DateTime<FixedOffset>) -> Self {
        Self { now }
    }

    pub fn now_value(&self) -> Value {
        Value::datetime_with_precision_and_offset(
            self.now.with_timezone(&Utc),
            DateTimePrecision::Millisecond,
            Some(self.now.offset().local_minus_utc()),
        )
    }

    pub fn today_value(&self) -> Value {
        Value::date_with_precision(self.now.date_naive(), DatePrecision::Day)
    }

    pub fn time_of_day_value(&self) -> Value {
        Value::time_with_precision(self.now.time(), TimePrecision::Millisecond)
    }
}

/// Runtime state for one evaluation.
pub struct EvalContext {
    pub model: Option<Arc<Model>>,
    /// External environment variables plus processed variables; immutable
    /// for the whole evaluation.
    env: HashMap<Arc<str>, Collection>,
    /// Variables introduced by `defineVariable`.
    defined: HashMap<Arc<str>, Collection>,
    /// The root focus, also the target of `AnyAtRoot` arguments.
    pub root: Collection,
    pub this: Option<Collection>,
    pub index: Option<i64>,
    pub total: Option<Collection>,
    pub async_mode: AsyncMode,
    pub signal: CancelSignal,
    pub now: NowSnapshot,
    pub trace: Option<TraceFn>,
    pub terminology: Option<Arc<TerminologyClient>>,
    pub questionnaire: Option<Arc<JsonValue>>,
}

impl EvalContext {
    pub fn new(root: Collection) -> Self {
        Self {
            model: None,
            env: HashMap::new(),
            defined: HashMap::new(),
            root,
            this: None,
            index: None,
            total: None,
            async_mode: AsyncMode::default(),
            signal: CancelSignal::new(),
            now: NowSnapshot::capture(),
            trace: None,
            terminology: None,
            questionnaire: None,
        }
    }

    /// Install the processed variables for a root resource. The common
    /// terminology URLs ride along for convenience in tests and CLIs.
    pub fn install_processed_vars(&mut self) {
        self.env.insert(Arc::from("context"), self.root.clone());
        self.env.insert(Arc::from("resource"), self.root.clone());
        self.env.insert(Arc::from("rootResource"), self.root.clone());
        self.env.insert(
            Arc::from("ucum"),
            Collection::singleton(Value::string("http://unitsofmeasure.org")),
        );
        self.env.insert(
            Arc::from("sct"),
            Collection::singleton(Value::string("http://snomed.info/sct")),
        );
        self.env.insert(
            Arc::from("loinc"),
            Collection::singleton(Value::string("http://loinc.org")),
        );
        if let Some(terminology) = &self.terminology {
            self.env.insert(
                Arc::from("terminologies"),
                Collection::singleton(Value::string(terminology.base_url())),
            );
        }
        if let Some(questionnaire) = &self.questionnaire {
            let node = crate::node::ResourceNode::from_resource(
                questionnaire.clone(),
                self.model.as_deref(),
            );
            self.env.insert(
                Arc::from("questionnaire"),
                Collection::singleton(Value::node(node)),
            );
        }
    }

    /// Register an external environment variable.
    pub fn set_env_var(&mut self, name: impl Into<Arc<str>>, value: Collection) {
        self.env.insert(name.into(), value);
    }

    /// Resolve `%name`. Defined variables take precedence over the
    /// environment; unknown names are an error, not empty.
    pub fn lookup_var(&self, name: &str) -> Result<Collection> {
        if let Some(v) = self.defined.get(name) {
            return Ok(v.clone());
        }
        if let Some(v) = self.env.get(name) {
            return Ok(v.clone());
        }
        Err(Error::UnknownVariable(name.to_string()))
    }

    /// `defineVariable`: rejects redefinition and shadowing of
    /// environment variables.
    pub fn define_var(&mut self, name: &str, value: Collection) -> Result<()> {
        if self.env.contains_key(name) {
            return Err(Error::Domain(format!(
                "cannot overwrite environment variable %{}",
                name
            )));
        }
        if self.defined.contains_key(name) {
            return Err(Error::Domain(format!(
                "variable %{} is already defined",
                name
            )));
        }
        self.defined.insert(Arc::from(name), value);
        Ok(())
    }

    /// Snapshot of the defined-variable scope, for macro iteration.
    pub(crate) fn defined_scope(&self) -> HashMap<Arc<str>, Collection> {
        self.defined.clone()
    }

    pub(crate) fn restore_defined_scope(&mut self, scope: HashMap<Arc<str>, Collection>) {
        self.defined = scope;
    }

    /// Check the cancellation signal; fetch boundaries call this.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.signal.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn async_mode_parsing() {
        assert_eq!(AsyncMode::from_str("false").unwrap(), AsyncMode::Disallowed);
        assert_eq!(AsyncMode::from_str("true").unwrap(), AsyncMode::Allowed);
        assert_eq!(AsyncMode::from_str("always").unwrap(), AsyncMode::Always);
        assert!(AsyncMode::from_str("maybe").is_err());
        assert!(!AsyncMode::Disallowed.allows_suspension());
        assert!(AsyncMode::Always.allows_suspension());
    }

    #[test]
    fn defined_vars_shadowing_rules() {
        let mut ctx = EvalContext::new(Collection::empty());
        ctx.install_processed_vars();

        ctx.define_var("myVar", Collection::singleton(Value::integer(1)))
            .unwrap();
        assert_eq!(ctx.lookup_var("myVar").unwrap().len(), 1);

        // Redefinition fails
        assert!(ctx
            .define_var("myVar", Collection::singleton(Value::integer(2)))
            .is_err());
        // Shadowing a processed variable fails
        assert!(ctx
            .define_var("resource", Collection::empty())
            .is_err());
        // Unknown variables are an error
        assert!(matches!(
            ctx.lookup_var("nope"),
            Err(Error::UnknownVariable(_))
        ));
    }

    #[test]
    fn now_snapshot_is_stable() {
        let snapshot = NowSnapshot::capture();
        let a = snapshot.now_value();
        let b = snapshot.now_value();
        assert!(a.deep_equal(&b));
    }
}
