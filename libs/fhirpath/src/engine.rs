//! The FHIRPath engine: compile, cache, evaluate
//!
//! `evaluate` is the synchronous entry point; it drives the async walker
//! with suspension disallowed, so reaching a terminology function raises
//! `AsyncDisallowed` instead of blocking. `evaluate_async` enables the
//! terminology functions. Compiled expressions are cached by source text.

use chrono::{DateTime, FixedOffset};
use lru::LruCache;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use corten_model::Model;
use corten_terminology::{CancelSignal, TerminologyClient};

use crate::compile::CompiledExpression;
use crate::context::{AsyncMode, EvalContext, NowSnapshot, TraceFn};
use crate::error::Result;
use crate::eval;
use crate::node::ResourceNode;
use crate::registry::UserInvocationTable;
use crate::value::{Collection, Value};

const EXPRESSION_CACHE_SIZE: usize = 1000;

/// Per-evaluation options.
#[derive(Clone, Default)]
pub struct EvalOptions {
    /// External environment variables (`%name` → JSON value).
    pub vars: HashMap<String, JsonValue>,
    /// Async capability; terminology functions require `Allowed`/`Always`.
    pub async_mode: AsyncMode,
    /// Cancellation handle checked at fetch boundaries.
    pub signal: Option<CancelSignal>,
    /// Custom sink for `trace()`.
    pub trace: Option<TraceFn>,
    /// Pin the `now()`/`today()`/`timeOfDay()` snapshot (test hook).
    pub now: Option<DateTime<FixedOffset>>,
    /// The questionnaire backing `%questionnaire` and `weight()`.
    pub questionnaire: Option<Arc<JsonValue>>,
}

/// The engine: model, caches, terminology access and the user function
/// table.
pub struct Engine {
    model: Option<Arc<Model>>,
    terminology: Option<Arc<TerminologyClient>>,
    user_table: Option<Arc<UserInvocationTable>>,
    cache: Mutex<LruCache<String, Arc<CompiledExpression>>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            model: None,
            terminology: None,
            user_table: None,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(EXPRESSION_CACHE_SIZE).unwrap(),
            )),
        }
    }

    pub fn with_model(mut self, model: Model) -> Self {
        self.model = Some(Arc::new(model));
        self
    }

    /// Configure the terminology server used by `weight()`/`ordinal()`.
    pub fn with_terminology_url(mut self, url: impl Into<String>) -> Result<Self> {
        let client = TerminologyClient::new(url.into())
            .map_err(|e| crate::error::Error::Domain(format!("terminology client: {}", e)))?;
        self.terminology = Some(Arc::new(client));
        Ok(self)
    }

    /// Install user-defined functions; same arity surface as built-ins.
    pub fn with_user_table(mut self, table: UserInvocationTable) -> Self {
        self.user_table = Some(Arc::new(table));
        self
    }

    pub fn model(&self) -> Option<&Model> {
        self.model.as_deref()
    }

    /// Compile an expression, going through the source-text cache.
    pub fn compile(&self, source: &str) -> Result<Arc<CompiledExpression>> {
        {
            let mut cache = self.cache.lock().unwrap();
            if let Some(hit) = cache.get(source) {
                return Ok(hit.clone());
            }
        }
        let compiled = Arc::new(CompiledExpression::compile(
            source,
            self.user_table.as_deref(),
        )?);
        self.cache
            .lock()
            .unwrap()
            .put(source.to_string(), compiled.clone());
        Ok(compiled)
    }

    /// Synchronous evaluation. Terminology functions error with
    /// `AsyncDisallowed` here; everything else never suspends, so driving
    /// the walker to completion is a plain poll.
    pub fn evaluate(
        &self,
        resource: &JsonValue,
        expression: &str,
        options: &EvalOptions,
    ) -> Result<Collection> {
        let compiled = self.compile(expression)?;
        self.evaluate_compiled(resource, &compiled, options)
    }

    pub fn evaluate_compiled(
        &self,
        resource: &JsonValue,
        compiled: &CompiledExpression,
        options: &EvalOptions,
    ) -> Result<Collection> {
        let mut ctx = self.build_context(resource, options, AsyncMode::Disallowed);
        let root = ctx.root.clone();
        futures::executor::block_on(eval::eval(&compiled.root, root, &mut ctx))
    }

    /// Asynchronous evaluation: enables the terminology functions.
    pub async fn evaluate_async(
        &self,
        resource: &JsonValue,
        expression: &str,
        options: &EvalOptions,
    ) -> Result<Collection> {
        let compiled = self.compile(expression)?;
        self.evaluate_compiled_async(resource, &compiled, options)
            .await
    }

    pub async fn evaluate_compiled_async(
        &self,
        resource: &JsonValue,
        compiled: &CompiledExpression,
        options: &EvalOptions,
    ) -> Result<Collection> {
        let mode = match options.async_mode {
            AsyncMode::Disallowed => AsyncMode::Allowed,
            other => other,
        };
        let mut ctx = self.build_context(resource, options, mode);
        let root = ctx.root.clone();
        eval::eval(&compiled.root, root, &mut ctx).await
    }

    fn build_context(
        &self,
        resource: &JsonValue,
        options: &EvalOptions,
        async_mode: AsyncMode,
    ) -> EvalContext {
        let root_node =
            ResourceNode::from_resource(Arc::new(resource.clone()), self.model.as_deref());
        let root = Collection::singleton(Value::node(root_node));

        let mut ctx = EvalContext::new(root);
        ctx.model = self.model.clone();
        ctx.async_mode = async_mode;
        ctx.terminology = self.terminology.clone();
        ctx.questionnaire = options.questionnaire.clone();
        if let Some(signal) = &options.signal {
            ctx.signal = signal.clone();
        }
        if let Some(now) = options.now {
            ctx.now = NowSnapshot::at(now);
        }
        ctx.trace = options.trace.clone();
        ctx.install_processed_vars();

        for (name, json) in &options.vars {
            ctx.set_env_var(name.as_str(), json_to_collection(json, self.model.as_deref()));
        }

        ctx
    }
}

/// Lower an environment-variable JSON value into a collection: primitives
/// become System values, complex values become detached nodes, arrays
/// spread into the collection.
fn json_to_collection(json: &JsonValue, model: Option<&Model>) -> Collection {
    let _ = model;
    match json {
        JsonValue::Null => Collection::empty(),
        JsonValue::Bool(b) => Collection::singleton(Value::boolean(*b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Collection::singleton(Value::integer(i))
            } else {
                n.to_string()
                    .parse()
                    .map(|d| Collection::singleton(Value::decimal(d)))
                    .unwrap_or_default()
            }
        }
        JsonValue::String(s) => Collection::singleton(Value::string(s.as_str())),
        JsonValue::Array(items) => items
            .iter()
            .map(|item| match item {
                JsonValue::Bool(b) => Value::boolean(*b),
                JsonValue::Number(n) if n.is_i64() => Value::integer(n.as_i64().unwrap()),
                JsonValue::String(s) => Value::string(s.as_str()),
                other => Value::node(ResourceNode::detached(Arc::new(other.clone()))),
            })
            .collect(),
        other => Collection::singleton(Value::node(ResourceNode::detached(Arc::new(
            other.clone(),
        )))),
    }
}

/// Inferred type names for each result position.
pub fn types(collection: &Collection) -> Vec<String> {
    collection.iter().map(|v| v.type_name()).collect()
}

/// Lower a result collection to plain JSON, unwrapping the internal
/// value types (the `resolveInternalTypes` post-processor).
pub fn resolve_internal_types(collection: &Collection) -> Vec<JsonValue> {
    collection.iter().map(|v| v.to_json()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn evaluates_simple_paths() {
        let engine = Engine::new();
        let patient = json!({
            "resourceType": "Patient",
            "name": [{"given": ["Alice", "A."]}, {"given": ["Bob"]}]
        });
        let out = engine
            .evaluate(&patient, "Patient.name.given", &EvalOptions::default())
            .unwrap();
        let json = resolve_internal_types(&out);
        assert_eq!(json, vec![json!("Alice"), json!("A."), json!("Bob")]);
    }

    #[test]
    fn compile_cache_reuses_expressions() {
        let engine = Engine::new();
        let a = engine.compile("1 + 1").unwrap();
        let b = engine.compile("1 + 1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn terminology_functions_require_async() {
        let engine = Engine::new();
        let out = engine.evaluate(&json!({}), "weight()", &EvalOptions::default());
        // weight() is nullable, but the input here is the resource root,
        // so the async gate fires first.
        assert!(matches!(
            out,
            Err(crate::error::Error::AsyncDisallowed(_))
        ));
    }

    #[test]
    fn env_vars_flow_into_the_context() {
        let engine = Engine::new();
        let mut options = EvalOptions::default();
        options.vars.insert("limit".into(), json!(2));
        let out = engine
            .evaluate(&json!({}), "%limit + 1", &options)
            .unwrap();
        assert_eq!(out.as_integer().unwrap(), 3);
    }

    #[test]
    fn unknown_env_var_is_an_error() {
        let engine = Engine::new();
        let out = engine.evaluate(&json!({}), "%nope", &EvalOptions::default());
        assert!(matches!(
            out,
            Err(crate::error::Error::UnknownVariable(_))
        ));
    }
}
