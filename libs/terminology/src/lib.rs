//! FHIR terminology-server client
//!
//! Resolves item weights (ordinal values) for codes from a terminology
//! server, for the FHIRPath `weight()`/`ordinal()` functions. Responses
//! and resolved scores are cached for one hour; both caches tolerate
//! duplicate writes and are shared across evaluations through the client.

mod error;

pub use error::{Error, Result};

use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const CACHE_TTL: Duration = Duration::from_secs(3600);

/// Cooperative cancellation handle, checked at every fetch boundary.
#[derive(Clone, Debug, Default)]
pub struct CancelSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Cache key for a resolved score, per the engine's caching contract.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScoreKey {
    pub model_version: String,
    pub questionnaire: String,
    pub terminology_url: String,
    pub value_set_url: String,
    pub code: String,
    pub system: String,
}

struct TtlCache<K, V> {
    entries: HashMap<K, (Instant, V)>,
}

impl<K: std::hash::Hash + Eq, V: Clone> TtlCache<K, V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        let (stamp, value) = self.entries.get(key)?;
        if stamp.elapsed() > CACHE_TTL {
            return None;
        }
        Some(value.clone())
    }

    fn put(&mut self, key: K, value: V) {
        self.entries.insert(key, (Instant::now(), value));
    }
}

/// Client for a FHIR terminology server.
pub struct TerminologyClient {
    client: reqwest::Client,
    base_url: String,
    fetch_cache: Mutex<TtlCache<String, Arc<JsonValue>>>,
    score_cache: Mutex<TtlCache<ScoreKey, Option<Decimal>>>,
}

impl TerminologyClient {
    /// Create a client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self {
            client,
            base_url,
            fetch_cache: Mutex::new(TtlCache::new()),
            score_cache: Mutex::new(TtlCache::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET a JSON payload, going through the one-hour fetch cache.
    pub async fn fetch_json(&self, url: &str, signal: &CancelSignal) -> Result<Arc<JsonValue>> {
        if signal.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(hit) = self.fetch_cache.lock().unwrap().get(&url.to_string()) {
            return Ok(hit);
        }

        let response = self.client.get(url).send().await?;
        if signal.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if !response.status().is_success() {
            return Err(Error::Terminology(format!(
                "GET {} failed with status {}",
                url,
                response.status()
            )));
        }
        let payload: JsonValue = response.json().await?;
        let payload = Arc::new(payload);
        self.fetch_cache
            .lock()
            .unwrap()
            .put(url.to_string(), payload.clone());
        Ok(payload)
    }

    /// Resolve the weight of a coded value, consulting the score cache first.
    ///
    /// Looks in the value set (compose + expansion) when `value_set_url` is
    /// given, then falls back to a CodeSystem `$lookup` for the property
    /// named by `property_uri`.
    #[allow(clippy::too_many_arguments)]
    pub async fn resolve_weight(
        &self,
        key: ScoreKey,
        extension_uris: &[String],
        property_uri: &str,
        signal: &CancelSignal,
    ) -> Result<Option<Decimal>> {
        if let Some(hit) = self.score_cache.lock().unwrap().get(&key) {
            return Ok(hit);
        }

        let mut weight = None;
        if !key.value_set_url.is_empty() {
            weight = self
                .value_set_weight(&key.value_set_url, &key.code, &key.system, extension_uris, signal)
                .await?;
        }
        if weight.is_none() && !key.system.is_empty() {
            weight = self
                .code_system_weight(&key.system, &key.code, property_uri, signal)
                .await?;
        }

        self.score_cache.lock().unwrap().put(key, weight);
        Ok(weight)
    }

    async fn value_set_weight(
        &self,
        value_set_url: &str,
        code: &str,
        system: &str,
        extension_uris: &[String],
        signal: &CancelSignal,
    ) -> Result<Option<Decimal>> {
        let url = format!(
            "{}/ValueSet?url={}",
            self.base_url,
            urlencoding::encode(value_set_url)
        );
        let bundle = self.fetch_json(&url, signal).await?;

        let entries = bundle
            .get("entry")
            .and_then(|e| e.as_array())
            .map(|v| v.as_slice())
            .unwrap_or(&[]);
        for entry in entries {
            let Some(resource) = entry.get("resource") else {
                continue;
            };
            if let Some(w) = value_set_concept_weight(resource, code, system, extension_uris) {
                return Ok(Some(w));
            }
        }
        Ok(None)
    }

    async fn code_system_weight(
        &self,
        system: &str,
        code: &str,
        property_uri: &str,
        signal: &CancelSignal,
    ) -> Result<Option<Decimal>> {
        // Property codes are the fragment of the property URI
        // (…concept-properties#itemWeight → itemWeight).
        let property = property_uri.rsplit('#').next().unwrap_or(property_uri);
        let url = format!(
            "{}/CodeSystem/$lookup?system={}&code={}&property={}",
            self.base_url,
            urlencoding::encode(system),
            urlencoding::encode(code),
            urlencoding::encode(property)
        );
        let parameters = match self.fetch_json(&url, signal).await {
            Ok(p) => p,
            // An unknown code is a missing weight, not a failure.
            Err(Error::Terminology(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(lookup_property_value(&parameters, property))
    }
}

fn value_set_concept_weight(
    resource: &JsonValue,
    code: &str,
    system: &str,
    extension_uris: &[String],
) -> Option<Decimal> {
    let includes = resource
        .get("compose")
        .and_then(|c| c.get("include"))
        .and_then(|i| i.as_array());
    if let Some(includes) = includes {
        for include in includes {
            let include_system = include.get("system").and_then(|s| s.as_str()).unwrap_or("");
            if !system.is_empty() && !include_system.is_empty() && include_system != system {
                continue;
            }
            if let Some(concepts) = include.get("concept").and_then(|c| c.as_array()) {
                if let Some(w) = concepts_weight(concepts, code, extension_uris) {
                    return Some(w);
                }
            }
        }
    }

    let contains = resource
        .get("expansion")
        .and_then(|e| e.get("contains"))
        .and_then(|c| c.as_array());
    if let Some(contains) = contains {
        for concept in contains {
            let concept_system = concept.get("system").and_then(|s| s.as_str()).unwrap_or("");
            if !system.is_empty() && !concept_system.is_empty() && concept_system != system {
                continue;
            }
            if concept.get("code").and_then(|c| c.as_str()) == Some(code) {
                if let Some(w) = extension_weight(concept, extension_uris) {
                    return Some(w);
                }
            }
        }
    }

    None
}

fn concepts_weight(concepts: &[JsonValue], code: &str, extension_uris: &[String]) -> Option<Decimal> {
    for concept in concepts {
        if concept.get("code").and_then(|c| c.as_str()) == Some(code) {
            if let Some(w) = extension_weight(concept, extension_uris) {
                return Some(w);
            }
        }
        // Nested concept hierarchies appear in larger code systems.
        if let Some(children) = concept.get("concept").and_then(|c| c.as_array()) {
            if let Some(w) = concepts_weight(children, code, extension_uris) {
                return Some(w);
            }
        }
    }
    None
}

/// Pull a weight from an element's extension array, matching any of the
/// configured itemWeight/ordinalValue URIs.
pub fn extension_weight(element: &JsonValue, extension_uris: &[String]) -> Option<Decimal> {
    let extensions = element.get("extension")?.as_array()?;
    for ext in extensions {
        let url = ext.get("url").and_then(|u| u.as_str())?;
        if extension_uris.iter().any(|candidate| candidate == url) {
            if let Some(v) = ext.get("valueDecimal") {
                return json_number_to_decimal(v);
            }
            if let Some(v) = ext.get("valueInteger") {
                return json_number_to_decimal(v);
            }
        }
    }
    None
}

fn lookup_property_value(parameters: &JsonValue, property: &str) -> Option<Decimal> {
    let params = parameters.get("parameter")?.as_array()?;
    for param in params {
        if param.get("name").and_then(|n| n.as_str()) != Some("property") {
            continue;
        }
        let parts = param.get("part").and_then(|p| p.as_array())?;
        let is_target = parts.iter().any(|part| {
            part.get("name").and_then(|n| n.as_str()) == Some("code")
                && part.get("valueCode").and_then(|c| c.as_str()) == Some(property)
        });
        if !is_target {
            continue;
        }
        for part in parts {
            if part.get("name").and_then(|n| n.as_str()) == Some("value") {
                for key in ["valueDecimal", "valueInteger"] {
                    if let Some(v) = part.get(key) {
                        return json_number_to_decimal(v);
                    }
                }
            }
        }
    }
    None
}

fn json_number_to_decimal(value: &JsonValue) -> Option<Decimal> {
    match value {
        JsonValue::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        JsonValue::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const WEIGHT_URI: &str = "http://hl7.org/fhir/StructureDefinition/itemWeight";

    #[test]
    fn cancel_signal_round_trip() {
        let signal = CancelSignal::new();
        assert!(!signal.is_cancelled());
        signal.cancel();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn extracts_weight_from_extension() {
        let concept = json!({
            "code": "strongly-agree",
            "extension": [
                { "url": WEIGHT_URI, "valueDecimal": 5 }
            ]
        });
        let w = extension_weight(&concept, &[WEIGHT_URI.to_string()]).unwrap();
        assert_eq!(w, Decimal::from(5));
    }

    #[test]
    fn value_set_compose_lookup() {
        let value_set = json!({
            "resourceType": "ValueSet",
            "compose": {
                "include": [{
                    "system": "http://example.org/cs",
                    "concept": [
                        { "code": "a", "extension": [{ "url": WEIGHT_URI, "valueDecimal": 1 }] },
                        { "code": "b", "extension": [{ "url": WEIGHT_URI, "valueDecimal": 2 }] }
                    ]
                }]
            }
        });
        let w = value_set_concept_weight(
            &value_set,
            "b",
            "http://example.org/cs",
            &[WEIGHT_URI.to_string()],
        )
        .unwrap();
        assert_eq!(w, Decimal::from(2));
    }

    #[test]
    fn lookup_parameters_parsing() {
        let parameters = json!({
            "resourceType": "Parameters",
            "parameter": [{
                "name": "property",
                "part": [
                    { "name": "code", "valueCode": "itemWeight" },
                    { "name": "value", "valueDecimal": 3.5 }
                ]
            }]
        });
        let w = lookup_property_value(&parameters, "itemWeight").unwrap();
        assert_eq!(w, Decimal::from_str("3.5").unwrap());
    }

    #[test]
    fn ttl_cache_returns_fresh_entries() {
        let mut cache: TtlCache<String, i32> = TtlCache::new();
        cache.put("k".to_string(), 7);
        assert_eq!(cache.get(&"k".to_string()), Some(7));
        assert_eq!(cache.get(&"missing".to_string()), None);
    }
}
