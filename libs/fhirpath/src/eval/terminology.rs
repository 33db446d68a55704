//! SDC scoring: `weight()` / `ordinal()`
//!
//! Resolves the item weight of coded values, in order of preference:
//! an itemWeight extension on the value itself, the matching
//! `%questionnaire` answer option, then the configured terminology
//! server (asynchronously, through the one-hour score cache).

use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use corten_model::ScoreMetadata;
use corten_terminology::{extension_weight, ScoreKey};

use crate::context::EvalContext;
use crate::error::{Error, Result};
use crate::node::ResourceNode;
use crate::value::{Collection, Value, ValueData};

/// linkId → questionnaire item, built once per questionnaire document and
/// reused across evaluations (keyed by the document's allocation, with a
/// weak handle to invalidate on drop).
static LINK_ID_INDEX: Lazy<Mutex<HashMap<usize, (Weak<JsonValue>, Arc<HashMap<String, JsonValue>>)>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn link_id_index(questionnaire: &Arc<JsonValue>) -> Arc<HashMap<String, JsonValue>> {
    let key = Arc::as_ptr(questionnaire) as usize;
    let mut cache = LINK_ID_INDEX.lock().unwrap();

    if let Some((weak, index)) = cache.get(&key) {
        if let Some(live) = weak.upgrade() {
            if Arc::ptr_eq(&live, questionnaire) {
                return index.clone();
            }
        }
    }

    let mut index = HashMap::new();
    collect_items(questionnaire.get("item"), &mut index);
    let index = Arc::new(index);
    cache.retain(|_, (weak, _)| weak.strong_count() > 0);
    cache.insert(key, (Arc::downgrade(questionnaire), index.clone()));
    index
}

fn collect_items(items: Option<&JsonValue>, index: &mut HashMap<String, JsonValue>) {
    let Some(JsonValue::Array(items)) = items else {
        return;
    };
    for item in items {
        if let Some(link_id) = item.get("linkId").and_then(|l| l.as_str()) {
            index.insert(link_id.to_string(), item.clone());
        }
        collect_items(item.get("item"), index);
    }
}

/// The coded content of a weight() operand.
struct CodedValue {
    code: String,
    system: String,
}

fn coded_value(json: &JsonValue) -> Option<CodedValue> {
    match json {
        JsonValue::String(s) => Some(CodedValue {
            code: s.clone(),
            system: String::new(),
        }),
        JsonValue::Object(obj) => {
            if let Some(code) = obj.get("code").and_then(|c| c.as_str()) {
                return Some(CodedValue {
                    code: code.to_string(),
                    system: obj
                        .get("system")
                        .and_then(|s| s.as_str())
                        .unwrap_or_default()
                        .to_string(),
                });
            }
            if let Some(JsonValue::Array(codings)) = obj.get("coding") {
                for coding in codings {
                    if let Some(found) = coded_value(coding) {
                        return Some(found);
                    }
                }
            }
            None
        }
        _ => None,
    }
}

/// The linkId of the enclosing questionnaire(-response) item, found by
/// walking the node's parent chain.
fn enclosing_link_id(node: &ResourceNode) -> Option<String> {
    let mut current = Some(node);
    while let Some(n) = current {
        if let Some(link_id) = n.data().and_then(|d| d.get("linkId")).and_then(|l| l.as_str()) {
            return Some(link_id.to_string());
        }
        current = n.parent();
    }
    None
}

/// Match an answerOption's value[x] against a coded value.
fn option_matches(option: &JsonValue, coded: &CodedValue) -> bool {
    if let Some(coding) = option.get("valueCoding") {
        if coding.get("code").and_then(|c| c.as_str()) == Some(coded.code.as_str()) {
            let system = coding.get("system").and_then(|s| s.as_str()).unwrap_or("");
            return coded.system.is_empty() || system.is_empty() || system == coded.system;
        }
        return false;
    }
    for key in ["valueString", "valueInteger", "valueDate", "valueTime"] {
        if let Some(v) = option.get(key) {
            let text = match v {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            return text == coded.code;
        }
    }
    false
}

fn option_weight(option: &JsonValue, uris: &[String]) -> Option<Decimal> {
    if let Some(w) = extension_weight(option, uris) {
        return Some(w);
    }
    option
        .get("valueCoding")
        .and_then(|coding| extension_weight(coding, uris))
}

pub async fn weight(input: &Collection, ctx: &EvalContext) -> Result<Collection> {
    let model = ctx
        .model
        .as_ref()
        .ok_or_else(|| Error::Domain("weight() requires a model".into()))?;
    let score: &ScoreMetadata = model.score().ok_or_else(|| {
        Error::Domain("weight() requires a model with item weight metadata".into())
    })?;

    let mut out = Collection::empty();
    for item in input.iter() {
        ctx.check_cancelled()?;
        if let Some(w) = item_weight(item, ctx, score).await? {
            out.push(decimal_value(w));
        }
    }
    Ok(out)
}

fn decimal_value(d: Decimal) -> Value {
    if d.scale() == 0 {
        match d.to_string().parse::<i64>() {
            Ok(i) => Value::integer(i),
            Err(_) => Value::decimal(d),
        }
    } else {
        Value::decimal(d)
    }
}

async fn item_weight(
    item: &Value,
    ctx: &EvalContext,
    score: &ScoreMetadata,
) -> Result<Option<Decimal>> {
    let ValueData::Node(node) = item.data() else {
        return Ok(None);
    };

    // 1. The value itself (or its primitive companion) may carry the
    //    extension directly.
    if let Some(json) = node.data() {
        if let Some(w) = extension_weight(json, &score.extension_uris) {
            return Ok(Some(w));
        }
    }
    if let Some(sibling) = node.sibling() {
        if let Some(w) = extension_weight(sibling, &score.extension_uris) {
            return Ok(Some(w));
        }
    }

    let Some(coded) = node.data().and_then(coded_value) else {
        return Ok(None);
    };

    // 2. The matching answer option in %questionnaire.
    let mut answer_value_set = String::new();
    if let Some(questionnaire) = &ctx.questionnaire {
        if let Some(link_id) = enclosing_link_id(node) {
            let index = link_id_index(questionnaire);
            if let Some(q_item) = index.get(&link_id) {
                if let Some(JsonValue::Array(options)) = q_item.get("answerOption") {
                    for option in options {
                        if option_matches(option, &coded) {
                            if let Some(w) = option_weight(option, &score.extension_uris) {
                                return Ok(Some(w));
                            }
                        }
                    }
                }
                if let Some(vs) = q_item.get("answerValueSet").and_then(|v| v.as_str()) {
                    answer_value_set = vs.to_string();
                }
            }
        }
    }

    // 3. The terminology server.
    let Some(client) = &ctx.terminology else {
        return Ok(None);
    };
    let model_version = ctx
        .model
        .as_ref()
        .map(|m| m.version().to_string())
        .unwrap_or_default();
    let questionnaire_key = ctx
        .questionnaire
        .as_ref()
        .and_then(|q| {
            q.get("url")
                .or_else(|| q.get("id"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_default();

    let key = ScoreKey {
        model_version,
        questionnaire: questionnaire_key,
        terminology_url: client.base_url().to_string(),
        value_set_url: answer_value_set,
        code: coded.code,
        system: coded.system,
    };

    client
        .resolve_weight(key, &score.extension_uris, &score.property_uri, &ctx.signal)
        .await
        .map_err(|e| match e {
            corten_terminology::Error::Cancelled => Error::Cancelled,
            other => Error::Domain(format!("terminology lookup failed: {}", other)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const WEIGHT_URI: &str = "http://hl7.org/fhir/StructureDefinition/itemWeight";

    #[test]
    fn coded_value_extraction() {
        let coding = json!({"code": "a", "system": "http://example.org"});
        let c = coded_value(&coding).unwrap();
        assert_eq!(c.code, "a");
        assert_eq!(c.system, "http://example.org");

        let concept = json!({"coding": [{"code": "b"}]});
        assert_eq!(coded_value(&concept).unwrap().code, "b");

        let plain = json!("c");
        assert_eq!(coded_value(&plain).unwrap().code, "c");

        assert!(coded_value(&json!(42)).is_none());
    }

    #[test]
    fn option_matching() {
        let coded = CodedValue {
            code: "agree".into(),
            system: "http://example.org".into(),
        };
        let option = json!({
            "valueCoding": {"code": "agree", "system": "http://example.org"},
            "extension": [{"url": WEIGHT_URI, "valueDecimal": 4}]
        });
        assert!(option_matches(&option, &coded));
        assert_eq!(
            option_weight(&option, &[WEIGHT_URI.to_string()]).unwrap(),
            Decimal::from(4)
        );

        let other = json!({"valueCoding": {"code": "disagree"}});
        assert!(!option_matches(&other, &coded));
    }

    #[test]
    fn link_id_index_covers_nested_items() {
        let questionnaire = Arc::new(json!({
            "resourceType": "Questionnaire",
            "item": [
                {"linkId": "1", "item": [{"linkId": "1.1"}]},
                {"linkId": "2"}
            ]
        }));
        let index = link_id_index(&questionnaire);
        assert!(index.contains_key("1"));
        assert!(index.contains_key("1.1"));
        assert!(index.contains_key("2"));

        // Second lookup reuses the cached index.
        let again = link_id_index(&questionnaire);
        assert!(Arc::ptr_eq(&index, &again));
    }
}
