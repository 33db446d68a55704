//! Type tests: `is`, `as` and `ofType`
//!
//! Unqualified names check the System primitives and, for nodes, the
//! model's `type2Parent` chain. `System.`/`FHIR.` prefixes pin the
//! namespace.

use corten_model::Model;

use crate::compile::TypeName;
use crate::error::Result;
use crate::value::{Collection, Value, ValueData};
use serde_json::Value as JsonValue;

fn system_kind_name(value: &Value) -> Option<&'static str> {
    match value.data() {
        ValueData::Boolean(_) => Some("Boolean"),
        ValueData::Integer(_) => Some("Integer"),
        ValueData::Long(_) => Some("Long"),
        ValueData::Decimal(_) => Some("Decimal"),
        ValueData::String(_) => Some("String"),
        ValueData::Date { .. } => Some("Date"),
        ValueData::DateTime { .. } => Some("DateTime"),
        ValueData::Time { .. } => Some("Time"),
        ValueData::Quantity { .. } => Some("Quantity"),
        ValueData::Node(_) => None,
    }
}

/// Whether a node's raw JSON kind satisfies a System primitive name.
fn json_kind_matches(json: Option<&JsonValue>, name: &str) -> bool {
    match json {
        Some(JsonValue::String(_)) => name.eq_ignore_ascii_case("string"),
        Some(JsonValue::Bool(_)) => name.eq_ignore_ascii_case("boolean"),
        Some(JsonValue::Number(n)) => {
            if n.is_i64() || n.is_u64() {
                name.eq_ignore_ascii_case("integer") || name.eq_ignore_ascii_case("decimal")
            } else {
                name.eq_ignore_ascii_case("decimal")
            }
        }
        _ => false,
    }
}

/// Type test for one value.
pub fn value_is_type(value: &Value, type_name: &TypeName, model: Option<&Model>) -> bool {
    let ns = type_name.namespace.as_deref();
    let name = type_name.name.as_str();

    match value.data() {
        ValueData::Node(node) => {
            if ns == Some("System") {
                return json_kind_matches(node.data(), name);
            }

            let node_type = node.type_name();
            if node_type.eq_ignore_ascii_case(name) {
                return true;
            }
            if let Some(model) = model {
                if model.is_subtype_of(&node_type, name) {
                    return true;
                }
            }
            // Untyped primitive fallback for unqualified names.
            ns.is_none() && json_kind_matches(node.data(), name)
        }
        _ => {
            if ns == Some("FHIR") {
                return false;
            }
            system_kind_name(value)
                .map(|kind| kind.eq_ignore_ascii_case(name))
                .unwrap_or(false)
        }
    }
}

/// `ofType(T)`: keep the items satisfying the type test.
pub fn of_type(
    input: &Collection,
    type_name: &TypeName,
    model: Option<&Model>,
) -> Result<Collection> {
    Ok(input
        .iter()
        .filter(|item| value_is_type(item, type_name, model))
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ResourceNode;
    use corten_model::FhirVersion;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::sync::Arc;

    fn t(name: &str) -> TypeName {
        TypeName {
            namespace: None,
            name: name.into(),
        }
    }

    fn ns(namespace: &str, name: &str) -> TypeName {
        TypeName {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    #[test]
    fn system_primitives() {
        assert!(value_is_type(&Value::integer(5), &t("Integer"), None));
        assert!(value_is_type(&Value::integer(5), &ns("System", "Integer"), None));
        assert!(!value_is_type(&Value::integer(5), &t("Decimal"), None));
        assert!(value_is_type(
            &Value::decimal(Decimal::ONE),
            &t("Decimal"),
            None
        ));
        assert!(value_is_type(
            &Value::quantity(Decimal::ONE, "mg"),
            &t("Quantity"),
            None
        ));
        assert!(!value_is_type(&Value::integer(5), &ns("FHIR", "integer"), None));
    }

    #[test]
    fn node_type_with_model_hierarchy() {
        let model = Model::from_json(
            FhirVersion::R4,
            &json!({
                "type2Parent": {
                    "Patient": "DomainResource",
                    "DomainResource": "Resource"
                },
                "path2Type": {}
            }),
        )
        .unwrap();
        let node = Value::node(ResourceNode::from_resource(
            Arc::new(json!({"resourceType": "Patient"})),
            Some(&model),
        ));
        assert!(value_is_type(&node, &t("Patient"), Some(&model)));
        assert!(value_is_type(&node, &t("Resource"), Some(&model)));
        assert!(!value_is_type(&node, &t("Observation"), Some(&model)));
    }

    #[test]
    fn untyped_string_node_matches_string() {
        let node = Value::node(ResourceNode::detached(Arc::new(json!("Alice"))));
        assert!(value_is_type(&node, &t("string"), None));
        assert!(value_is_type(&node, &ns("System", "String"), None));
        assert!(!value_is_type(&node, &t("integer"), None));
    }

    #[test]
    fn of_type_filters() {
        let mixed = Collection::from_values(vec![
            Value::integer(1),
            Value::string("x"),
            Value::integer(2),
        ]);
        let out = of_type(&mixed, &t("Integer"), None).unwrap();
        assert_eq!(out.len(), 2);
    }
}
