//! Resource nodes: typed views over raw document fragments
//!
//! A `ResourceNode` wraps a piece of the input JSON together with the
//! dotted FHIR path that produced it, the model-resolved element type, a
//! back-reference to its parent node and (for array elements) its index.
//! Primitive elements carry their `_field` companion as `sibling` so that
//! extensions on primitives stay reachable.
//!
//! Nodes are created lazily during navigation and borrow the document
//! through `Arc`s; the input is never annotated or mutated.

use corten_model::Model;
use serde_json::Value as JsonValue;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ResourceNode {
    data: Option<Arc<JsonValue>>,
    sibling: Option<Arc<JsonValue>>,
    path: Option<Arc<str>>,
    data_type: Option<Arc<str>>,
    parent: Option<Arc<ResourceNode>>,
    index: Option<usize>,
}

impl ResourceNode {
    /// Root node over a parsed resource. The path starts at the
    /// document's `resourceType` when present.
    pub fn from_resource(data: Arc<JsonValue>, model: Option<&Model>) -> Self {
        let _ = model;
        let resource_type = data
            .get("resourceType")
            .and_then(|v| v.as_str())
            .map(Arc::<str>::from);
        Self {
            data: Some(data),
            sibling: None,
            path: resource_type.clone(),
            data_type: resource_type,
            parent: None,
            index: None,
        }
    }

    /// An untyped node with no path, used for environment variables and
    /// other values that enter evaluation from outside the resource.
    pub fn detached(data: Arc<JsonValue>) -> Self {
        Self {
            data: Some(data),
            sibling: None,
            path: None,
            data_type: None,
            parent: None,
            index: None,
        }
    }

    fn child(
        parent: &Arc<ResourceNode>,
        data: Option<Arc<JsonValue>>,
        sibling: Option<Arc<JsonValue>>,
        path: Option<Arc<str>>,
        data_type: Option<Arc<str>>,
        index: Option<usize>,
    ) -> Option<Self> {
        // A node must carry data or sibling metadata; never neither.
        if data.is_none() && sibling.is_none() {
            return None;
        }
        Some(Self {
            data,
            sibling,
            path,
            data_type,
            parent: Some(parent.clone()),
            index,
        })
    }

    pub fn data(&self) -> Option<&JsonValue> {
        self.data.as_deref()
    }

    pub fn data_arc(&self) -> Option<Arc<JsonValue>> {
        self.data.clone()
    }

    pub fn sibling(&self) -> Option<&JsonValue> {
        self.sibling.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn data_type(&self) -> Option<&str> {
        self.data_type.as_deref()
    }

    pub fn parent(&self) -> Option<&ResourceNode> {
        self.parent.as_deref()
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// The node's resource type when it wraps a whole resource.
    pub fn resource_type(&self) -> Option<&str> {
        self.data()?.get("resourceType")?.as_str()
    }

    /// Model/System type name for `types()` output and type tests.
    pub fn type_name(&self) -> String {
        if let Some(t) = self.data_type() {
            return t.to_string();
        }
        if let Some(rt) = self.resource_type() {
            return rt.to_string();
        }
        match self.data() {
            Some(JsonValue::String(_)) => "string".into(),
            Some(JsonValue::Bool(_)) => "boolean".into(),
            Some(JsonValue::Number(n)) if n.is_i64() || n.is_u64() => "integer".into(),
            Some(JsonValue::Number(_)) => "decimal".into(),
            Some(JsonValue::Object(_)) => "Element".into(),
            Some(JsonValue::Array(_)) => "Element".into(),
            _ => "Element".into(),
        }
    }

    /// The dotted path with recursive segments folded
    /// (`Questionnaire.item.item` → `Questionnaire.item`).
    fn canonical_path(&self, model: Option<&Model>) -> Option<String> {
        let path = self.path()?;
        match model {
            Some(m) => Some(m.canonical_path(path).to_string()),
            None => Some(path.to_string()),
        }
    }

    /// Navigate to the named child element(s).
    ///
    /// Choice-type fields probe the model's candidate suffixes
    /// (`value` → `valueQuantity`, …) until one exists in the document;
    /// the child's path records the concrete field. `_field` companions
    /// ride along as sibling metadata, covering indices where only the
    /// companion has content.
    pub fn child_by_name(&self, name: &str, model: Option<&Model>) -> Vec<ResourceNode> {
        let source = match self.data() {
            Some(JsonValue::Object(_)) => self.data(),
            // Primitive or absent data: `id`/`extension` live in `_field`.
            _ => self.sibling(),
        };
        let Some(JsonValue::Object(obj)) = source else {
            return Vec::new();
        };

        let parent = Arc::new(self.clone());
        let base = self.canonical_path(model);
        let child_path = base.as_ref().map(|b| format!("{}.{}", b, name));

        // Choice type: probe each candidate suffix until one exists.
        if let (Some(model), Some(child_path)) = (model, child_path.as_deref()) {
            if let Some(candidates) = model.choice_candidates(child_path) {
                for candidate in candidates {
                    let field = format!("{}{}", name, upper_first(candidate));
                    if obj.contains_key(&field) || obj.contains_key(&format!("_{}", field)) {
                        let concrete = format!(
                            "{}.{}",
                            base.as_deref().unwrap_or_default(),
                            field
                        );
                        return collect_field(
                            &parent,
                            obj,
                            &field,
                            Some(Arc::from(model.canonical_path(&concrete))),
                            Some(Arc::from(candidate.as_str())),
                        );
                    }
                }
                return Vec::new();
            }
        }

        let data_type: Option<Arc<str>> = match (model, child_path.as_deref()) {
            (Some(m), Some(p)) => m.type_of_path(m.canonical_path(p)).map(Arc::from),
            _ => None,
        };
        let stored_path: Option<Arc<str>> = match (model, child_path.as_deref()) {
            (Some(m), Some(p)) => Some(Arc::from(m.canonical_path(p))),
            (None, Some(p)) => Some(Arc::from(p)),
            _ => None,
        };

        collect_field(&parent, obj, name, stored_path, data_type)
    }

    /// All named children, skipping `resourceType` and harvesting
    /// underscore keys only when the plain counterpart is absent.
    pub fn all_children(&self, model: Option<&Model>) -> Vec<ResourceNode> {
        let Some(JsonValue::Object(obj)) = self.data() else {
            return Vec::new();
        };

        let mut names: Vec<&str> = Vec::new();
        for key in obj.keys() {
            if key == "resourceType" {
                continue;
            }
            if let Some(stripped) = key.strip_prefix('_') {
                if obj.contains_key(stripped) {
                    continue;
                }
                names.push(stripped);
            } else {
                names.push(key);
            }
        }

        let mut out = Vec::new();
        for name in names {
            out.extend(self.child_by_name(name, model));
        }
        out
    }
}

fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Build child nodes for one concrete field, pairing the `_field`
/// companion index-by-index. The companion array may be longer than the
/// primary, leaving nodes that carry only sibling metadata.
fn collect_field(
    parent: &Arc<ResourceNode>,
    obj: &serde_json::Map<String, JsonValue>,
    field: &str,
    path: Option<Arc<str>>,
    data_type: Option<Arc<str>>,
) -> Vec<ResourceNode> {
    let primary = obj.get(field);
    let companion = obj.get(&format!("_{}", field));

    let as_arc = |v: &JsonValue| -> Option<Arc<JsonValue>> {
        match v {
            JsonValue::Null => None,
            other => Some(Arc::new(other.clone())),
        }
    };

    match (primary, companion) {
        (Some(JsonValue::Array(items)), companion) => {
            let companion_items = match companion {
                Some(JsonValue::Array(c)) => c.as_slice(),
                _ => &[],
            };
            let len = items.len().max(companion_items.len());
            let mut out = Vec::with_capacity(len);
            for i in 0..len {
                let data = items.get(i).and_then(&as_arc);
                let sibling = companion_items.get(i).and_then(&as_arc);
                if let Some(node) = ResourceNode::child(
                    parent,
                    data,
                    sibling,
                    path.clone(),
                    data_type.clone(),
                    Some(i),
                ) {
                    out.push(node);
                }
            }
            out
        }
        (Some(value), companion) => ResourceNode::child(
            parent,
            as_arc(value),
            companion.and_then(&as_arc),
            path,
            data_type,
            None,
        )
        .into_iter()
        .collect(),
        (None, Some(companion)) => match companion {
            JsonValue::Array(companion_items) => {
                let mut out = Vec::with_capacity(companion_items.len());
                for (i, c) in companion_items.iter().enumerate() {
                    if let Some(node) = ResourceNode::child(
                        parent,
                        None,
                        as_arc(c),
                        path.clone(),
                        data_type.clone(),
                        Some(i),
                    ) {
                        out.push(node);
                    }
                }
                out
            }
            other => {
                ResourceNode::child(parent, None, as_arc(other), path, data_type, None)
                    .into_iter()
                    .collect()
            }
        },
        (None, None) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corten_model::FhirVersion;
    use serde_json::json;

    fn model() -> Model {
        Model::from_json(
            FhirVersion::R4,
            &json!({
                "choiceTypePaths": {
                    "Observation.value": ["Quantity", "CodeableConcept", "string"]
                },
                "pathsDefinedElsewhere": {
                    "Questionnaire.item.item": "Questionnaire.item"
                },
                "path2Type": {
                    "Patient.name": "HumanName",
                    "Observation.valueQuantity": "Quantity"
                },
                "type2Parent": {}
            }),
        )
        .unwrap()
    }

    #[test]
    fn navigates_plain_fields() {
        let model = model();
        let patient = ResourceNode::from_resource(
            Arc::new(json!({
                "resourceType": "Patient",
                "name": [{"given": ["Alice", "A."]}, {"given": ["Bob"]}]
            })),
            Some(&model),
        );
        let names = patient.child_by_name("name", Some(&model));
        assert_eq!(names.len(), 2);
        assert_eq!(names[0].path(), Some("Patient.name"));
        assert_eq!(names[0].data_type(), Some("HumanName"));
        assert_eq!(names[0].index(), Some(0));

        let given = names[0].child_by_name("given", Some(&model));
        assert_eq!(given.len(), 2);
        assert_eq!(given[0].data().unwrap(), &json!("Alice"));
    }

    #[test]
    fn choice_type_probe_resolves_concrete_field() {
        let model = model();
        let obs = ResourceNode::from_resource(
            Arc::new(json!({
                "resourceType": "Observation",
                "valueQuantity": {"value": 5, "unit": "mg"}
            })),
            Some(&model),
        );
        let value = obs.child_by_name("value", Some(&model));
        assert_eq!(value.len(), 1);
        assert_eq!(value[0].path(), Some("Observation.valueQuantity"));
        assert_eq!(value[0].data_type(), Some("Quantity"));

        // Direct access by the concrete name still works.
        let direct = obs.child_by_name("valueQuantity", Some(&model));
        assert_eq!(direct.len(), 1);
    }

    #[test]
    fn recursive_paths_are_canonicalized() {
        let model = model();
        let questionnaire = ResourceNode::from_resource(
            Arc::new(json!({
                "resourceType": "Questionnaire",
                "item": [{"linkId": "a", "item": [{"linkId": "a.1"}]}]
            })),
            Some(&model),
        );
        let items = questionnaire.child_by_name("item", Some(&model));
        let nested = items[0].child_by_name("item", Some(&model));
        assert_eq!(nested[0].path(), Some("Questionnaire.item"));
    }

    #[test]
    fn underscore_companion_rides_along() {
        let patient = ResourceNode::from_resource(
            Arc::new(json!({
                "resourceType": "Patient",
                "birthDate": "1974-12-25",
                "_birthDate": {"extension": [{"url": "u", "valueDateTime": "1974-12-25T14:35:45"}]}
            })),
            None,
        );
        let birth = patient.child_by_name("birthDate", None);
        assert_eq!(birth.len(), 1);
        assert!(birth[0].sibling().is_some());

        // The companion's extension is navigable from the primitive node.
        let ext = birth[0].child_by_name("extension", None);
        assert_eq!(ext.len(), 1);
    }

    #[test]
    fn companion_only_indices_produce_nodes() {
        let patient = ResourceNode::from_resource(
            Arc::new(json!({
                "resourceType": "Patient",
                "given": ["Alice"],
                "_given": [null, {"extension": []}]
            })),
            None,
        );
        let given = patient.child_by_name("given", None);
        assert_eq!(given.len(), 2);
        assert!(given[0].data().is_some());
        assert!(given[1].data().is_none());
        assert!(given[1].sibling().is_some());
    }

    #[test]
    fn all_children_skips_bookkeeping_keys() {
        let patient = ResourceNode::from_resource(
            Arc::new(json!({
                "resourceType": "Patient",
                "active": true,
                "_active": {"id": "x"},
                "_status": {"extension": []}
            })),
            None,
        );
        let children = patient.all_children(None);
        // active (with companion) and the orphaned _status container
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn parent_chain_is_walkable() {
        let patient = ResourceNode::from_resource(
            Arc::new(json!({"resourceType": "Patient", "name": [{"family": "Chalmers"}]})),
            None,
        );
        let name = patient.child_by_name("name", None);
        let family = name[0].child_by_name("family", None);
        assert_eq!(
            family[0].parent().unwrap().parent().unwrap().resource_type(),
            Some("Patient")
        );
    }
}
