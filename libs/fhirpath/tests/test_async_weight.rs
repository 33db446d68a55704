//! Asynchronous evaluation and SDC weight resolution from a
//! questionnaire's answer options (no terminology server required).

use corten_fhirpath::{resolve_internal_types, Engine, EvalOptions, Error};
use corten_model::{FhirVersion, Model};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

const WEIGHT_URI: &str = "http://hl7.org/fhir/StructureDefinition/itemWeight";

fn model() -> Model {
    Model::from_json(
        FhirVersion::R5,
        &json!({
            "choiceTypePaths": {
                "QuestionnaireResponse.item.answer.value": ["Coding", "string", "integer"]
            },
            "pathsDefinedElsewhere": {
                "QuestionnaireResponse.item.item": "QuestionnaireResponse.item",
                "QuestionnaireResponse.item.answer.item": "QuestionnaireResponse.item"
            },
            "type2Parent": {},
            "path2Type": {},
            "score": {
                "extensionURI": [WEIGHT_URI],
                "propertyURI": "http://hl7.org/fhir/concept-properties#itemWeight",
                "version": "r5"
            }
        }),
    )
    .unwrap()
}

fn questionnaire() -> Arc<JsonValue> {
    Arc::new(json!({
        "resourceType": "Questionnaire",
        "url": "http://example.org/q1",
        "item": [{
            "linkId": "satisfaction",
            "type": "choice",
            "answerOption": [
                {
                    "valueCoding": {"code": "agree", "system": "http://example.org/cs"},
                    "extension": [{"url": WEIGHT_URI, "valueDecimal": 4}]
                },
                {
                    "valueCoding": {"code": "disagree", "system": "http://example.org/cs"},
                    "extension": [{"url": WEIGHT_URI, "valueDecimal": 1}]
                }
            ]
        }]
    }))
}

fn response() -> JsonValue {
    json!({
        "resourceType": "QuestionnaireResponse",
        "questionnaire": "http://example.org/q1",
        "item": [{
            "linkId": "satisfaction",
            "answer": [{"valueCoding": {"code": "agree", "system": "http://example.org/cs"}}]
        }]
    })
}

#[tokio::test]
async fn weight_resolves_from_answer_options() {
    let engine = Engine::new().with_model(model());
    let options = EvalOptions {
        questionnaire: Some(questionnaire()),
        ..Default::default()
    };
    let out = engine
        .evaluate_async(
            &response(),
            "QuestionnaireResponse.item.answer.value.weight()",
            &options,
        )
        .await
        .unwrap();
    assert_eq!(resolve_internal_types(&out), vec![json!(4)]);
}

#[tokio::test]
async fn ordinal_is_an_alias() {
    let engine = Engine::new().with_model(model());
    let options = EvalOptions {
        questionnaire: Some(questionnaire()),
        ..Default::default()
    };
    let out = engine
        .evaluate_async(
            &response(),
            "QuestionnaireResponse.item.answer.value.ordinal().sum()",
            &options,
        )
        .await
        .unwrap();
    assert_eq!(resolve_internal_types(&out), vec![json!(4)]);
}

#[tokio::test]
async fn weight_without_score_metadata_is_a_domain_error() {
    let engine = Engine::new().with_model(Model::empty(FhirVersion::R4));
    // The concrete field name needs no choice-type model data, so the
    // input is non-empty and the missing score metadata is reached.
    let out = engine
        .evaluate_async(
            &response(),
            "QuestionnaireResponse.item.answer.valueCoding.weight()",
            &EvalOptions::default(),
        )
        .await;
    assert!(matches!(out, Err(Error::Domain(_))));
}

#[test]
fn weight_in_sync_mode_is_async_disallowed() {
    let engine = Engine::new().with_model(model());
    let options = EvalOptions {
        questionnaire: Some(questionnaire()),
        ..Default::default()
    };
    let out = engine.evaluate(
        &response(),
        "QuestionnaireResponse.item.answer.value.weight()",
        &options,
    );
    assert!(matches!(out, Err(Error::AsyncDisallowed(_))));
}

#[tokio::test]
async fn async_evaluation_handles_ordinary_expressions() {
    let engine = Engine::new();
    let out = engine
        .evaluate_async(&json!({}), "1 + 1", &EvalOptions::default())
        .await
        .unwrap();
    assert_eq!(resolve_internal_types(&out), vec![json!(2)]);
}

#[tokio::test]
async fn cancellation_signal_is_respected() {
    use corten_fhirpath::CancelSignal;

    let engine = Engine::new().with_model(model());
    let signal = CancelSignal::new();
    signal.cancel();
    let options = EvalOptions {
        questionnaire: Some(questionnaire()),
        signal: Some(signal),
        ..Default::default()
    };
    let out = engine
        .evaluate_async(
            &response(),
            "QuestionnaireResponse.item.answer.value.weight()",
            &options,
        )
        .await;
    assert!(matches!(out, Err(Error::Cancelled)));
}
