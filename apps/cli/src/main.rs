//! FHIRPath CLI
//!
//! Evaluates a FHIRPath expression against a FHIR resource file, or dumps
//! the parsed AST as JSON when no resource is given. Errors (including
//! every accumulated syntax diagnostic) go to stderr with a non-zero
//! exit code.

use anyhow::{Context, Result};
use clap::Parser;
use corten_fhirpath::{resolve_internal_types, Engine, EvalOptions};
use corten_model::{FhirVersion, Model};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "corten", about = "Evaluate FHIRPath expressions", version)]
struct Args {
    /// FHIRPath expression to evaluate
    #[arg(short, long)]
    expression: String,

    /// Path to the FHIR resource JSON file; without it, the parsed AST
    /// is printed instead
    #[arg(short, long)]
    resource_file: Option<PathBuf>,

    /// FHIR release of the model data (dstu2|stu3|r4|r5)
    #[arg(short, long)]
    model: Option<String>,

    /// Directory holding the per-release model JSON files
    #[arg(short, long)]
    base_path: Option<PathBuf>,

    /// Environment variables as a JSON object
    #[arg(short, long)]
    variables: Option<String>,

    /// Terminology server base URL (enables weight()/ordinal())
    #[arg(long)]
    terminology_url: Option<String>,
}

fn load_model(args: &Args) -> Result<Option<Model>> {
    let Some(version) = &args.model else {
        return Ok(None);
    };
    let version = FhirVersion::parse(version)?;
    match &args.base_path {
        Some(base) => {
            let path = base.join(format!("{}.json", version));
            let model = Model::from_file(version, &path)
                .with_context(|| format!("loading model data from {}", path.display()))?;
            Ok(Some(model))
        }
        None => Ok(Some(Model::empty(version))),
    }
}

fn parse_variables(args: &Args) -> Result<HashMap<String, JsonValue>> {
    let Some(text) = &args.variables else {
        return Ok(HashMap::new());
    };
    let json: JsonValue = serde_json::from_str(text).context("parsing --variables")?;
    let JsonValue::Object(map) = json else {
        anyhow::bail!("--variables must be a JSON object");
    };
    Ok(map.into_iter().collect())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let Some(resource_file) = &args.resource_file else {
        // No resource: print the AST.
        let ast = corten_fhirpath::parse(&args.expression)?;
        println!("{}", serde_json::to_string_pretty(&ast.to_json())?);
        return Ok(());
    };

    let text = std::fs::read_to_string(resource_file)
        .with_context(|| format!("reading {}", resource_file.display()))?;
    let resource: JsonValue = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", resource_file.display()))?;

    let mut engine = Engine::new();
    if let Some(model) = load_model(&args)? {
        engine = engine.with_model(model);
    }
    let use_async = args.terminology_url.is_some();
    if let Some(url) = &args.terminology_url {
        engine = engine.with_terminology_url(url.clone())?;
    }

    let options = EvalOptions {
        vars: parse_variables(&args)?,
        ..Default::default()
    };

    let result = if use_async {
        engine
            .evaluate_async(&resource, &args.expression, &options)
            .await?
    } else {
        engine.evaluate(&resource, &args.expression, &options)?
    };

    let json = JsonValue::Array(resolve_internal_types(&result));
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
