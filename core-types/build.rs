use minijinja::{Environment, context};
use std::env;
use std::fs;
use std::path::PathBuf;
use serde::Deserialize;

/// One row of `supported_types.yaml`
#[derive(Debug, Deserialize, serde::Serialize)]
struct ElementType {
    name: String,
    rust: String,
    float: bool,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    types: Vec<ElementType>,
}

const MANIFEST: &str = "../supported_types.yaml";
const TEMPLATE: &str = "templates/data_types.jinja";

fn main() {
    let manifest: Manifest = fs::read_to_string(MANIFEST)
        .map(|src| serde_yaml::from_str(&src).expect("Malformed supported_types.yaml"))
        .expect("Unable to read supported_types.yaml");
    let source = fs::read_to_string(TEMPLATE).expect("Unable to read data type template");

    let rendered = Environment::new()
        .template_from_str(&source)
        .and_then(|tmpl| tmpl.render(context! { types => manifest.types }))
        .expect("Failed to render data type template");

    let out = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set")).join("generated_data_types.rs");
    fs::write(out, rendered).expect("Unable to write generated_data_types.rs");

    println!("cargo:rerun-if-changed={MANIFEST}");
    println!("cargo:rerun-if-changed={TEMPLATE}");
}
