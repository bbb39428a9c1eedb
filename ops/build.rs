use minijinja::{Environment, context};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
struct TypeInfo {
    name: String,
    rust: String,
    float: bool,
}

#[derive(Debug, Deserialize, Serialize)]
struct TypeList {
    types: Vec<TypeInfo>,
}

fn main() {
    let yaml_str = fs::read_to_string(Path::new("../supported_types.yaml"))
        .expect("Unable to read supported_types.yaml");
    let type_list: TypeList = serde_yaml::from_str(&yaml_str)
        .expect("Failed to parse YAML");

    let jinja = Environment::new();
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));

    for (template, generated) in [
        ("templates/tensor_any.jinja", "generated_tensor_any.rs"),
        ("templates/dispatch_dtype.jinja", "generated_dispatch_dtype.rs"),
    ] {
        let template_source = fs::read_to_string(Path::new(template))
            .expect("Unable to read template file");
        let tmpl = jinja.template_from_str(&template_source)
            .expect("Invalid template");
        let rendered = tmpl.render(context! { types => &type_list.types })
            .expect("Failed to render template");
        fs::write(out_dir.join(generated), rendered)
            .expect("Unable to write generated file");
        println!("cargo:rerun-if-changed={template}");
    }

    println!("cargo:rerun-if-changed=../supported_types.yaml");
}
