//! API-format ComfyUI workflow helpers: parsing, template selection, seed
//! randomisation and scanning node inputs for weights and remote files.

use std::collections::BTreeSet;
use std::path::Path;

use rand::Rng;
use serde_json::Value;

use crate::constants::{DEFAULT_WORKFLOW_FILE, MEDIA_INPUT_EXTENSIONS, SEED_INPUT_KEYS};
use crate::core::inputs::StagedInput;
use crate::core::paths::has_extension;
use crate::error::{AdapterError, AdapterResult};
use crate::state::RestorationFunction;

#[derive(Debug, Clone, PartialEq)]
pub struct ComfyWorkflowNode {
    pub id: String,
    pub class_type: String,
    pub title: Option<String>,
    pub inputs: Vec<String>,
}

/// Bundled workflow for a restoration function and the loader node that takes
/// the user image.
struct FunctionTemplate {
    function: RestorationFunction,
    file: &'static str,
    image_node_id: &'static str,
    image_input_key: &'static str,
}

const FUNCTION_TEMPLATES: &[FunctionTemplate] = &[
    FunctionTemplate {
        function: RestorationFunction::HandRestoration,
        file: "hands_restoration_api.json",
        image_node_id: "57",
        image_input_key: "image",
    },
    FunctionTemplate {
        function: RestorationFunction::FaceRestoration,
        file: "faces_restoration_api.json",
        image_node_id: "3",
        image_input_key: "image",
    },
];

/// A node input pointing at an `http(s)://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInput {
    pub node_id: String,
    pub input_key: String,
    pub url: String,
    pub file_name: String,
}

/// A seed input that was replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedChange {
    pub node_id: String,
    pub input_key: String,
    pub value: u64,
}

pub fn parse_workflow(json: &str) -> AdapterResult<Value> {
    let value: Value = serde_json::from_str(json)
        .map_err(|err| AdapterError::workflow(format!("Invalid workflow JSON: {}", err)))?;
    let Some(map) = value.as_object() else {
        return Err(AdapterError::workflow("Workflow JSON must be an object."));
    };
    if map.get("nodes").map(Value::is_array).unwrap_or(false) {
        return Err(AdapterError::workflow(
            "You need to use the API JSON version of a ComfyUI workflow. \
             Enable dev mode in ComfyUI settings and use 'Save (API format)'.",
        ));
    }
    Ok(value)
}

pub fn load_workflow_file(path: &Path) -> AdapterResult<Value> {
    let json = std::fs::read_to_string(path).map_err(|err| AdapterError::io(path, err))?;
    parse_workflow(&json)
}

/// Bundled workflow for `function`, with the staged image bound to its loader.
/// `All` has no bundled workflow.
pub fn choose_workflow(
    function: RestorationFunction,
    workflows_dir: &Path,
    staged_input: Option<&StagedInput>,
) -> AdapterResult<Option<Value>> {
    let Some(template) = FUNCTION_TEMPLATES
        .iter()
        .find(|template| template.function == function)
    else {
        return Ok(None);
    };

    let mut workflow = load_workflow_file(&workflows_dir.join(template.file))?;
    if let Some(file_name) = staged_input.and_then(StagedInput::image_file_name) {
        set_workflow_input(
            &mut workflow,
            template.image_node_id,
            template.image_input_key,
            Value::String(file_name.to_string()),
        )?;
    }
    Ok(Some(workflow))
}

pub fn default_workflow(workflows_dir: &Path) -> AdapterResult<Value> {
    load_workflow_file(&workflows_dir.join(DEFAULT_WORKFLOW_FILE))
}

pub fn set_workflow_input(
    workflow: &mut Value,
    node_id: &str,
    input_key: &str,
    value: Value,
) -> AdapterResult<()> {
    let Some(node) = workflow.get_mut(node_id) else {
        return Err(AdapterError::workflow(format!("Workflow missing node {}", node_id)));
    };
    let Some(inputs) = node.get_mut("inputs") else {
        return Err(AdapterError::workflow(format!(
            "Workflow node {} missing inputs",
            node_id
        )));
    };
    let Some(inputs) = inputs.as_object_mut() else {
        return Err(AdapterError::workflow(format!(
            "Workflow node {} inputs not an object",
            node_id
        )));
    };
    inputs.insert(input_key.to_string(), value);
    Ok(())
}

pub fn randomise_seeds(workflow: &mut Value) -> Vec<SeedChange> {
    randomise_seeds_with(workflow, &mut rand::thread_rng())
}

pub fn randomise_seeds_with<R: Rng + ?Sized>(workflow: &mut Value, rng: &mut R) -> Vec<SeedChange> {
    let mut changes = Vec::new();
    let Some(map) = workflow.as_object_mut() else {
        return changes;
    };
    for (node_id, node) in map.iter_mut() {
        let Some(inputs) = node.get_mut("inputs").and_then(Value::as_object_mut) else {
            continue;
        };
        for key in SEED_INPUT_KEYS {
            // Linked seeds (`["20", 0]`) follow their source node.
            if let Some(slot) = inputs.get_mut(*key).filter(|slot| slot.is_number()) {
                let value = u64::from(rng.gen_range(0..=u32::MAX));
                *slot = Value::from(value);
                changes.push(SeedChange {
                    node_id: node_id.clone(),
                    input_key: key.to_string(),
                    value,
                });
            }
        }
    }
    changes
}

/// Distinct string inputs that name a weight file, in first-seen order.
pub fn weight_references(workflow: &Value, extensions: &[&str]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut references = Vec::new();
    for_each_string_input(workflow, |_, _, value| {
        if is_remote(value) || !has_extension(value, extensions) {
            return;
        }
        if seen.insert(value.to_string()) {
            references.push(value.to_string());
        }
    });
    references
}

pub fn remote_inputs(workflow: &Value) -> Vec<RemoteInput> {
    let mut remote = Vec::new();
    for_each_string_input(workflow, |node_id, input_key, value| {
        if !is_remote(value) {
            return;
        }
        if let Some(file_name) = file_name_from_url(value) {
            remote.push(RemoteInput {
                node_id: node_id.to_string(),
                input_key: input_key.to_string(),
                url: value.to_string(),
                file_name,
            });
        }
    });
    remote
}

/// Local image or video file names referenced by the workflow.
pub fn media_file_inputs(workflow: &Value) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut files = Vec::new();
    for_each_string_input(workflow, |_, _, value| {
        if !is_remote(value)
            && has_extension(value, MEDIA_INPUT_EXTENSIONS)
            && seen.insert(value.to_string())
        {
            files.push(value.to_string());
        }
    });
    files
}

/// Last URL path segment, percent-decoded, without query or fragment. Only
/// the final path component of the decoded segment is kept, so the name can
/// never leave the input directory.
pub fn file_name_from_url(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let (_, rest) = without_query.split_once("://")?;
    let (_, path) = rest.split_once('/')?;
    let segment = path.rsplit('/').next()?;
    if segment.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(segment)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    let name = decoded.rsplit(['/', '\\']).next()?;
    if name.is_empty() || name == "." || name == ".." || name.contains('\0') {
        return None;
    }
    Some(name.to_string())
}

pub fn summarize_nodes(value: &Value) -> AdapterResult<Vec<ComfyWorkflowNode>> {
    let Some(map) = value.as_object() else {
        return Err(AdapterError::workflow("Workflow JSON must be an object."));
    };

    let mut nodes = Vec::new();
    for (node_id, node_value) in map.iter() {
        let Some(node_obj) = node_value.as_object() else {
            continue;
        };
        let class_type = node_obj
            .get("class_type")
            .and_then(|value| value.as_str())
            .unwrap_or("unknown")
            .to_string();
        let title = node_obj
            .get("_meta")
            .and_then(|meta| meta.get("title"))
            .and_then(|value| value.as_str())
            .map(|value| value.to_string());
        let mut inputs = Vec::new();
        if let Some(input_map) = node_obj.get("inputs").and_then(|value| value.as_object()) {
            inputs.extend(input_map.keys().cloned());
            inputs.sort();
        }

        nodes.push(ComfyWorkflowNode {
            id: node_id.clone(),
            class_type,
            title,
            inputs,
        });
    }

    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(nodes)
}

fn is_remote(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn for_each_string_input<F: FnMut(&str, &str, &str)>(workflow: &Value, mut visit: F) {
    let Some(map) = workflow.as_object() else {
        return;
    };
    for (node_id, node) in map.iter() {
        let Some(inputs) = node.get("inputs").and_then(Value::as_object) else {
            continue;
        };
        for (key, value) in inputs.iter() {
            if let Some(text) = value.as_str() {
                visit(node_id, key, text);
            }
        }
    }
}
