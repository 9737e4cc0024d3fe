pub mod comfyui_workflow;
pub mod inputs;
pub mod paths;
