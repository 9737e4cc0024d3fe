//! Shared defaults for engine locations, directory layout and weight sources.
//! Runtime values live in `AdapterConfig`; these are its defaults.

pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:8188";
pub const DEFAULT_INPUT_DIR: &str = "/tmp/inputs";
pub const DEFAULT_OUTPUT_DIR: &str = "/tmp/outputs";
pub const DEFAULT_COMFYUI_ROOT: &str = "ComfyUI";
pub const DEFAULT_WORKFLOWS_DIR: &str = "workflows";
pub const DEFAULT_PYTHON: &str = "python";

pub const COMFYUI_TEMP_SUBDIR: &str = "temp";
pub const COMFYUI_CUSTOM_NODES_SUBDIR: &str = "custom_nodes";
pub const COMFYUI_MODELS_SUBDIR: &str = "models";

pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

pub const WEIGHTS_BASE_URL: &str = "https://weights.replicate.delivery/default/comfy-ui";
pub const WEIGHTS_LICENSES_URL: &str =
    "https://github.com/fofr/cog-comfyui/blob/main/weights_licenses.md";
pub const SUPPORTED_WEIGHTS_URL: &str =
    "https://github.com/fofr/cog-comfyui/blob/main/supported_weights.md";

pub const TORCH_CHECKPOINTS_SUBDIR: &str = ".cache/torch/hub/checkpoints";
pub const MOBILENET_CHECKPOINT: &str = "mobilenet_v2-b0353104.pth";

/// Staged single-image inputs are renamed to `input<ext>`.
pub const STAGED_IMAGE_STEM: &str = "input";

pub const DEFAULT_WORKFLOW_FILE: &str = "photomaker.json";

/// Any node input with one of these keys is treated as a seed.
pub const SEED_INPUT_KEYS: &[&str] = &["seed", "noise_seed", "rand_seed"];

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];
pub const MEDIA_INPUT_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "gif", "bmp", "mp4", "mov", "mkv", "webm", "avi",
];
pub const WEIGHT_EXTENSIONS: &[&str] = &[
    "ckpt",
    "safetensors",
    "pt",
    "pth",
    "bin",
    "onnx",
    "torchscript",
    "sft",
];

pub const LOG_SEPARATOR: &str = "====================================";
