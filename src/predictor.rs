//! Prediction facade: one request in, a list of output files out.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::AdapterConfig;
use crate::core::comfyui_workflow::{choose_workflow, default_workflow, parse_workflow};
use crate::core::inputs::{handle_input_file, log_and_collect_files, reset_directories, StagedInput};
use crate::core::paths::resolve_resource_path;
use crate::error::AdapterResult;
use crate::providers::ComfyUiClient;
use crate::state::PredictRequest;
use crate::weights::WeightsDownloader;

pub struct Predictor {
    config: AdapterConfig,
    workflows_dir: PathBuf,
    client: ComfyUiClient,
}

impl Predictor {
    /// Build the engine client and wait for the engine to come up.
    pub async fn setup(config: AdapterConfig) -> AdapterResult<Self> {
        let mut predictor = Self::new(config)?;
        let output_dir = predictor.config.output_dir.clone();
        let input_dir = predictor.config.input_dir.clone();
        predictor.client.start_server(&output_dir, &input_dir).await?;
        Ok(predictor)
    }

    /// Construct without contacting the engine.
    pub fn new(config: AdapterConfig) -> AdapterResult<Self> {
        let downloader = WeightsDownloader::new(&config)?;
        let workflows_dir = resolve_resource_path(&config.workflows_dir);
        let client = ComfyUiClient::new(config.clone(), downloader);
        Ok(Self {
            config,
            workflows_dir,
            client,
        })
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Empty the output, input and engine temp directories.
    pub fn cleanup(&self) -> AdapterResult<()> {
        reset_directories(&[
            self.config.output_dir.clone(),
            self.config.input_dir.clone(),
            self.config.temp_output_dir(),
        ])
    }

    pub fn handle_input_file(&self, input_file: &Path) -> AdapterResult<StagedInput> {
        handle_input_file(input_file, &self.config.input_dir)
    }

    pub async fn predict(&mut self, request: PredictRequest) -> AdapterResult<Vec<PathBuf>> {
        self.cleanup()?;

        let staged = match request.input_file.as_deref() {
            Some(input_file) => Some(self.handle_input_file(input_file)?),
            None => None,
        };

        let mut workflow = self.select_workflow(&request, staged.as_ref())?;
        log_custom_nodes(&self.config.custom_nodes_dir());
        self.client.prepare_workflow(&mut workflow).await?;

        if request.randomise_seeds {
            self.client.randomise_seeds(&mut workflow);
        }

        self.client.connect().await?;
        self.client.run_workflow(&workflow).await?;

        let mut output_directories = vec![self.config.output_dir.clone()];
        if request.return_temp_files {
            output_directories.push(self.config.temp_output_dir());
        }

        let mut files = Vec::new();
        for directory in output_directories {
            info!("Contents of {}:", directory.display());
            files.extend(log_and_collect_files(&directory, "")?);
        }
        Ok(files)
    }

    /// Caller-supplied workflow JSON wins; otherwise the bundled workflow for
    /// the requested function, falling back to the default example.
    pub fn select_workflow(
        &self,
        request: &PredictRequest,
        staged: Option<&StagedInput>,
    ) -> AdapterResult<Value> {
        if !request.workflow_json.trim().is_empty() {
            return parse_workflow(&request.workflow_json);
        }

        info!(
            "No workflow supplied, using bundled workflow for {}",
            request.function_name
        );
        if staged.is_some() && staged.and_then(StagedInput::image_file_name).is_none() {
            warn!("Archive inputs are not bound to the bundled workflow; reference them by name");
        }
        match choose_workflow(request.function_name, &self.workflows_dir, staged)? {
            Some(workflow) => Ok(workflow),
            None => default_workflow(&self.workflows_dir),
        }
    }
}

fn log_custom_nodes(custom_nodes_dir: &Path) {
    let Ok(entries) = std::fs::read_dir(custom_nodes_dir) else {
        debug!("No custom nodes directory at {}", custom_nodes_dir.display());
        return;
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    for name in names {
        debug!("custom node {}", name);
    }
}
