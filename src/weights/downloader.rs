//! Lazy weight downloads into the ComfyUI model layout.

use std::path::{Path, PathBuf};
use std::time::Instant;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::AdapterConfig;
use crate::constants::{MOBILENET_CHECKPOINT, WEIGHTS_LICENSES_URL};
use crate::error::{AdapterError, AdapterResult};
use crate::weights::manifest::WeightsManifest;

/// Weights that are not fetched from the default store. `dest_file` is
/// relative to the ComfyUI root.
struct DownloadOverride {
    weight: &'static str,
    url: &'static str,
    dest_file: &'static str,
}

const DOWNLOAD_OVERRIDES: &[DownloadOverride] = &[
    DownloadOverride {
        weight: "swizz8_REALBakedvaeFP16.safetensors",
        url: "https://civitai.com/api/download/models/180074",
        dest_file: "models/checkpoints/swizz8_REALBakedvaeFP16.safetensors",
    },
    DownloadOverride {
        weight: "bbox/hand_yolov8s.pt",
        url: "https://huggingface.co/Bingsu/adetailer/resolve/main/hand_yolov8s.pt",
        dest_file: "models/ultralytics/bbox/hand_yolov8s.pt",
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadTarget {
    /// Tar archive unpacked into a directory.
    Unpack { dir: PathBuf },
    /// Response body written to a single file.
    File { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPlan {
    pub url: String,
    pub target: DownloadTarget,
    /// File expected to exist once the download finished.
    pub expected_file: PathBuf,
}

/// Decide where `weight` goes and which URL serves it.
pub fn plan_download(weight: &str, url: &str, dest: &Path, comfyui_root: &Path) -> DownloadPlan {
    if let Some(rule) = DOWNLOAD_OVERRIDES.iter().find(|rule| rule.weight == weight) {
        let path = comfyui_root.join(rule.dest_file);
        return DownloadPlan {
            url: rule.url.to_string(),
            target: DownloadTarget::File { path: path.clone() },
            expected_file: path,
        };
    }

    let (dir, base_name) = match weight.rsplit_once('/') {
        Some((subfolder, base_name)) => (dest.join(subfolder), base_name),
        None => (dest.to_path_buf(), weight),
    };
    let expected_file = dir.join(base_name);
    let target = if url.ends_with(".tar") {
        DownloadTarget::Unpack { dir }
    } else {
        DownloadTarget::File {
            path: expected_file.clone(),
        }
    };
    DownloadPlan {
        url: url.to_string(),
        target,
        expected_file,
    }
}

#[derive(Debug, Clone)]
pub struct WeightsDownloader {
    manifest: WeightsManifest,
    client: reqwest::Client,
    comfyui_root: PathBuf,
    torch_checkpoints_dir: PathBuf,
    base_url: String,
}

impl WeightsDownloader {
    pub fn new(config: &AdapterConfig) -> AdapterResult<Self> {
        Ok(Self {
            manifest: WeightsManifest::new(&config.weights_base_url)?,
            client: reqwest::Client::new(),
            comfyui_root: config.comfyui_root.clone(),
            torch_checkpoints_dir: config.torch_checkpoints_dir.clone(),
            base_url: config.weights_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn with_manifest(config: &AdapterConfig, manifest: WeightsManifest) -> Self {
        Self {
            manifest,
            client: reqwest::Client::new(),
            comfyui_root: config.comfyui_root.clone(),
            torch_checkpoints_dir: config.torch_checkpoints_dir.clone(),
            base_url: config.weights_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn manifest(&self) -> &WeightsManifest {
        &self.manifest
    }

    /// Fetch a manifest weight unless it is already on disk.
    pub async fn download_weights(&self, weight: &str) -> AdapterResult<()> {
        let Some(entry) = self.manifest.get(weight) else {
            return Err(AdapterError::UnknownWeight {
                name: weight.to_string(),
            });
        };
        if self.manifest.is_non_commercial_only(weight) {
            warn!(
                "⚠️  {} is for non-commercial use only. Unless you have obtained a commercial license.\nDetails: {}",
                weight, WEIGHTS_LICENSES_URL
            );
        }
        let dest = self.comfyui_root.join(&entry.dest);
        self.download_if_not_exists(weight, &entry.url, &dest).await
    }

    pub async fn download_torch_checkpoints(&self) -> AdapterResult<()> {
        let url = format!(
            "{}/custom_nodes/comfyui_controlnet_aux/{}.tar",
            self.base_url, MOBILENET_CHECKPOINT
        );
        self.download_if_not_exists(MOBILENET_CHECKPOINT, &url, &self.torch_checkpoints_dir)
            .await
    }

    pub async fn download_if_not_exists(
        &self,
        weight: &str,
        url: &str,
        dest: &Path,
    ) -> AdapterResult<()> {
        if dest.join(weight).exists() {
            return Ok(());
        }
        self.download(weight, url, dest).await
    }

    pub async fn download(&self, weight: &str, url: &str, dest: &Path) -> AdapterResult<()> {
        let plan = plan_download(weight, url, dest, &self.comfyui_root);
        if plan.url != url {
            info!("Using alternate source for {}: {}", weight, plan.url);
        }

        let target_dir = match &plan.target {
            DownloadTarget::Unpack { dir } => dir.clone(),
            DownloadTarget::File { path } => path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        tokio::fs::create_dir_all(&target_dir)
            .await
            .map_err(|err| AdapterError::io(&target_dir, err))?;

        info!("⏳ Downloading {} to {}", weight, target_dir.display());
        let start = Instant::now();

        match &plan.target {
            DownloadTarget::File { path } => {
                let part = part_path(path);
                let fetched = match self.fetch_to_file(weight, &plan.url, &part).await {
                    Ok(()) => tokio::fs::rename(&part, path)
                        .await
                        .map_err(|err| AdapterError::io(path, err)),
                    Err(err) => Err(err),
                };
                if fetched.is_err() {
                    remove_part_file(&part).await;
                }
                fetched?;
            }
            DownloadTarget::Unpack { dir } => {
                let part = dir.join(format!(".{}.tar.part", file_name_of(weight)));
                let unpacked = match self.fetch_to_file(weight, &plan.url, &part).await {
                    Ok(()) => {
                        let archive = part.clone();
                        let unpack_dir = dir.clone();
                        tokio::task::spawn_blocking(move || unpack(&archive, &unpack_dir))
                            .await
                            .map_err(|err| AdapterError::Download {
                                name: weight.to_string(),
                                message: format!("unpack task failed: {}", err),
                            })
                            .and_then(|unpacked| unpacked)
                    }
                    Err(err) => Err(err),
                };
                remove_part_file(&part).await;
                unpacked?;
            }
        }

        let elapsed = start.elapsed().as_secs_f64();
        match tokio::fs::metadata(&plan.expected_file).await {
            Ok(metadata) => {
                let megabytes = metadata.len() as f64 / (1024.0 * 1024.0);
                info!(
                    "⌛️ Downloaded {} in {:.2}s, size: {:.2}MB",
                    weight, elapsed, megabytes
                );
            }
            Err(_) => {
                warn!(
                    "Downloaded {} in {:.2}s but {} does not exist",
                    weight,
                    elapsed,
                    plan.expected_file.display()
                );
            }
        }
        Ok(())
    }

    async fn fetch_to_file(&self, weight: &str, url: &str, path: &Path) -> AdapterResult<()> {
        let download_error = |message: String| AdapterError::Download {
            name: weight.to_string(),
            message,
        };

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(download_error(format!("HTTP {} from {}", status, url)));
        }

        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|err| AdapterError::io(path, err))?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| download_error(format!("read failed: {}", err)))?;
            file.write_all(&chunk)
                .await
                .map_err(|err| AdapterError::io(path, err))?;
        }
        file.flush().await.map_err(|err| AdapterError::io(path, err))?;
        Ok(())
    }
}

fn part_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!("{}.part", name))
}

async fn remove_part_file(part: &Path) {
    match tokio::fs::remove_file(part).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!("Failed to remove {}: {}", part.display(), err),
    }
}

fn file_name_of(weight: &str) -> &str {
    weight.rsplit('/').next().unwrap_or(weight)
}

fn unpack(archive: &Path, dir: &Path) -> AdapterResult<()> {
    let file = std::fs::File::open(archive).map_err(|err| AdapterError::io(archive, err))?;
    tar::Archive::new(std::io::BufReader::new(file))
        .unpack(dir)
        .map_err(|err| AdapterError::Archive {
            path: archive.to_path_buf(),
            message: err.to_string(),
        })
}
