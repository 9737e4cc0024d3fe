//! Weight manifest and downloader.

pub mod downloader;
pub mod manifest;

pub use downloader::{plan_download, DownloadPlan, DownloadTarget, WeightsDownloader};
pub use manifest::{WeightEntry, WeightsManifest};
