//! comfy-restore
//!
//! Command-line entrypoint: run one prediction against a local ComfyUI engine,
//! or manage the weights it needs.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use comfy_restore::weights::WeightsDownloader;
use comfy_restore::{AdapterConfig, PredictRequest, Predictor, RestorationFunction};

#[derive(Parser, Debug)]
#[command(
    name = "comfy-restore",
    version,
    about = "Run hand and face restoration workflows on a local ComfyUI engine",
    subcommand_required = true,
    arg_required_else_help = true
)]
struct Cli {
    /// JSON config file; unset fields keep their defaults
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// ComfyUI server address (host:port)
    #[arg(long, global = true, env = "COMFY_SERVER_ADDRESS")]
    server_address: Option<String>,

    /// ComfyUI checkout directory
    #[arg(long, global = true, env = "COMFY_ROOT", value_name = "DIR")]
    comfyui_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one prediction and print the output file paths
    Predict(PredictArgs),
    /// Download weights from the manifest into the ComfyUI model directories
    DownloadWeights(DownloadWeightsArgs),
    /// List the weights available in the manifest
    Weights(WeightsArgs),
}

#[derive(Parser, Debug)]
struct PredictArgs {
    /// Bundled workflow to use when no workflow JSON is given
    #[arg(long = "function", value_enum, default_value_t = RestorationFunction::HandRestoration)]
    function_name: RestorationFunction,

    /// API-format workflow JSON file
    #[arg(long, value_name = "PATH")]
    workflow_json: Option<PathBuf>,

    /// Input image, tar or zip file
    #[arg(long, value_name = "PATH")]
    input_file: Option<PathBuf>,

    /// Also return files from the engine temp directory
    #[arg(long)]
    return_temp_files: bool,

    /// Keep seeds from the workflow instead of randomising them
    #[arg(long)]
    keep_seeds: bool,

    /// Start ComfyUI instead of expecting it to be running
    #[arg(long)]
    launch_engine: bool,
}

#[derive(Parser, Debug)]
struct DownloadWeightsArgs {
    /// Weight names as listed by `weights`
    #[arg(value_name = "NAME")]
    names: Vec<String>,

    /// Also fetch the torch hub checkpoints used by controlnet preprocessors
    #[arg(long)]
    torch_checkpoints: bool,
}

#[derive(Parser, Debug)]
struct WeightsArgs {
    /// Only list one category (e.g. CHECKPOINTS)
    #[arg(long)]
    category: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = AdapterConfig::load(cli.config.as_deref())?;
    if let Some(address) = cli.server_address {
        config.server_address = address;
    }
    if let Some(root) = cli.comfyui_root {
        config.comfyui_root = root;
    }

    match cli.command {
        Commands::Predict(args) => cmd_predict(config, args).await,
        Commands::DownloadWeights(args) => cmd_download_weights(config, args).await,
        Commands::Weights(args) => cmd_weights(config, args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn cmd_predict(mut config: AdapterConfig, args: PredictArgs) -> Result<()> {
    if args.launch_engine {
        config.launch_engine = true;
    }
    let workflow_json = match &args.workflow_json {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("read workflow {}", path.display()))?,
        None => String::new(),
    };
    let request = PredictRequest {
        function_name: args.function_name,
        workflow_json,
        input_file: args.input_file,
        return_temp_files: args.return_temp_files,
        randomise_seeds: !args.keep_seeds,
    };

    let mut predictor = Predictor::setup(config).await?;
    let files = predictor.predict(request).await?;
    for file in files {
        println!("{}", file.display());
    }
    Ok(())
}

async fn cmd_download_weights(config: AdapterConfig, args: DownloadWeightsArgs) -> Result<()> {
    let downloader = WeightsDownloader::new(&config)?;
    for name in &args.names {
        downloader.download_weights(name).await?;
    }
    if args.torch_checkpoints {
        downloader.download_torch_checkpoints().await?;
    }
    Ok(())
}

fn cmd_weights(config: AdapterConfig, args: WeightsArgs) -> Result<()> {
    let downloader = WeightsDownloader::new(&config)?;
    let manifest = downloader.manifest();
    let entries = match &args.category {
        Some(category) => manifest.weights_by_category(category),
        None => manifest.entries().collect(),
    };
    for entry in entries {
        let marker = if manifest.is_non_commercial_only(&entry.name) {
            " (non-commercial)"
        } else {
            ""
        };
        println!("{}\t{}{}", entry.category, entry.name, marker);
    }
    Ok(())
}
