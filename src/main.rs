//! DermAI - Main entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dermai::cli::{REPL_HELP, ReplCommand, collect_image_paths};
use dermai::{
    Bundle, InferenceSession, ModelResolver, OnnxBackend, PredictionResult, RegistryConfig,
    RegistryError, ResolvedModel, metrics,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "dermai")]
#[command(about = "Skin-lesion classifier with a versioned model registry", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty", global = true)]
    log_format: String,

    /// Print a Prometheus snapshot of the run's counters on exit
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect and install model versions
    Models {
        #[command(subcommand)]
        action: ModelsAction,
    },

    /// Classify images with a model version
    Predict {
        /// Model version to use
        #[arg(short = 'm', long)]
        model_version: u32,

        /// Image paths
        #[arg(short, long, num_args = 1..)]
        images: Vec<PathBuf>,

        /// File listing images (JSON object with "images", JSON array, or one path per line)
        #[arg(long)]
        images_source_file: Option<PathBuf>,

        /// Print results as a JSON array
        #[arg(long)]
        json: bool,

        /// Skip the local development directory
        #[arg(long)]
        no_local_dev: bool,
    },

    /// Interactive shell
    Interactive {
        /// Model version loaded at startup
        #[arg(short = 'm', long, default_value_t = 1)]
        model_version: u32,

        /// Skip the local development directory
        #[arg(long)]
        no_local_dev: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ModelsAction {
    /// List installed models
    List,
    /// Show a model's metadata and live class names
    Info { version: u32 },
    /// Resolve a version into the managed cache
    Download {
        version: u32,
        /// Skip the local development directory
        #[arg(long)]
        no_local_dev: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries results
    match cli.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    let config = RegistryConfig::load(cli.config)?;
    config.validate()?;

    tracing::debug!(
        models_dir = ?config.models_dir,
        local_dev_dir = ?config.local_dev_dir,
        remote = %config.remote_base_url,
        "Configuration loaded"
    );

    let prometheus_handle = if cli.metrics {
        Some(metrics::setup_metrics()?)
    } else {
        None
    };

    let resolver =
        ModelResolver::from_config(&config).context("Failed to set up model registry")?;
    let session = InferenceSession::new(Arc::new(OnnxBackend));

    let outcome = match cli.command {
        Command::Models { action } => run_models(&resolver, action, config.prefer_local_dev).await,
        Command::Predict {
            model_version,
            images,
            images_source_file,
            json,
            no_local_dev,
        } => {
            let images = collect_image_paths(&images, images_source_file.as_deref())?;
            let prefer_local_dev = config.prefer_local_dev && !no_local_dev;
            run_predict(&resolver, &session, model_version, &images, prefer_local_dev, json).await
        }
        Command::Interactive {
            model_version,
            no_local_dev,
        } => {
            let prefer_local_dev = config.prefer_local_dev && !no_local_dev;
            run_interactive(&resolver, &session, model_version, prefer_local_dev).await
        }
    };

    if let Some(handle) = prometheus_handle {
        eprintln!("{}", handle.render());
    }

    match outcome {
        Ok(()) => Ok(()),
        Err(e) => match e.downcast_ref::<RegistryError>() {
            // Expected misses get a plain message, not an error chain
            Some(registry_error) if registry_error.is_not_found() => {
                eprintln!("{}", registry_error);
                std::process::exit(1);
            }
            _ => Err(e),
        },
    }
}

async fn run_models(
    resolver: &ModelResolver,
    action: ModelsAction,
    prefer_local_dev: bool,
) -> Result<()> {
    match action {
        ModelsAction::List => {
            let models = resolver.list_models().await?;
            if models.is_empty() {
                println!("No models installed in {}", resolver.cache().root().display());
            }
            for record in models {
                println!("v{} ({})", record.version, record.path.display());
            }
        }
        ModelsAction::Info { version } => {
            let info = resolver.get_model_info(version).await?;
            println!("{}", info);
        }
        ModelsAction::Download {
            version,
            no_local_dev,
        } => {
            let model = resolver
                .ensure_model_exists(version, prefer_local_dev && !no_local_dev)
                .await?;
            print_resolved(resolver, &model);
        }
    }
    Ok(())
}

fn print_resolved(resolver: &ModelResolver, model: &ResolvedModel) {
    println!("v{} resolved from {}", model.version, model.tier);
    println!("  weights: {}", model.artifact_path.display());
    println!("  labels:  {}", model.labels_path.display());
    if let Some(bytes) = resolver.cache().installed_size(model.version) {
        println!("  size:    {} bytes", bytes);
    }
    println!("  {} classes", model.num_classes());
}

async fn load_bundle(
    resolver: &ModelResolver,
    session: &InferenceSession,
    version: u32,
    prefer_local_dev: bool,
) -> Result<Bundle> {
    let model = resolver.ensure_model_exists(version, prefer_local_dev).await?;
    let bundle = session
        .load_resolved(&model)
        .with_context(|| format!("Failed to load model v{}", version))?;
    tracing::info!(version, tier = %model.tier, classes = model.num_classes(), "Model ready");
    Ok(bundle)
}

async fn run_predict(
    resolver: &ModelResolver,
    session: &InferenceSession,
    version: u32,
    images: &[PathBuf],
    prefer_local_dev: bool,
    json: bool,
) -> Result<()> {
    let bundle = load_bundle(resolver, session, version, prefer_local_dev).await?;
    let results = bundle.predict_batch(images);

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_results(&results);
    }
    Ok(())
}

fn print_results(results: &[PredictionResult]) {
    for result in results {
        println!("{}", result);
    }
}

async fn run_interactive(
    resolver: &ModelResolver,
    session: &InferenceSession,
    initial_version: u32,
    prefer_local_dev: bool,
) -> Result<()> {
    let mut version = initial_version;
    let mut bundle = load_bundle(resolver, session, version, prefer_local_dev).await?;

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!(
        "DermAI interactive shell, model v{} ({} classes)",
        version,
        bundle.class_names().len()
    );
    println!("Type 'help' for commands.");

    loop {
        stdout.write_all(format!("dermai[v{}]> ", version).as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let command = match ReplCommand::parse(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{}", message);
                continue;
            }
        };

        match command {
            ReplCommand::Empty => {}
            ReplCommand::Help => println!("{}", REPL_HELP),
            ReplCommand::Exit => break,
            ReplCommand::Models => match resolver.list_models().await {
                Ok(models) if models.is_empty() => println!("No models installed"),
                Ok(models) => {
                    for record in models {
                        let marker = if record.version == version { "*" } else { " " };
                        println!("{} v{} ({})", marker, record.version, record.path.display());
                    }
                }
                Err(e) => println!("error: {}", e),
            },
            ReplCommand::ModelInfo(v) => match resolver.get_model_info(v).await {
                Ok(info) => println!("{}", info),
                Err(e) => println!("{}", e),
            },
            ReplCommand::SwitchModel(v) => {
                match load_bundle(resolver, session, v, prefer_local_dev).await {
                    Ok(loaded) => {
                        bundle = loaded;
                        version = v;
                        println!(
                            "Switched to model v{} ({} classes)",
                            v,
                            bundle.class_names().len()
                        );
                    }
                    // The current model stays loaded
                    Err(e) => println!("error: {:#}", e),
                }
            }
            ReplCommand::Predict(paths) => print_results(&bundle.predict_batch(&paths)),
        }
    }

    tracing::debug!("Interactive shell closed");
    Ok(())
}
