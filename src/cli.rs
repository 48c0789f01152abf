//! Command-line helpers
//!
//! Image list collection for `predict` and command parsing for the
//! interactive shell. Kept out of `main.rs` so they can be tested.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Deserialize)]
#[serde(untagged)]
enum ImageSource {
    Object { images: Vec<PathBuf> },
    List(Vec<PathBuf>),
}

/// Parse the content of an images source file
///
/// Accepts a JSON object with an `images` array, a bare JSON array, or plain
/// text with one path per non-blank line.
pub fn parse_image_source(content: &str) -> Result<Vec<PathBuf>> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        let source: ImageSource = serde_json::from_str(content)
            .context("Images source looks like JSON but could not be parsed")?;
        return Ok(match source {
            ImageSource::Object { images } => images,
            ImageSource::List(images) => images,
        });
    }

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}

/// Command-line images first, then the source file's entries
pub fn collect_image_paths(images: &[PathBuf], source_file: Option<&Path>) -> Result<Vec<PathBuf>> {
    let mut paths = images.to_vec();

    if let Some(source_file) = source_file {
        let content = std::fs::read_to_string(source_file)
            .with_context(|| format!("Failed to read images source file: {:?}", source_file))?;
        paths.extend(parse_image_source(&content)?);
    }

    if paths.is_empty() {
        bail!("No images provided (use --images or --images-source-file)");
    }

    Ok(paths)
}

/// One line of input in the interactive shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Models,
    ModelInfo(u32),
    SwitchModel(u32),
    Predict(Vec<PathBuf>),
    Exit,
    Empty,
}

impl ReplCommand {
    /// Parse one input line; the error is a message for the user
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            return Ok(Self::Empty);
        };
        let args: Vec<&str> = parts.collect();

        match command.to_ascii_lowercase().as_str() {
            "help" | "?" => Ok(Self::Help),
            "models" => Ok(Self::Models),
            "model-info" => parse_version(command, &args).map(Self::ModelInfo),
            "switch-model" => parse_version(command, &args).map(Self::SwitchModel),
            "predict" if args.is_empty() => Err("usage: predict <image> [<image> ...]".to_string()),
            "predict" => Ok(Self::Predict(args.iter().map(PathBuf::from).collect())),
            "exit" | "quit" => Ok(Self::Exit),
            other => Err(format!("unknown command '{}' (type 'help')", other)),
        }
    }
}

fn parse_version(command: &str, args: &[&str]) -> Result<u32, String> {
    match args {
        [version] => version
            .trim_start_matches('v')
            .parse::<u32>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| format!("invalid model version '{}'", version)),
        _ => Err(format!("usage: {} <version>", command)),
    }
}

pub const REPL_HELP: &str = "\
Commands:
  help                     show this message
  models                   list installed models
  model-info <version>     show a model's metadata and classes
  switch-model <version>   resolve and load another model version
  predict <image> [...]    classify one or more images with the current model
  exit | quit              leave the shell";
