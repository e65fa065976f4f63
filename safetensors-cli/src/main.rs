//! # safetensors-cli
//!
//! Command-line tool for inspecting safetensors files.
//!
//! Every subcommand maps the file through `safetensors-mmap`, so even very
//! large checkpoints open without being read into memory.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use safetensors_mmap::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "safetensors-cli",
    version,
    about = "Command-line tool for inspecting safetensors files",
    long_about = "Inspect, dump and validate safetensors files using a zero-copy memory-mapped reader."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Do not prefetch the file after mapping it
    #[arg(long, global = true)]
    no_prefetch: bool,

    /// Pin the mapped file in physical memory
    #[arg(long, global = true)]
    lock_memory: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List tensor names in header order
    Keys {
        /// Path to the safetensors file
        file: PathBuf,
    },

    /// Display information about a safetensors file
    Info {
        /// Path to the safetensors file
        file: PathBuf,

        /// Show every tensor's dtype, shape and size
        #[arg(short, long)]
        detailed: bool,
    },

    /// Display the string metadata stored in the header
    Metadata {
        /// Path to the safetensors file
        file: PathBuf,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,

        /// Filter metadata by key pattern
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Show one tensor and dump its leading bytes
    Tensor {
        /// Path to the safetensors file
        file: PathBuf,

        /// Exact tensor name
        name: String,

        /// Number of leading bytes to hex dump
        #[arg(short, long, default_value_t = 64)]
        bytes: usize,
    },

    /// Validate a safetensors file or a directory of them
    Validate {
        /// Path to a safetensors file or directory
        path: PathBuf,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = LoadConfig::new().with_lock_memory(cli.lock_memory);
    if cli.no_prefetch {
        config = config.with_prefetch(0);
    }

    match cli.command {
        Commands::Keys { file } => keys_command(&file, &config),
        Commands::Info { file, detailed } => info_command(&file, &config, detailed),
        Commands::Metadata { file, format, key } => {
            metadata_command(&file, &config, &format, key.as_deref())
        }
        Commands::Tensor { file, name, bytes } => tensor_command(&file, &config, &name, bytes),
        Commands::Validate { path, recursive } => validate_command(&path, &config, recursive),
    }
}

fn open(file: &Path, config: &LoadConfig) -> Result<SafeOpen> {
    SafeOpen::open_with_config(file, config)
        .with_context(|| format!("Failed to load safetensors file: {}", file.display()))
}

fn keys_command(file: &Path, config: &LoadConfig) -> Result<()> {
    let catalog = open(file, config)?;
    for name in catalog.keys() {
        println!("{}", name);
    }
    Ok(())
}

fn info_command(file: &Path, config: &LoadConfig, detailed: bool) -> Result<()> {
    let catalog = open(file, config)?;
    let map = catalog.memory_map();

    println!("Safetensors File Information");
    println!("============================");
    println!("File: {}", file.display());
    println!("File size: {} bytes", map.len());
    println!("Header size: {} bytes", catalog.data_offset());
    println!("Number of tensors: {}", catalog.len());
    println!("Number of metadata entries: {}", catalog.metadata().len());
    println!("Mapping backend: {:?}", map.backend());
    if config.lock_memory {
        println!("Locked: {} bytes", catalog.locked_len());
    }

    if detailed {
        let total: usize = catalog.tensors().map(|(_, view)| view.len()).sum();
        println!("\nTotal tensor data: {} bytes", total);
        println!();
        for (name, view) in catalog.tensors() {
            println!("{}: {} {:?} ({} bytes)", name, view.dtype(), view.shape(), view.len());
        }
    }

    Ok(())
}

fn metadata_command(
    file: &Path,
    config: &LoadConfig,
    format: &str,
    key_filter: Option<&str>,
) -> Result<()> {
    let catalog = open(file, config)?;

    let metadata: Vec<(&str, &str)> = catalog
        .metadata()
        .iter()
        .filter(|(key, _)| key_filter.map_or(true, |pattern| key.contains(pattern)))
        .collect();

    match format {
        "json" => {
            let object: serde_json::Map<String, serde_json::Value> = metadata
                .iter()
                .map(|(key, value)| (key.to_string(), serde_json::Value::from(*value)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&object)?);
        }
        "table" => {
            let width = metadata.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
            for (key, value) in metadata {
                println!("{:width$}  {}", key, value, width = width);
            }
        }
        other => bail!("Unknown output format: {}", other),
    }

    Ok(())
}

fn tensor_command(file: &Path, config: &LoadConfig, name: &str, bytes: usize) -> Result<()> {
    let catalog = open(file, config)?;
    let view = catalog.get_tensor(name).with_context(|| format!("No tensor named '{}'", name))?;

    println!("Name: {}", name);
    println!("Dtype: {}", view.dtype());
    println!("Shape: {:?}", view.shape());
    println!("Elements: {}", view.element_count());
    println!("Offsets: {:?}", view.data_offsets());
    println!("Size: {} bytes", view.len());

    let shown = &view.data()[..bytes.min(view.len())];
    if !shown.is_empty() {
        println!();
        print!("{}", hex_dump(shown));
    }

    Ok(())
}

fn validate_command(path: &Path, config: &LoadConfig, recursive: bool) -> Result<()> {
    let files = if path.is_dir() {
        let mut files = Vec::new();
        collect_files(path, recursive, &mut files)?;
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };

    let mut failures = 0usize;
    for file in &files {
        match SafeOpen::open_with_config(file, config) {
            Ok(catalog) => println!("{}: VALID ({} tensors)", file.display(), catalog.len()),
            Err(e) => {
                failures += 1;
                println!("{}: INVALID - {}", file.display(), e);
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} files failed validation", failures, files.len());
    }
    Ok(())
}

fn collect_files(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read directory: {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            if recursive {
                collect_files(&path, recursive, out)?;
            }
        } else if path.extension().map_or(false, |ext| ext == "safetensors") {
            out.push(path);
        }
    }
    Ok(())
}

/// Format bytes as offset, 16 hex columns, and printable ASCII
fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        out.push_str(&format!("{:08x}  {:<47}  |{}|\n", row * 16, hex.join(" "), ascii));
    }
    out
}
