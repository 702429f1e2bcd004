mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, MergeOverrides};
use cw_av::{FfprobeProber, Prober, ToolRegistry};
use cw_core::config::Config;
use cw_pipeline::{JobExecutor, JobState};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "clipweave=trace,cw_pipeline=trace,cw_av=debug,cw_core=debug".to_string()
        } else {
            "clipweave=debug,cw_pipeline=info,cw_av=info,cw_core=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Merge {
            inputs,
            output,
            overrides,
            json,
        } => {
            let config = load_config(cli.config.as_deref(), &overrides);
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(merge(config, inputs, &output, json))
        }
        Commands::Plan {
            inputs,
            output,
            overrides,
            json,
        } => {
            let config = load_config(cli.config.as_deref(), &overrides);
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(plan(config, inputs, &output, json))
        }
        Commands::Probe { file, json } => {
            let config = Config::load_or_default(cli.config.as_deref());
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&config, &file, json))
        }
        Commands::CheckTools => {
            let config = Config::load_or_default(cli.config.as_deref());
            check_tools(&config)
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("clipweave {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Load the config file and apply command-line overrides on top.
fn load_config(path: Option<&Path>, overrides: &MergeOverrides) -> Config {
    let mut config = Config::load_or_default(path);
    if let Some(width) = overrides.width {
        config.merge.width = width;
    }
    if let Some(height) = overrides.height {
        config.merge.height = height;
    }
    if let Some(timeout) = overrides.timeout {
        config.merge.timeout_secs = timeout;
    }
    for warning in config.validate() {
        tracing::warn!("config: {warning}");
    }
    config
}

fn executor(config: &Config) -> Result<Arc<JobExecutor>> {
    let tools = ToolRegistry::discover(&config.tools);
    let executor = JobExecutor::from_tools(&tools, config.merge.clone())
        .context("cannot run without ffmpeg and ffprobe; see `clipweave check-tools`")?;
    Ok(Arc::new(executor))
}

async fn merge(config: Config, inputs: Vec<PathBuf>, output: &Path, json: bool) -> Result<()> {
    let executor = executor(&config)?;
    let handle = executor.spawn(inputs, output)?;
    tracing::info!("Started job {}", handle.id());

    let id = handle.id();
    let wait = handle.wait();
    tokio::pin!(wait);

    let job = tokio::select! {
        job = &mut wait => job?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted; cancelling job {id}");
            executor.cancel(id);
            wait.await?
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&job)?);
    }

    for warning in &job.warnings {
        eprintln!("warning: {warning}");
    }

    match &job.state {
        JobState::Succeeded => {
            if !json {
                println!(
                    "Wrote {} ({} bytes)",
                    job.output_path.display(),
                    job.output_bytes.unwrap_or_default()
                );
            }
            Ok(())
        }
        JobState::Failed(failure) => {
            anyhow::bail!("merge failed [{}]: {}", failure.category, failure.diagnostic)
        }
        other => anyhow::bail!("job ended in unexpected state {other:?}"),
    }
}

async fn plan(config: Config, inputs: Vec<PathBuf>, output: &Path, json: bool) -> Result<()> {
    let executor = executor(&config)?;
    let plan = executor.plan(inputs, output).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("Canonical frame: {}", plan.graph.target);
    println!("\nClips: {}", plan.clips.len());
    for (clip, p) in plan.clips.iter().zip(&plan.plans) {
        println!(
            "  [{}] {:?} {} -> {}x{} +{}+{}",
            p.index,
            p.kind,
            clip.path().display(),
            p.scaled_width,
            p.scaled_height,
            p.pad_offset_x,
            p.pad_offset_y
        );
    }

    if !plan.graph.warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &plan.graph.warnings {
            println!("  {warning}");
        }
    }

    println!("\nFilter graph:\n  {}", plan.filter_graph.replace(';', ";\n  "));
    println!("\nEngine arguments:\n  {}", plan.args.join(" "));
    Ok(())
}

async fn probe_file(config: &Config, file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let tools = ToolRegistry::discover(&config.tools);
    let prober = FfprobeProber::new(tools.require("ffprobe")?.to_path_buf());
    let probe = prober.probe(file).await?;
    let kind = cw_core::ClipKind::from_path(file);

    if json {
        println!("{}", serde_json::to_string_pretty(&probe)?);
    } else {
        println!("File: {}", file.display());
        println!("Kind: {kind:?}");
        if probe.has_video {
            print!("Video: {}x{}", probe.width, probe.height);
            if let Some(fps) = probe.frame_rate {
                print!(", {fps:.3} fps");
            }
            println!();
        } else {
            println!("Video: none");
        }
        println!("Audio: {}", if probe.has_audio { "yes" } else { "none" });
        if let Some(duration) = probe.duration {
            println!("Duration: {:.3}s", duration.as_secs_f64());
        }
    }

    Ok(())
}

fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg to enable merging.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("failed to read {}", p.display()))?;
            Config::from_json(&contents)?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        println!("Configuration has {} warning(s):", warnings.len());
        for warning in &warnings {
            println!("  - {warning}");
        }
    }

    let merge = &config.merge;
    println!("  Frame: {}", merge.geometry());
    println!("  Timeout: {}s", merge.timeout_secs);
    println!("  Missing audio: {:?}", merge.missing_audio);
    println!("  Audio sample rate: {} Hz", merge.audio_sample_rate);
    println!("  Image duration: {}s", merge.image_duration_secs);

    Ok(())
}
