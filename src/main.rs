mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use rf_core::config::Config;
use rf_core::events::EventBus;
use rf_core::JobId;
use rf_pipeline::{presets, FfmpegTransformer, Job, JobStatus, Pipeline, TranscodeParams};

async fn start_server(host: String, port: u16, config_path: Option<&Path>) -> Result<()> {
    let mut config = Config::load_or_default(config_path);

    // Override host/port from CLI
    config.server.host = host;
    config.server.port = port;

    tracing::info!("Starting reelforge server");
    rf_server::start(config).await?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "reelforge=trace,rf_pipeline=trace,rf_av=debug,rf_server=debug,tower_http=debug"
                .to_string()
        } else {
            "reelforge=debug,rf_pipeline=debug,rf_av=info,rf_server=info,tower_http=info"
                .to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Transcode {
            input,
            preset,
            params,
            output,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(transcode(
                &input,
                preset.as_deref(),
                params.as_deref(),
                output.as_deref(),
                cli.config.as_deref(),
            ))
        }
        Commands::Presets => list_presets(),
        Commands::CheckTools => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(check_tools(cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("reelforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Run one job through the same pipeline the server uses and wait for it.
async fn transcode(
    input: &Path,
    preset: Option<&str>,
    params: Option<&str>,
    output: Option<&Path>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = Config::load_or_default(config_path);

    let params: TranscodeParams = match (preset, params) {
        (Some(name), _) => presets::resolve(name)?,
        (None, Some(json)) => serde_json::from_str(json).context("invalid --params JSON")?,
        (None, None) => anyhow::bail!("either --preset or --params is required"),
    };

    let tools = rf_av::ToolRegistry::discover(&config.tools);
    let transformer = Arc::new(FfmpegTransformer::from_registry(&tools)?);
    let pipeline = Pipeline::new(
        &config.storage,
        &config.pipeline,
        transformer,
        Arc::new(EventBus::default()),
    )?;

    let job = pipeline.submit(input, params)?;
    println!("Job {} queued ({})", job.id, job.params.format);

    let finished = tokio::select! {
        res = pipeline.wait(job.id) => res?,
        _ = tokio::signal::ctrl_c() => {
            println!("Interrupted, cancelling job...");
            cancel_and_wait(&pipeline, job.id).await?
        }
    };

    match (finished.status, &finished.result, &finished.error) {
        (JobStatus::Succeeded, Some(result), _) => {
            let dest = match output {
                Some(dest) => {
                    std::fs::copy(result, dest).with_context(|| {
                        format!("failed to copy {} to {}", result.display(), dest.display())
                    })?;
                    dest.to_path_buf()
                }
                None => result.clone(),
            };
            println!("✓ Done: {}", dest.display());
            Ok(())
        }
        (_, _, Some(failure)) => anyhow::bail!("job {} failed: {failure}", finished.id),
        _ => anyhow::bail!("job {} ended in state {}", finished.id, finished.status),
    }
}

/// Cancel a job and wait for it to settle. A job that finished before the
/// cancel landed is returned as it ended.
async fn cancel_and_wait(pipeline: &Pipeline, id: JobId) -> Result<Job> {
    match pipeline.cancel(id) {
        Ok(_) | Err(rf_core::Error::InvalidState(_)) => {}
        Err(e) => return Err(e.into()),
    }
    Ok(pipeline.wait(id).await?)
}

fn list_presets() -> Result<()> {
    for preset in presets::all() {
        println!("{:<16} {}", preset.name, preset.description);
        println!("{:<16} {}", "", serde_json::to_string(&preset.params)?);
    }
    Ok(())
}

async fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::load_or_default(config_path);
    let tools = rf_av::ToolRegistry::discover(&config.tools);
    let mut all_ok = true;

    for tool in tools.check_all().await {
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
        println!("Some tools are missing. Transcoding needs ffmpeg on PATH or tools.ffmpeg_path.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
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
        for warning in &warnings {
            println!("! {warning}");
        }
    }
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Uploads: {}", config.storage.uploads_dir.display());
    println!("  Outputs: {}", config.storage.outputs_dir.display());
    println!("  Work dir: {}", config.storage.work_root().display());
    println!(
        "  Jobs: {} concurrent, {}s timeout",
        config.pipeline.max_concurrent_jobs, config.pipeline.job_timeout_secs
    );

    Ok(())
}
