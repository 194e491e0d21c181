use crate::app::config::{FileRotation, LogSink, LoggingConfig};
use anyhow::{Context, Result, anyhow};
use std::path::Path;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

type DynLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync + 'static>;

/// Installs the global tracing subscriber described by `config`.
/// Meant for binaries; fails if a subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    config.validate()?;

    let filter = build_filter(&config.level)?;
    let mut layers: Vec<DynLayer> = Vec::new();

    for sink in &config.sinks {
        match sink {
            LogSink::Stdout { color, json } => {
                let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
                // writer lives for the whole process
                std::mem::forget(guard);

                if *json {
                    layers.push(fmt::layer().json().with_writer(non_blocking).boxed());
                } else {
                    layers.push(
                        fmt::layer()
                            .compact()
                            .with_ansi(*color)
                            .with_writer(non_blocking)
                            .boxed(),
                    );
                }
            }
            LogSink::File {
                path,
                json,
                rotation,
                max_files,
            } => {
                let writer = create_file_writer(path, rotation, *max_files)?;

                if *json {
                    layers.push(fmt::layer().json().with_writer(writer).boxed());
                } else {
                    layers.push(
                        fmt::layer()
                            .compact()
                            .with_ansi(false)
                            .with_writer(writer)
                            .boxed(),
                    );
                }
            }
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("failed to initialize tracing subscriber")?;

    Ok(())
}

/// Everything at error, this crate at `level`, `RUST_LOG` on top
fn build_filter(level: &str) -> Result<EnvFilter> {
    let crate_name = env!("CARGO_PKG_NAME");

    Ok(EnvFilter::from_default_env()
        .add_directive("error".parse()?)
        .add_directive(format!("{}={}", crate_name, level).parse()?))
}

fn create_file_writer(
    path: &Path,
    rotation: &FileRotation,
    max_files: usize,
) -> Result<tracing_appender::non_blocking::NonBlocking> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid file name in path: {}", path.display()))?;

    let directory = path
        .parent()
        .ok_or_else(|| anyhow!("Invalid directory in path: {}", path.display()))?;

    if !directory.as_os_str().is_empty() {
        std::fs::create_dir_all(directory)
            .with_context(|| format!("failed to create log directory {}", directory.display()))?;
    }

    let file_appender = match rotation {
        FileRotation::Daily => tracing_appender::rolling::daily(directory, file_name),
        FileRotation::Hourly => tracing_appender::rolling::hourly(directory, file_name),
        FileRotation::Never => tracing_appender::rolling::never(directory, file_name),
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    cleanup_old_files(directory, file_name, max_files)?;

    std::mem::forget(guard);

    Ok(non_blocking)
}

/// Keeps the `max_files` most recent files starting with `prefix`
fn cleanup_old_files(directory: &Path, prefix: &str, max_files: usize) -> Result<()> {
    if max_files == 0 {
        return Ok(());
    }

    let mut files: Vec<_> = std::fs::read_dir(directory)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(prefix))
        })
        .filter_map(|entry| {
            entry
                .metadata()
                .ok()
                .and_then(|meta| meta.modified().ok().map(|time| (entry.path(), time)))
        })
        .collect();

    if files.len() <= max_files {
        return Ok(());
    }

    files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in files.iter().skip(max_files) {
        let _ = std::fs::remove_file(path);
    }

    Ok(())
}
