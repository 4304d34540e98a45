mod cli;

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;

use streamfs::{ChannelRegistry, ChannelVfs, Config};

use crate::cli::Cli;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::discover(cli.config.as_deref())?;
    cli.apply(&mut config);

    let registry = load_registry(cli.channels_file.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("streamfs-worker")
        .build()
        .context("failed to start async runtime")?;

    let vfs = ChannelVfs::from_config(&config, registry);
    mount(vfs, &cli.mountpoint, &config, &runtime)
}

/// Missing or absent channel list means an empty registry
fn load_registry(path: Option<&Path>) -> anyhow::Result<ChannelRegistry> {
    match path {
        Some(path) if path.exists() => ChannelRegistry::load_file(path)
            .with_context(|| format!("failed to read channel list {}", path.display())),
        Some(path) => {
            tracing::warn!(path = %path.display(), "channel list not found, starting empty");
            Ok(ChannelRegistry::new())
        }
        None => Ok(ChannelRegistry::new()),
    }
}

#[cfg(feature = "fuse")]
fn mount(
    vfs: ChannelVfs,
    mountpoint: &Path,
    config: &Config,
    runtime: &tokio::runtime::Runtime,
) -> anyhow::Result<()> {
    use streamfs::fuse::{mount_options, ChannelFs};

    let fs = ChannelFs::new(vfs, runtime.handle().clone(), config.attr_ttl());
    let mut session = fuser::Session::new(fs, mountpoint, &mount_options())
        .with_context(|| format!("failed to mount at {}", mountpoint.display()))?;

    let mut unmounter = session.unmount_callable();
    runtime.spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown requested, unmounting");
        if let Err(e) = unmounter.unmount() {
            tracing::error!(error = %e, "failed to unmount");
        }
    });

    tracing::info!(mountpoint = %mountpoint.display(), "serving channel filesystem");
    session.run().context("filesystem session failed")?;
    Ok(())
}

#[cfg(not(feature = "fuse"))]
fn mount(
    _vfs: ChannelVfs,
    _mountpoint: &Path,
    _config: &Config,
    _runtime: &tokio::runtime::Runtime,
) -> anyhow::Result<()> {
    anyhow::bail!("streamfs was built without the `fuse` feature")
}

#[cfg(feature = "fuse")]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(signal) => signal,
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for SIGTERM");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}
