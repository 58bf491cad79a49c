//! Vignette - a local preview workbench for UI component stories.

mod bundler;
mod cli;
mod control;
mod css;
mod exec;
mod html;
mod logger;
mod resolver;
mod server;
mod state;
mod story;
mod watch;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use css::{CssStrategy, tailwind::TailwindWatcher};
use server::{Backend, HmrClients};
use state::{Snapshot, SnapshotStore};
use std::{path::PathBuf, sync::Arc};
use watch::HmrContext;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render { path, port, watch } => render(path, port, watch.unwrap_or(true)),
    }
}

/// Discover, serve, watch: the whole preview pipeline for one project.
fn render(path: PathBuf, port: u16, watch_enabled: bool) -> Result<()> {
    exec::require_tool("bun")?;
    exec::require_tool("bunx")?;

    let project_root = path
        .canonicalize()
        .with_context(|| format!("Project directory not found: {}", path.display()))?;

    // Initial load: stories and CSS in parallel
    let (report, css) = rayon::join(
        || story::discover_stories(&project_root),
        || css::load_css(&project_root),
    );
    let css = css?;
    for failure in &report.failures {
        log!("error"; "{}:\n{:#}", failure.path.display(), failure.error);
    }
    log!("render"; "found {} stories", report.stories.len());

    let store = Arc::new(SnapshotStore::new(Snapshot {
        stories: report.stories,
        css,
        project_root: project_root.clone(),
    }));
    let clients = Arc::new(HmrClients::default());

    let backend = Backend::start(Arc::clone(&store), Arc::clone(&clients), port)?;

    // Persistent Tailwind watch process for fast CSS on reload cycles
    let tailwind = if watch_enabled
        && css::detect_strategies(&project_root)?.contains(&CssStrategy::Tailwind)
    {
        Some(Arc::new(TailwindWatcher::start(&project_root)?))
    } else {
        None
    };

    // Graceful shutdown: stop the CSS watch process, unblock the server
    let server_for_signal = backend.handle();
    let tailwind_for_signal = tailwind.clone();
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        if let Some(watcher) = &tailwind_for_signal {
            watcher.stop();
        }
        server_for_signal.unblock();
    })
    .context("Failed to set Ctrl+C handler")?;

    if watch_enabled {
        let ctx = HmrContext {
            project_root,
            store,
            clients,
            tailwind,
        };
        std::thread::spawn(move || {
            if let Err(err) = watch::watch_for_changes_blocking(&ctx) {
                log!("watch"; "{err:#}");
            }
        });
    }

    // Request loop on the main thread, blocks until Ctrl+C
    backend.serve()
}
