mod cache;
mod cli;
mod config;
mod error;
mod install;
mod packager;
mod platform;
mod range;
mod registry;
mod types;

use anyhow::{anyhow, Context, Result};
use cache::local::ToolCache;
use cache::remote::{ArchiveCache, DirectoryStore, HttpStore};
use cache::RemoteCache;
use clap::Parser;
use cli::{Cli, Commands, ConfigAction};
use config::{get_temp_root, load_settings};
use install::Orchestrator;
use packager::PackagerInstaller;
use registry::{NpmRegistry, Resolver};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use types::{InstallOptions, ToolstashSettings};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli)?;

    let mut settings = load_settings()?;

    match cli.command {
        Commands::Version => {
            println!("toolstash v{}", env!("CARGO_PKG_VERSION"));
        }

        Commands::Config { action } => match action {
            ConfigAction::Show { format } => {
                let rendered = match format.as_str() {
                    "json" => serde_json::to_string_pretty(&settings)?,
                    "yaml" => serde_yaml::to_string(&settings)?,
                    other => return Err(anyhow!("Unknown format '{}'. Use json or yaml.", other)),
                };
                println!("{}", rendered.trim_end());
            }
        },

        Commands::Resolve { specifier, package } => {
            if let Some(package) = package {
                settings.package = package;
            }
            let registry = NpmRegistry::new(&settings.registry);
            let resolver = Resolver::new(&settings.package, &registry);
            let version = resolver
                .resolve(&specifier)
                .await
                .with_context(|| format!("Failed to resolve {}@{}", settings.package, specifier))?;
            println!("{}", version);
        }

        Commands::Install {
            tool_version,
            packager,
            cache,
            cache_key,
            package,
            cache_dir,
            remote_cache,
            add_path,
        } => {
            if let Some(package) = package {
                settings.package = package;
            }
            if let Some(cache_dir) = cache_dir {
                settings.cache_dir = cache_dir;
            }
            if remote_cache.is_some() {
                settings.remote_cache = remote_cache;
            }

            let options = InstallOptions {
                version: tool_version,
                packager,
                cache,
                cache_key,
            };
            let bin = run_install(&settings, &options).await?;

            if add_path {
                add_to_github_path(&bin)?;
            }
            println!("{}", bin.display());
        }
    }

    Ok(())
}

async fn run_install(settings: &ToolstashSettings, options: &InstallOptions) -> Result<PathBuf> {
    let registry = NpmRegistry::new(&settings.registry);
    let local = ToolCache::new(&settings.cache_dir, &settings.package);
    let temp_root = get_temp_root();

    let mut installer = PackagerInstaller::new(&settings.package, &temp_root);
    if let Some(search_path) = &settings.packager_path {
        tracing::debug!("Looking up packagers in {}", search_path);
        installer = installer.with_search_path(search_path);
    }

    let remote = settings.remote_cache.as_deref().map(|location| -> Box<dyn RemoteCache> {
        let local = local.clone();
        if location.starts_with("http://") || location.starts_with("https://") {
            tracing::debug!("Remote cache over HTTP at {}", location);
            let store = HttpStore::new(location, settings.remote_token.clone());
            Box::new(ArchiveCache::new(store, local, &settings.package, &temp_root))
        } else {
            tracing::debug!("Remote cache in directory {}", location);
            Box::new(ArchiveCache::new(
                DirectoryStore::new(location),
                local,
                &settings.package,
                &temp_root,
            ))
        }
    });

    let orchestrator = Orchestrator::new(
        Resolver::new(&settings.package, &registry),
        &local,
        remote.as_deref(),
        &installer,
    );

    orchestrator.install(options).await.with_context(|| {
        format!(
            "Failed to install {}@{} with {}",
            settings.package, options.version, options.packager
        )
    })
}

fn add_to_github_path(bin: &Path) -> Result<()> {
    let github_path = std::env::var_os("GITHUB_PATH")
        .filter(|p| !p.is_empty())
        .ok_or_else(|| anyhow!("--add-path needs GITHUB_PATH to be set"))?;

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&github_path)
        .with_context(|| format!("Could not open {}", Path::new(&github_path).display()))?;
    writeln!(file, "{}", bin.display())?;

    tracing::info!("Added {} to GITHUB_PATH", bin.display());
    Ok(())
}

fn setup_logging(cli: &Cli) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if cli.quiet {
        "error"
    } else if cli.verbose == 0 {
        "warn"
    } else if cli.verbose == 1 {
        "info"
    } else {
        "debug"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout is reserved for the resolved path
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    Ok(())
}
