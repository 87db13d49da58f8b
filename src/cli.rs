use crate::types::Packager;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

fn get_version() -> &'static str {
    const BASE_VERSION: &str = env!("CARGO_PKG_VERSION");

    // If there's a git tag at HEAD, use just the tag (release build)
    if let Some(tag) = option_env!("TOOLSTASH_GIT_TAG") {
        return tag;
    }

    let commit = option_env!("TOOLSTASH_GIT_COMMIT").unwrap_or("unknown");
    let branch = option_env!("TOOLSTASH_GIT_BRANCH").unwrap_or("unknown");

    // Leaked once at startup
    let version = format!("v{}-{} ({})", BASE_VERSION, commit, branch);
    Box::leak(version.into_boxed_str())
}

#[derive(Parser)]
#[command(name = "toolstash")]
#[command(about = "Resolve, install and cache npm-distributed CLI tools for CI jobs")]
#[command(version = get_version(), propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (use multiple times for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Reduce output to errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install a version of the tool and print its bin directory
    #[command(
        after_help = "Examples:\n  toolstash install --tool-version 3.0.10\n  toolstash install --tool-version beta --packager yarn\n  toolstash install --cache --cache-key node18 --add-path"
    )]
    Install {
        /// Exact version, semver range or dist-tag
        #[arg(long, default_value = "latest")]
        tool_version: String,

        /// Package manager used for fresh installs
        #[arg(long, value_enum, default_value_t = Packager::Npm)]
        packager: Packager,

        /// Use the remote cache for lookups and uploads
        #[arg(long)]
        cache: bool,

        /// Extra suffix appended to the remote cache key
        #[arg(long)]
        cache_key: Option<String>,

        /// Package to install (overrides configuration)
        #[arg(long)]
        package: Option<String>,

        /// Local tool cache directory (overrides configuration)
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Remote cache location: a directory or an http(s) URL
        #[arg(long)]
        remote_cache: Option<String>,

        /// Append the bin directory to the file named by GITHUB_PATH
        #[arg(long)]
        add_path: bool,
    },

    /// Resolve a version specifier against the registry
    Resolve {
        /// Exact version, semver range or dist-tag
        #[arg(default_value = "latest")]
        specifier: String,

        /// Package to resolve (overrides configuration)
        #[arg(long)]
        package: Option<String>,
    },

    /// Inspect toolstash's configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show the current version
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Output format (json, yaml)
        #[arg(long, default_value = "json")]
        format: String,
    },
}
