use clap::{Parser, Subcommand};

/// Tagstash - Tagged in-process cache for graph workflow hosts
///
/// Tagstash keeps loaded models and intermediate results in memory between
/// graph runs, bounded per tag, and tells the scheduler when a cached
/// input actually changed.
#[derive(Parser, Debug)]
#[command(name = "tagstash")]
#[command(author = "Tagstash Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tagged in-process cache for graph workflow hosts", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Common configuration arguments shared across commands
#[derive(Parser, Debug, Clone, Default)]
pub struct CommonConfigArgs {
    /// Config file path
    #[arg(short = 'c', long, env = "TAGSTASH_CONFIG")]
    pub config: Option<String>,

    /// Tag settings file (.json or .toml)
    #[arg(long, env = "TAGSTASH_CONFIG_SETTINGS_FILE")]
    pub config_settings_file: Option<String>,

    /// Eviction policy (lru|fifo)
    #[arg(long, env = "TAGSTASH_CONFIG_EVICTION_POLICY")]
    pub config_eviction_policy: Option<String>,

    /// Directory resource names are resolved against
    #[arg(long, env = "TAGSTASH_CONFIG_MODELS_DIR")]
    pub config_models_dir: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Configuration management utilities
    Config(ConfigArgs),

    /// Show resolved configuration, tag settings and available resources
    Inspect(InspectArgs),

    /// Show or apply persisted tag settings
    Settings(SettingsArgs),

    /// Run a workflow of node steps against an in-process backend
    Replay(ReplayArgs),
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Validate {
        /// Path to config file
        path: String,
    },
    /// Generate example config file
    Generate,
    /// Show effective configuration (merged from all sources)
    Show {
        #[command(flatten)]
        config_args: CommonConfigArgs,
    },
}

#[derive(Parser, Debug)]
pub struct InspectArgs {
    #[command(flatten)]
    pub config_args: CommonConfigArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub command: SettingsCommands,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommands {
    /// Print persisted settings as an editable cache report
    Show {
        #[command(flatten)]
        config_args: CommonConfigArgs,
    },
    /// Parse the settings section of a cache report and persist it
    Apply {
        /// Report file, or '-' for stdin
        report: String,

        /// Parse and print the result without writing it
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        config_args: CommonConfigArgs,
    },
}

#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// Workflow file (TOML with [[step]] tables)
    pub workflow: String,

    /// Number of graph passes to run
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub passes: u32,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub config_args: CommonConfigArgs,
}
