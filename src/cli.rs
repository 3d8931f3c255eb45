use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use pgadmin4_runtime::update::UpdateCheckParams;

#[derive(Parser, Debug)]
#[command(version, about = "pgAdmin 4 desktop runtime")]
pub struct Args {
    /// Sub‑commands (run, config)
    #[command(subcommand)]
    pub sub: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Start the pgAdmin server and open it (default if no sub‑command)
    Run(RunArgs),
    /// Inspect or edit runtime_config.json
    Config {
        #[command(subcommand)]
        action: ConfigCmd,

        /// Directory holding runtime_config.json
        #[arg(long, global = true)]
        config_dir: Option<PathBuf>,
    },
}

#[derive(ClapArgs, Debug, Default)]
pub struct RunArgs {
    /// Directory holding runtime_config.json
    #[arg(long)]
    pub config_dir: Option<PathBuf>,

    /// Seconds to wait for the server (overrides connectionTimeout)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Do not check for updates after start
    #[arg(long)]
    pub no_auto_update: bool,

    /// Print the URL instead of opening a browser
    #[arg(long)]
    pub no_browser: bool,

    #[command(flatten)]
    pub update: UpdateArgs,
}

/// Release information for the update check; all five are needed.
#[derive(ClapArgs, Debug, Default)]
pub struct UpdateArgs {
    /// Release package location
    #[arg(long)]
    pub auto_update_url: Option<String>,

    #[arg(long)]
    pub upgrade_version: Option<String>,

    #[arg(long)]
    pub upgrade_version_int: Option<u64>,

    #[arg(long)]
    pub current_version_int: Option<u64>,

    #[arg(long)]
    pub product_name: Option<String>,
}

impl From<UpdateArgs> for UpdateCheckParams {
    fn from(args: UpdateArgs) -> Self {
        UpdateCheckParams {
            auto_update_url: args.auto_update_url,
            upgrade_version: args.upgrade_version,
            upgrade_version_int: args.upgrade_version_int,
            current_version_int: args.current_version_int,
            product_name: args.product_name,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum ConfigCmd {
    /// Print the stored configuration
    Show,
    /// Set a key; JSON values are stored typed, an empty value removes the key
    Set { key: String, value: String },
}
