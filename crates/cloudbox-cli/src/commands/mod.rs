//! CLI command definitions and handlers.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use cloudbox_core::api::Category;
use cloudbox_core::config::Config;
use cloudbox_core::prefs::Theme;
use cloudbox_core::session::Session;
use cloudbox_core::view::ViewMode;

pub mod account;
pub mod completions;
pub mod config;
pub mod files;
pub mod prefs;
pub mod share;
pub mod upload;

/// Load configuration with graceful fallback to defaults.
///
/// A `--server` flag overrides the configured API root.
pub fn load_config(server: Option<&str>) -> Config {
    let mut config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("Using default configuration: {}", e);
        Config::default()
    });
    if let Some(server) = server {
        config.server.base_url = server.to_string();
    }
    config
}

/// Start a session against the configured server.
pub fn open_session(server: Option<&str>) -> Result<(Config, Session)> {
    let config = load_config(server);
    let session = Session::start(&config).context("Failed to start session")?;
    Ok((config, session))
}

/// Cloudbox - client for your self-hosted private cloud
#[derive(Parser)]
#[command(name = "cloudbox")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// API root of the server, e.g. http://nas.local:8000/api
    #[arg(long, global = true, env = "CLOUDBOX_SERVER")]
    pub server: Option<String>,

    /// Detailed logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Log in to the server
    Login(LoginArgs),

    /// Forget the stored login
    Logout,

    /// Show the logged-in account
    Whoami(OutputArgs),

    /// Show storage usage
    Quota(OutputArgs),

    /// Change the account password
    Passwd,

    /// List files
    Ls(LsArgs),

    /// Upload files
    Upload(UploadArgs),

    /// Delete files or folders
    Rm(RmArgs),

    /// Rename a file or folder
    Rename(RenameArgs),

    /// Create a folder
    Mkdir(MkdirArgs),

    /// Download files (several are fetched as one zip)
    Download(DownloadArgs),

    /// Show how a file would be previewed
    Preview(PreviewArgs),

    /// Create and manage share links
    Share(ShareArgs),

    /// Show or set the default listing layout
    View {
        /// New layout (list or grid)
        mode: Option<ViewMode>,
    },

    /// Show, set or toggle the colour theme
    Theme {
        /// New theme (light or dark)
        theme: Option<Theme>,

        /// Switch to the other theme
        #[arg(long, conflicts_with = "theme")]
        toggle: bool,
    },

    /// Manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Shared output options
#[derive(Parser)]
pub struct OutputArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the login command
#[derive(Parser)]
pub struct LoginArgs {
    /// Account name
    pub username: String,

    /// Password (prompted for when omitted)
    #[arg(long, env = "CLOUDBOX_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Keep the login across restarts
    #[arg(short, long)]
    pub remember: bool,
}

/// Arguments for the ls command
#[derive(Parser)]
pub struct LsArgs {
    /// Folder to list (root when omitted)
    pub folder: Option<i64>,

    /// Only show one category
    #[arg(short, long, value_enum)]
    pub category: Option<CategoryArg>,

    /// Only show names matching this text
    #[arg(short, long)]
    pub search: Option<String>,

    /// Layout for this listing only
    #[arg(long)]
    pub view: Option<ViewMode>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the upload command
#[derive(Parser)]
pub struct UploadArgs {
    /// Files to upload
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Destination folder id (root when omitted)
    #[arg(short, long)]
    pub parent: Option<i64>,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the rm command
#[derive(Parser)]
pub struct RmArgs {
    /// Ids of the entries to delete
    #[arg(required = true)]
    pub ids: Vec<i64>,

    /// Folder the entries live in (root when omitted)
    #[arg(short, long)]
    pub parent: Option<i64>,

    /// Do not ask for confirmation
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Arguments for the rename command
#[derive(Parser)]
pub struct RenameArgs {
    /// Id of the entry
    pub id: i64,

    /// New name
    pub name: String,

    /// Folder the entry lives in (root when omitted)
    #[arg(short, long)]
    pub parent: Option<i64>,
}

/// Arguments for the mkdir command
#[derive(Parser)]
pub struct MkdirArgs {
    /// Folder name
    pub name: String,

    /// Parent folder id (root when omitted)
    #[arg(short, long)]
    pub parent: Option<i64>,
}

/// Arguments for the download command
#[derive(Parser)]
pub struct DownloadArgs {
    /// Ids of the files to download
    #[arg(required = true)]
    pub ids: Vec<i64>,

    /// Folder the files live in (root when omitted)
    #[arg(short, long)]
    pub parent: Option<i64>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the preview command
#[derive(Parser)]
pub struct PreviewArgs {
    /// Id of the file
    pub id: i64,

    /// Folder the file lives in (root when omitted)
    #[arg(short, long)]
    pub parent: Option<i64>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the share command
#[derive(Parser)]
pub struct ShareArgs {
    /// Share subcommand
    #[command(subcommand)]
    pub action: ShareAction,
}

/// Share subcommands
#[derive(Subcommand)]
pub enum ShareAction {
    /// Create a share link for a file
    Create {
        /// Id of the file
        id: i64,

        /// Days until the link expires (1-7)
        #[arg(short, long, default_value_t = 7)]
        days: u8,

        /// Do not protect the link with an extract code
        #[arg(long)]
        no_code: bool,

        /// Stop after this many downloads
        #[arg(short, long)]
        max_downloads: Option<u32>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show public information about a share link
    Info {
        /// Share code or link
        code: String,
    },

    /// Download the file behind a share link
    Get {
        /// Share code or link
        code: String,

        /// Extract code
        #[arg(short = 'c', long)]
        extract_code: Option<String>,

        /// Output directory or file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List your share links
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Deactivate a share link
    Cancel {
        /// Share code or link
        code: String,
    },
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show a single value
    Get {
        /// Key, e.g. server.base_url
        key: String,
    },

    /// Set a single value
    Set {
        /// Key, e.g. upload.max_concurrent_uploads
        key: String,
        /// New value
        value: String,
    },

    /// Show the whole configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Restore the defaults
    Reset,
}

/// Arguments for the completions command
#[derive(Parser)]
pub struct CompletionsArgs {
    /// Completions subcommand
    #[command(subcommand)]
    pub action: CompletionsAction,
}

/// Completions subcommands
#[derive(Subcommand, Clone, Copy)]
pub enum CompletionsAction {
    /// Install shell completions (auto-detects shell)
    Install {
        /// Override shell detection
        #[arg(long, value_enum)]
        shell: Option<ShellType>,
    },

    /// Uninstall shell completions
    Uninstall {
        /// Override shell detection
        #[arg(long, value_enum)]
        shell: Option<ShellType>,
    },

    /// Generate completions and print to stdout (for manual installation)
    Generate {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: ShellType,
    },
}

/// Supported shell types for completions
#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum ShellType {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    #[value(name = "powershell")]
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// File categories accepted by `--category`
#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum CategoryArg {
    /// Pictures
    Image,
    /// Movies and clips
    Video,
    /// Music and recordings
    Audio,
    /// Documents
    Document,
    /// Everything else
    Other,
}

impl From<CategoryArg> for Category {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Image => Self::Image,
            CategoryArg::Video => Self::Video,
            CategoryArg::Audio => Self::Audio,
            CategoryArg::Document => Self::Document,
            CategoryArg::Other => Self::Other,
        }
    }
}

/// Dispatch a parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let server = cli.server.as_deref();
    match cli.command {
        Command::Login(args) => account::login(args, server).await,
        Command::Logout => account::logout(server).await,
        Command::Whoami(args) => account::whoami(&args, server).await,
        Command::Quota(args) => account::quota(&args, server).await,
        Command::Passwd => account::passwd(server).await,
        Command::Ls(args) => files::ls(args, server).await,
        Command::Upload(args) => upload::run(args, server).await,
        Command::Rm(args) => files::rm(args, server).await,
        Command::Rename(args) => files::rename(args, server).await,
        Command::Mkdir(args) => files::mkdir(args, server).await,
        Command::Download(args) => files::download(args, server).await,
        Command::Preview(args) => files::preview(args, server).await,
        Command::Share(args) => share::run(args.action, server).await,
        Command::View { mode } => prefs::view(mode),
        Command::Theme { theme, toggle } => prefs::theme(theme, toggle),
        Command::Config(args) => config::run(args.action),
        Command::Completions(args) => completions::run(args.action),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_upload() {
        let cli = Cli::try_parse_from(["cloudbox", "upload", "a.jpg", "b.pdf", "-p", "4"]).unwrap();
        let Command::Upload(args) = cli.command else {
            panic!("expected upload");
        };
        assert_eq!(args.paths.len(), 2);
        assert_eq!(args.parent, Some(4));
    }

    #[test]
    fn test_parse_view_mode() {
        let cli = Cli::try_parse_from(["cloudbox", "view", "grid"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::View {
                mode: Some(ViewMode::Grid)
            }
        ));
        assert!(Cli::try_parse_from(["cloudbox", "view", "tiles"]).is_err());
    }

    #[test]
    fn test_global_server_flag() {
        let cli =
            Cli::try_parse_from(["cloudbox", "ls", "--server", "http://nas:8000/api"]).unwrap();
        assert_eq!(cli.server.as_deref(), Some("http://nas:8000/api"));
    }
}
