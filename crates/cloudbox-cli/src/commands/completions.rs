//! Shell completions.

use std::io;
use std::path::{Path, PathBuf};
use std::{env, fs};

use anyhow::{anyhow, Context, Result};
use clap::CommandFactory;
use clap_complete::{generate, Shell};

use super::{Cli, CompletionsAction, ShellType};

const BIN_NAME: &str = "cloudbox";

impl From<ShellType> for Shell {
    fn from(shell: ShellType) -> Self {
        match shell {
            ShellType::Bash => Self::Bash,
            ShellType::Zsh => Self::Zsh,
            ShellType::Fish => Self::Fish,
            ShellType::PowerShell => Self::PowerShell,
            ShellType::Elvish => Self::Elvish,
        }
    }
}

/// Run the completions command.
pub fn run(action: CompletionsAction) -> Result<()> {
    match action {
        CompletionsAction::Generate { shell } => {
            generate(Shell::from(shell), &mut Cli::command(), BIN_NAME, &mut io::stdout());
            Ok(())
        }
        CompletionsAction::Install { shell } => {
            let shell = resolve(shell)?;
            let path = script_path(shell, &Dirs::from_env()?);

            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            fs::write(&path, script(shell))
                .with_context(|| format!("Failed to write completions to: {}", path.display()))?;

            println!("  Installed {shell:?} completions to {}", path.display());
            println!();
            for line in activation_hint(shell, &path) {
                println!("  {line}");
            }
            Ok(())
        }
        CompletionsAction::Uninstall { shell } => {
            let shell = resolve(shell)?;
            let path = script_path(shell, &Dirs::from_env()?);

            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove: {}", path.display()))?;
                println!("  Removed {shell:?} completions from {}", path.display());
            } else {
                println!("  No completions installed at {}", path.display());
            }
            Ok(())
        }
    }
}

fn script(shell: ShellType) -> Vec<u8> {
    let mut buf = Vec::new();
    generate(Shell::from(shell), &mut Cli::command(), BIN_NAME, &mut buf);
    buf
}

fn resolve(shell: Option<ShellType>) -> Result<ShellType> {
    if let Some(shell) = shell {
        return Ok(shell);
    }
    let path = env::var("SHELL")
        .context("$SHELL is not set; pass --shell to choose a shell")?;
    shell_from_path(&path)
        .ok_or_else(|| anyhow!("Unsupported shell '{path}'; pass --shell to choose one"))
}

fn shell_from_path(path: &str) -> Option<ShellType> {
    let name = Path::new(path).file_stem()?.to_str()?.to_ascii_lowercase();
    match name.as_str() {
        "bash" => Some(ShellType::Bash),
        "zsh" => Some(ShellType::Zsh),
        "fish" => Some(ShellType::Fish),
        "pwsh" | "powershell" => Some(ShellType::PowerShell),
        "elvish" => Some(ShellType::Elvish),
        _ => None,
    }
}

/// Base directories completion scripts are installed under.
struct Dirs {
    home: PathBuf,
    data: PathBuf,
    config: PathBuf,
}

impl Dirs {
    fn from_env() -> Result<Self> {
        let home = env::var_os("HOME")
            .filter(|h| !h.is_empty())
            .map(PathBuf::from)
            .context("Could not determine home directory")?;
        let xdg = |var: &str, fallback: &str| {
            env::var_os(var)
                .filter(|v| !v.is_empty())
                .map_or_else(|| home.join(fallback), PathBuf::from)
        };

        Ok(Self {
            data: xdg("XDG_DATA_HOME", ".local/share"),
            config: xdg("XDG_CONFIG_HOME", ".config"),
            home,
        })
    }
}

fn script_path(shell: ShellType, dirs: &Dirs) -> PathBuf {
    match shell {
        ShellType::Bash => dirs.data.join("bash-completion/completions").join(BIN_NAME),
        ShellType::Zsh => dirs.data.join("zsh/site-functions").join(format!("_{BIN_NAME}")),
        ShellType::Fish => dirs.config.join("fish/completions").join(format!("{BIN_NAME}.fish")),
        ShellType::PowerShell if cfg!(windows) => dirs
            .home
            .join("Documents/PowerShell/Modules/CloudboxCompletion/CloudboxCompletion.psm1"),
        ShellType::PowerShell => dirs
            .config
            .join("powershell/Microsoft.PowerShell_profile.d")
            .join(format!("{BIN_NAME}.ps1")),
        ShellType::Elvish => dirs.home.join(".elvish/lib").join(format!("{BIN_NAME}.elv")),
    }
}

fn activation_hint(shell: ShellType, path: &Path) -> Vec<String> {
    let path = path.display();
    match shell {
        ShellType::Bash => vec![format!("Restart your shell or run: source {path}")],
        ShellType::Zsh => vec![
            "Make sure ~/.zshrc contains:".into(),
            "  fpath=(~/.local/share/zsh/site-functions $fpath)".into(),
            "  autoload -Uz compinit && compinit".into(),
            "then run: exec zsh".into(),
        ],
        ShellType::Fish => vec![format!("New fish sessions pick it up, or run: source {path}")],
        ShellType::PowerShell => vec![format!("Add to your profile: Import-Module {path}")],
        ShellType::Elvish => vec![format!("Add to ~/.elvish/rc.elv: use {BIN_NAME}")],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dirs() -> Dirs {
        Dirs {
            home: PathBuf::from("/home/ana"),
            data: PathBuf::from("/home/ana/.local/share"),
            config: PathBuf::from("/home/ana/.config"),
        }
    }

    #[test]
    fn test_shell_from_path() {
        assert!(matches!(shell_from_path("/bin/zsh"), Some(ShellType::Zsh)));
        assert!(matches!(shell_from_path("/usr/local/bin/fish"), Some(ShellType::Fish)));
        assert!(matches!(shell_from_path("pwsh"), Some(ShellType::PowerShell)));
        assert!(shell_from_path("/bin/tcsh").is_none());
    }

    #[test]
    fn test_script_paths_use_binary_name() {
        assert_eq!(
            script_path(ShellType::Bash, &dirs()),
            PathBuf::from("/home/ana/.local/share/bash-completion/completions/cloudbox")
        );
        assert_eq!(
            script_path(ShellType::Zsh, &dirs()),
            PathBuf::from("/home/ana/.local/share/zsh/site-functions/_cloudbox")
        );
        assert_eq!(
            script_path(ShellType::Fish, &dirs()),
            PathBuf::from("/home/ana/.config/fish/completions/cloudbox.fish")
        );
    }

    #[test]
    fn test_generated_script_mentions_binary() {
        let script = String::from_utf8_lossy(&script(ShellType::Bash)).into_owned();
        assert!(script.contains("cloudbox"));
    }
}
