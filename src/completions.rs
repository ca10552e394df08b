use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap_complete::{generate, Shell};
use thiserror::Error;

use crate::atomic::write_atomic;
use crate::config::APP_DIR_NAME;

pub const BIN_NAME: &str = "todo";

const RC_MARKER: &str = "# todo shell completions";

#[derive(Debug, Error)]
pub enum CompletionsError {
    #[error("unknown shell '{0}'; expected bash, zsh, fish, elvish or powershell")]
    UnknownShell(String),
    #[error("unable to detect shell from $SHELL; pass a shell name")]
    Undetected,
    #[error("could not determine home directory")]
    NoHomeDir,
    #[error("installing completions for {0} is not supported; redirect `todo completions {0}` instead")]
    Unsupported(Shell),
    #[error("could not write completions to {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Where `--install` put things.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionsInstall {
    pub script: PathBuf,
    /// The rc file that now sources the script, when one had to be patched.
    pub rc_patched: Option<PathBuf>,
}

pub fn generate_completions(shell: Shell, buf: &mut dyn Write) {
    let mut cmd = crate::cli::styled_command();
    generate(shell, &mut cmd, BIN_NAME, buf);
}

/// Explicit name first, then `$SHELL`.
pub fn resolve_shell(name: Option<&str>) -> Result<Shell, CompletionsError> {
    match name {
        Some(name) => parse_shell(name),
        None => Shell::from_env().ok_or(CompletionsError::Undetected),
    }
}

fn parse_shell(raw: &str) -> Result<Shell, CompletionsError> {
    let normalized = raw.trim().to_ascii_lowercase();
    let normalized = match normalized.as_str() {
        "pwsh" => "powershell",
        other => other,
    };
    Shell::from_str(normalized).map_err(|_| CompletionsError::UnknownShell(raw.to_string()))
}

/// Script location for `shell` under `home`. zsh has no per-user completion dir,
/// so its script lives with the app and gets sourced from `.zshrc`.
fn script_path(shell: Shell, home: &Path) -> Option<PathBuf> {
    let path = match shell {
        Shell::Bash => home
            .join(".local/share/bash-completion/completions")
            .join(BIN_NAME),
        Shell::Zsh => home
            .join(".config")
            .join(APP_DIR_NAME)
            .join("completions")
            .join(format!("{BIN_NAME}.zsh")),
        Shell::Fish => home
            .join(".config/fish/completions")
            .join(format!("{BIN_NAME}.fish")),
        _ => return None,
    };
    Some(path)
}

pub fn install_completions(shell: Shell) -> Result<CompletionsInstall, CompletionsError> {
    let home = dirs::home_dir().ok_or(CompletionsError::NoHomeDir)?;
    install_under(shell, &home)
}

fn install_under(shell: Shell, home: &Path) -> Result<CompletionsInstall, CompletionsError> {
    let script = script_path(shell, home).ok_or(CompletionsError::Unsupported(shell))?;
    let mut buf = Vec::new();
    generate_completions(shell, &mut buf);
    write_atomic(&script, &buf).map_err(|source| CompletionsError::Io {
        path: script.clone(),
        source,
    })?;

    let rc_patched = if shell == Shell::Zsh {
        let zshrc = home.join(".zshrc");
        ensure_sourced(&zshrc, &script)
            .map_err(|source| CompletionsError::Io {
                path: zshrc.clone(),
                source,
            })?
            .then_some(zshrc)
    } else {
        None
    };
    tracing::info!(shell = %shell, script = %script.display(), "completions installed");
    Ok(CompletionsInstall { script, rc_patched })
}

/// Appends a marked `source` line to `rc` unless it is already there. Returns
/// whether the file changed.
fn ensure_sourced(rc: &Path, script: &Path) -> io::Result<bool> {
    let source_line = format!("source \"{}\"", script.display());
    let existing = match std::fs::read_to_string(rc) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err),
    };
    if existing.lines().any(|line| line.trim() == source_line) {
        return Ok(false);
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(&format!("\n{RC_MARKER}\n{source_line}\n"));
    write_atomic(rc, updated.as_bytes())?;
    Ok(true)
}

pub fn run_completions_command(
    shell_arg: Option<&str>,
    install: bool,
) -> Result<(), crate::app::AppError> {
    let shell = resolve_shell(shell_arg)?;
    if !install {
        generate_completions(shell, &mut io::stdout().lock());
        return Ok(());
    }

    let outcome = install_completions(shell)?;
    println!("completions installed to {}", outcome.script.display());
    if let Some(rc) = outcome.rc_patched {
        println!("added a source line to {}; open a new shell to load it", rc.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap_complete::Shell;
    use uuid::Uuid;

    use super::{
        ensure_sourced, generate_completions, install_under, parse_shell, script_path,
        CompletionsError, RC_MARKER,
    };

    fn unique_home() -> PathBuf {
        let home = std::env::temp_dir().join(format!("todo-completions-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&home).expect("home should be creatable");
        home
    }

    #[test]
    fn shell_names_parse_case_insensitively() {
        assert_eq!(parse_shell("ZSH").expect("zsh"), Shell::Zsh);
        assert_eq!(parse_shell(" pwsh ").expect("pwsh"), Shell::PowerShell);
        assert!(matches!(
            parse_shell("tcsh"),
            Err(CompletionsError::UnknownShell(name)) if name == "tcsh"
        ));
    }

    #[test]
    fn script_paths_for_known_shells() {
        let home = PathBuf::from("/tmp/test-home");
        assert_eq!(
            script_path(Shell::Bash, &home),
            Some(home.join(".local/share/bash-completion/completions/todo"))
        );
        assert_eq!(
            script_path(Shell::Zsh, &home),
            Some(home.join(".config/todo-cli/completions/todo.zsh"))
        );
        assert_eq!(
            script_path(Shell::Fish, &home),
            Some(home.join(".config/fish/completions/todo.fish"))
        );
        assert_eq!(script_path(Shell::Elvish, &home), None);
    }

    #[test]
    fn generated_script_mentions_subcommands() {
        let mut buf = Vec::new();
        generate_completions(Shell::Bash, &mut buf);
        let script = String::from_utf8(buf).expect("utf8 completions");
        assert!(script.contains("todo"));
        assert!(script.contains("archive"));
        assert!(script.contains("doctor"));
    }

    #[test]
    fn zsh_install_writes_script_and_sources_it_once() {
        let home = unique_home();
        std::fs::write(home.join(".zshrc"), "export EDITOR=vi").expect("seed zshrc");

        let first = install_under(Shell::Zsh, &home).expect("first install");
        assert!(first.script.exists());
        assert_eq!(first.rc_patched, Some(home.join(".zshrc")));

        let second = install_under(Shell::Zsh, &home).expect("second install");
        assert_eq!(second.rc_patched, None);

        let zshrc = std::fs::read_to_string(home.join(".zshrc")).expect("zshrc");
        assert!(zshrc.starts_with("export EDITOR=vi\n"));
        assert_eq!(zshrc.matches(RC_MARKER).count(), 1);
        let _ = std::fs::remove_dir_all(home);
    }

    #[test]
    fn unsupported_shell_installs_nothing() {
        let home = unique_home();
        assert!(matches!(
            install_under(Shell::Elvish, &home),
            Err(CompletionsError::Unsupported(Shell::Elvish))
        ));
        assert!(ensure_sourced(&home.join(".zshrc"), &home.join("x.zsh")).expect("patch"));
        let _ = std::fs::remove_dir_all(home);
    }
}
