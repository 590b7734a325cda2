use anyhow::Context;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "chatpipe";

fn ensure_dir(path: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))?;
    Ok(path.to_path_buf())
}

/// Config directory for the given environment: `$CHATPIPE_HOME/config`, then
/// `$XDG_CONFIG_HOME/chatpipe`, then `$HOME/.config/chatpipe`.
fn resolve_config_dir(var: impl Fn(&str) -> Option<OsString>) -> Option<PathBuf> {
    let set = |name: &str| var(name).filter(|v| !v.is_empty()).map(PathBuf::from);
    if let Some(base) = set("CHATPIPE_HOME") {
        return Some(base.join("config"));
    }
    if let Some(xdg) = set("XDG_CONFIG_HOME") {
        return Some(xdg.join(APP_DIR));
    }
    set("HOME").map(|home| home.join(".config").join(APP_DIR))
}

pub fn config_dir() -> anyhow::Result<PathBuf> {
    let dir = resolve_config_dir(|name| env::var_os(name))
        .context("cannot locate a config directory: set CHATPIPE_HOME or HOME")?;
    ensure_dir(&dir)
}

pub fn config_file() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}
