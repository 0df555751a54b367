use serde::Deserialize;
use std::path::Path;

use crate::signals::Signal;

fn default_signals() -> Vec<Signal> {
    vec![Signal::Interrupt, Signal::Terminate]
}

/// Host-side shutdown settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ShutdownConfig {
    /// Signals that trigger shutdown.
    #[serde(default = "default_signals")]
    pub signals: Vec<Signal>,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            signals: default_signals(),
        }
    }
}

/// Load a [`ShutdownConfig`] from a TOML file.
///
/// # Examples
///
/// ```no_run
/// use conductor::config::load;
/// # #[tokio::main] async fn main() {
/// let cfg = load("tests/configs/shutdown.toml").await.unwrap();
/// assert!(!cfg.signals.is_empty());
/// # }
/// ```
pub async fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<ShutdownConfig> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(toml::from_str(&text)?)
}
