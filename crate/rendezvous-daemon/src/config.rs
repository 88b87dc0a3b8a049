use anyhow::Context as _;
use rendezvous_core::config::RelayConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Address listened on when neither flag, env nor config file set one.
pub const DEFAULT_ADDRESS: &str = "localhost:9900";

/// Config file structure.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub address: Option<String>,
    pub tls: Option<TlsConfig>,
    #[serde(default)]
    pub relay: RelayConfig,
}

/// PEM-encoded certificate chain and private key.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl ConfigFile {
    /// Read and parse a TOML config file.
    ///
    /// Relative TLS paths are taken relative to the file's directory.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: ConfigFile = toml::from_str(&content)?;
        if let (Some(tls), Some(dir)) = (config.tls.as_mut(), path.parent()) {
            tls.cert = dir.join(&tls.cert);
            tls.key = dir.join(&tls.key);
        }

        Ok(config)
    }
}

/// What the daemon ends up running with.
#[derive(Debug, PartialEq)]
pub struct Settings {
    pub address: String,
    pub tls: Option<TlsConfig>,
    pub relay: RelayConfig,
}

impl Settings {
    /// Combine values from the command line (or its env variables)
    /// with the config file, if any. Command-line values win.
    pub fn resolve(
        address: Option<String>,
        cert: Option<PathBuf>,
        key: Option<PathBuf>,
        config: Option<&Path>,
    ) -> anyhow::Result<Self> {
        let file = match config {
            Some(path) => ConfigFile::load(path).with_context(|| {
                format!("{}: failed to read TOML config file", path.display())
            })?,
            None => ConfigFile::default(),
        };
        let tls = match (cert, key) {
            (Some(cert), Some(key)) => Some(TlsConfig { cert, key }),
            (None, None) => file.tls,
            _ => anyhow::bail!("--cert and --key must be given together"),
        };

        Ok(Settings {
            address: address
                .or(file.address)
                .unwrap_or_else(|| DEFAULT_ADDRESS.to_string()),
            tls,
            relay: file.relay,
        })
    }
}
