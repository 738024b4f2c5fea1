//! Startup configuration.
//!
//! Loaded once in `main` from a `key=value` properties file and passed down
//! as a plain value object. Unknown or malformed values fall back to the
//! defaults below with a warning; a missing file means an all-defaults run,
//! which is fine for a single-machine deployment.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "googol.properties";

#[derive(Debug, Clone)]
pub struct Config {
    /// Host every service binds and is reachable on.
    pub rpc_host: String,
    /// Base port: the gateway listens here, barrel `i` on `rpc_port + 1 + i`.
    pub rpc_port: u16,
    /// Service name of the dispatcher.
    pub gateway_name: String,
    /// Number of storage barrels in the cluster.
    pub barrels_count: usize,
    /// Barrel names are formed as `<prefix><index>`; index 0 is the primary.
    pub barrels_prefix: String,
    /// Crawler worker loops per crawler process.
    pub downloader_threads: usize,
    /// Expected element count used to size the Bloom filter.
    pub bloom_expected_elements: usize,
    /// Target false-positive rate for the Bloom filter.
    pub bloom_false_positive_rate: f64,
    /// Statistics push tick, in milliseconds.
    pub statistics_monitor_interval_ms: u64,
    /// Primary barrel autosave interval, in seconds.
    pub barrel_autosave_interval_secs: u64,
    /// Directory for snapshot files and the indexed-URL log.
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_host: "127.0.0.1".to_string(),
            rpc_port: 1099,
            gateway_name: "GoogolGateway".to_string(),
            barrels_count: 2,
            barrels_prefix: "GoogolBarrel".to_string(),
            downloader_threads: 2,
            bloom_expected_elements: 10_000,
            bloom_false_positive_rate: 0.01,
            statistics_monitor_interval_ms: 3_000,
            barrel_autosave_interval_secs: 60,
            data_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, falling back to defaults when the
    /// file or individual keys are missing or invalid.
    pub fn load(path: &Path) -> Self {
        let mut config = Self::default();

        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!("Could not load {}: {}. Using defaults.", path.display(), e);
                return config;
            }
        };

        let mut props: HashMap<&str, &str> = HashMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                props.insert(key.trim(), value.trim());
            }
        }

        if let Some(host) = props.get("rpc.host") {
            config.rpc_host = host.to_string();
        }
        parse_into(&props, "rpc.port", &mut config.rpc_port);
        if let Some(name) = props.get("gateway.name") {
            config.gateway_name = name.to_string();
        }
        parse_into(&props, "barrels.count", &mut config.barrels_count);
        if let Some(prefix) = props.get("barrels.prefix") {
            config.barrels_prefix = prefix.to_string();
        }
        parse_into(&props, "downloader.threads", &mut config.downloader_threads);
        parse_into(
            &props,
            "bloom.expected.elements",
            &mut config.bloom_expected_elements,
        );
        parse_into(
            &props,
            "bloom.false.positive.rate",
            &mut config.bloom_false_positive_rate,
        );
        parse_into(
            &props,
            "statistics.monitor.interval",
            &mut config.statistics_monitor_interval_ms,
        );
        parse_into(
            &props,
            "barrel.autosave.interval",
            &mut config.barrel_autosave_interval_secs,
        );
        if let Some(dir) = props.get("data.dir") {
            config.data_dir = PathBuf::from(dir);
        }

        tracing::info!("Configuration loaded from {}", path.display());
        config
    }

    /// Names of all configured barrels, primary first.
    pub fn barrel_names(&self) -> Vec<String> {
        (0..self.barrels_count)
            .map(|i| format!("{}{}", self.barrels_prefix, i))
            .collect()
    }

    /// The barrel index encoded in `name`, if it is one of ours.
    pub fn barrel_index(&self, name: &str) -> Option<usize> {
        let suffix = name.strip_prefix(&self.barrels_prefix)?;
        let index: usize = suffix.parse().ok()?;
        (index < self.barrels_count).then_some(index)
    }

    pub fn gateway_addr(&self) -> SocketAddr {
        format!("{}:{}", self.rpc_host, self.rpc_port)
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], self.rpc_port)))
    }

    pub fn gateway_url(&self) -> String {
        format!("http://{}:{}", self.rpc_host, self.rpc_port)
    }

    pub fn barrel_addr(&self, index: usize) -> SocketAddr {
        let port = self.rpc_port + 1 + index as u16;
        format!("{}:{}", self.rpc_host, port)
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], port)))
    }

    /// Resolves a barrel name to its base URL. This is the whole "registry":
    /// names map deterministically onto ports above the gateway's.
    pub fn barrel_url(&self, name: &str) -> Option<String> {
        let index = self.barrel_index(name)?;
        Some(format!(
            "http://{}:{}",
            self.rpc_host,
            self.rpc_port + 1 + index as u16
        ))
    }
}

fn parse_into<T: std::str::FromStr>(props: &HashMap<&str, &str>, key: &str, slot: &mut T) {
    if let Some(raw) = props.get(key) {
        match raw.parse() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!("Invalid value for {}: {}", key, raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_without_file() {
        let config = Config::load(Path::new("does_not_exist.properties"));
        assert_eq!(config.rpc_port, 1099);
        assert_eq!(config.barrels_count, 2);
        assert_eq!(config.barrel_names(), vec!["GoogolBarrel0", "GoogolBarrel1"]);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("googol.properties");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "# cluster layout").unwrap();
        writeln!(file, "rpc.port = 2000").unwrap();
        writeln!(file, "barrels.count = 3").unwrap();
        writeln!(file, "bloom.false.positive.rate = 0.001").unwrap();
        writeln!(file, "downloader.threads = not-a-number").unwrap();

        let config = Config::load(&path);
        assert_eq!(config.rpc_port, 2000);
        assert_eq!(config.barrels_count, 3);
        assert_eq!(config.bloom_false_positive_rate, 0.001);
        // Invalid values keep the default.
        assert_eq!(config.downloader_threads, 2);
    }

    #[test]
    fn barrel_name_resolution() {
        let config = Config::default();
        assert_eq!(config.barrel_index("GoogolBarrel0"), Some(0));
        assert_eq!(config.barrel_index("GoogolBarrel7"), None);
        assert_eq!(config.barrel_index("SomethingElse"), None);
        assert_eq!(
            config.barrel_url("GoogolBarrel1").unwrap(),
            "http://127.0.0.1:1101"
        );
    }
}
