use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Shared secret used when no `--auth-key` is supplied.
pub const DEFAULT_AUTH_KEY: &str = "SuperSecretAuthKey123";

/// How to launch one game-server build.
///
/// The worker is started as `path <args...> --port=<port> --place=<placeId>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinarySpec {
    /// Executable to run
    pub path: PathBuf,
    /// Leading arguments placed before the port and place arguments
    pub args: Vec<String>,
}

impl BinarySpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Static mapping from year (variant) to the binary that serves it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryTable {
    entries: BTreeMap<u32, BinarySpec>,
}

impl BinaryTable {
    /// The RCC builds shipped with a stock arbiter install.
    pub fn revival_defaults() -> Self {
        let mut table = Self::default();
        for year in [2008, 2011, 2015] {
            table.insert(
                year,
                BinarySpec::new(format!("C:\\RevivalServer\\RCC{}.exe", year)),
            );
        }
        table
    }

    pub fn insert(&mut self, variant: u32, spec: BinarySpec) {
        self.entries.insert(variant, spec);
    }

    pub fn get(&self, variant: u32) -> Option<&BinarySpec> {
        self.entries.get(&variant)
    }

    pub fn variants(&self) -> Vec<u32> {
        self.entries.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Respawn behaviour after a worker exits on its own.
#[derive(Debug, Clone)]
pub struct RestartConfig {
    /// Delay between observing a crash and launching the replacement
    pub respawn_delay_ms: u64,
    /// Respawns allowed per workload lineage. `None` means unlimited.
    pub max_restarts: Option<u32>,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            respawn_delay_ms: 3000,
            max_restarts: None,
        }
    }
}

impl RestartConfig {
    pub fn respawn_delay(&self) -> Duration {
        Duration::from_millis(self.respawn_delay_ms)
    }

    /// Whether a job that has already been respawned `restarts` times may be respawned again.
    pub fn allows_restart(&self, restarts: u32) -> bool {
        self.max_restarts.map_or(true, |max| restarts < max)
    }
}

#[derive(Debug, Clone)]
pub struct ArbiterConfig {
    /// Address the control API listens on
    pub listen_addr: SocketAddr,
    /// First port handed to game servers
    pub base_port: u16,
    /// Number of ports available starting at `base_port`
    pub port_capacity: u16,
    /// Expected value of the `pjx-arbiterauth` header
    pub auth_key: String,
    pub binaries: BinaryTable,
    pub restart: RestartConfig,
    /// How long a game server gets to exit after SIGTERM before it is SIGKILLed
    pub stop_grace_ms: u64,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            base_port: 7000,
            port_capacity: 1000,
            auth_key: DEFAULT_AUTH_KEY.to_string(),
            binaries: BinaryTable::revival_defaults(),
            restart: RestartConfig::default(),
            stop_grace_ms: 5000,
        }
    }
}

impl ArbiterConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_binary(mut self, variant: u32, spec: BinarySpec) -> Self {
        self.binaries.insert(variant, spec);
        self
    }

    pub fn with_auth_key(mut self, key: impl Into<String>) -> Self {
        self.auth_key = key.into();
        self
    }

    pub fn with_respawn_delay_ms(mut self, delay_ms: u64) -> Self {
        self.restart.respawn_delay_ms = delay_ms;
        self
    }

    pub fn with_stop_grace_ms(mut self, grace_ms: u64) -> Self {
        self.stop_grace_ms = grace_ms;
        self
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}
