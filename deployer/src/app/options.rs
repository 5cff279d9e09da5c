//! Application configuration options

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::containers::naming::DEFAULT_CONTAINER_PREFIX;
use crate::deploy::orchestrator::DeployOptions;
use crate::logs::{LogLevel, LogOptions};
use crate::storage::layout::StorageLayout;

pub const DEFAULT_PORT: u16 = 4000;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Server configuration
    pub server: ServerOptions,

    /// Storage layout paths
    pub layout: StorageLayout,

    /// Container engine and naming
    pub containers: ContainerOptions,

    /// Deploy pipeline
    pub deploy: DeployOptions,

    /// Logging
    pub log: LogOptions,

    /// Problems found while reading the environment, logged once logging is up
    pub warnings: Vec<String>,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            server: ServerOptions::default(),
            layout: StorageLayout::default(),
            containers: ContainerOptions::default(),
            deploy: DeployOptions::default(),
            log: LogOptions::default(),
            warnings: Vec::new(),
        }
    }
}

/// Lifecycle options for the service
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Container engine options
#[derive(Debug, Clone)]
pub struct ContainerOptions {
    /// Engine CLI binary
    pub engine_bin: String,

    /// Managed container name prefix
    pub prefix: String,

    /// Base of the public app links
    pub public_base_url: Option<Url>,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            engine_bin: "docker".to_string(),
            prefix: DEFAULT_CONTAINER_PREFIX.to_string(),
            public_base_url: None,
        }
    }
}

impl AppOptions {
    /// Read options from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read options through `lookup`. Malformed values keep their default and
    /// add an entry to `warnings`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env = EnvReader {
            lookup,
            warnings: Vec::new(),
        };
        let mut options = AppOptions::default();

        // Server
        if let Some(host) = env.text("API_HOST") {
            options.server.host = host;
        }
        let port_key = if env.text("API_PORT").is_some() { "API_PORT" } else { "PORT" };
        options.server.port = env.parse(port_key, options.server.port);

        // Storage
        if let Some(dir) = env.text("DATA_DIR") {
            options.layout.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env.text("PUBLISH_ROOT") {
            options.layout.publish_root = PathBuf::from(dir);
        }
        if let Some(dir) = env.text("WORKSPACE_ROOT") {
            options.layout.workspace_root = PathBuf::from(dir);
        }

        // Containers
        if let Some(prefix) = env.text("CONTAINER_PREFIX") {
            options.containers.prefix = prefix;
        }
        if let Some(bin) = env.text("CONTAINER_ENGINE") {
            options.containers.engine_bin = bin;
        }
        if let Some(raw) = env.text("PUBLIC_BASE_URL") {
            match Url::parse(&raw) {
                Ok(url) if !url.cannot_be_a_base() => options.containers.public_base_url = Some(url),
                _ => env.warn(format!("PUBLIC_BASE_URL {:?} is not an absolute URL, ignoring", raw)),
            }
        }

        // Deploy
        if let Some(bin) = env.text("GIT_BIN") {
            options.deploy.git_bin = bin;
        }
        if let Some(pm) = env.text("PACKAGE_MANAGER") {
            options.deploy.package_manager = pm;
        }
        if let Some(dir) = env.text("BUILD_OUTPUT_DIR") {
            options.deploy.build_output_dir = dir;
        }
        let timeout_secs: u64 = env.parse("STEP_TIMEOUT_SECS", 0);
        options.deploy.step_timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));
        options.deploy.serialize_app_deploys =
            env.flag("SERIALIZE_APP_DEPLOYS", options.deploy.serialize_app_deploys);
        if let Some(image) = env.text("NGINX_IMAGE") {
            options.deploy.publish.image = image;
        }
        options.deploy.publish.network = env.text("PROXY_NETWORK");

        // Logging
        options.log.log_level = env.parse::<LogLevel>("LOG_LEVEL", LogLevel::Info);
        options.log.json_format = env.flag("LOG_JSON", false);
        options.log.log_dir = env.text("LOG_DIR").map(PathBuf::from);

        options.warnings = env.warnings;
        options
    }
}

struct EnvReader<F> {
    lookup: F,
    warnings: Vec<String>,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }

    /// Trimmed value, `None` when unset or blank
    fn text(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&mut self, key: &str, default: T) -> T {
        let Some(raw) = self.text(key) else {
            return default;
        };
        match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                self.warn(format!("Invalid value {:?} for {}, using the default", raw, key));
                default
            }
        }
    }

    fn flag(&mut self, key: &str, default: bool) -> bool {
        let Some(raw) = self.text(key) else {
            return default;
        };
        match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                self.warn(format!("Invalid value {:?} for {}, using the default", raw, key));
                default
            }
        }
    }
}
