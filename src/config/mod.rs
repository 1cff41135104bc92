//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::catalog::Capabilities;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "permaflush";
const DEFAULT_ADMIN_HOST: &str = "127.0.0.1";
const DEFAULT_ADMIN_PORT: u16 = 3001;
const DEFAULT_STATE_FILE: &str = "permaflush-state.toml";
const DEFAULT_CONTENT_TYPES: &[&str] = &["post", "page"];

/// Command-line arguments for the permaflush binary.
#[derive(Debug, Parser)]
#[command(name = "permaflush", version, about = "Permalink auto-flush sidecar")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "PERMAFLUSH_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the admin and hook-intake HTTP service.
    Serve(Box<ServeArgs>),
    /// Perform a single immediate flush and exit.
    Flush(FlushArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct FlushArgs {
    #[command(flatten)]
    pub host: HostOverride,
}

#[derive(Debug, Args, Default, Clone)]
pub struct HostOverride {
    /// Override the host endpoint used to recompute rewrite rules.
    #[arg(long = "host-flush-url", value_name = "URL")]
    pub flush_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub host: HostOverride,

    /// Override the administrative listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the administrative listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the file that persists flush settings.
    #[arg(long = "state-file", value_name = "PATH")]
    pub state_file: Option<PathBuf>,

    /// Toggle the commerce capability (adds product actions to the catalog).
    #[arg(
        long = "capability-commerce",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub capability_commerce: Option<bool>,

    /// Toggle the SEO capability (adds the seo_meta_saved action).
    #[arg(
        long = "capability-seo",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub capability_seo: Option<bool>,

    /// Toggle the custom-fields capability (adds the field_group_saved action).
    #[arg(
        long = "capability-custom-fields",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub capability_custom_fields: Option<bool>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub host: HostSettings,
    pub store: StoreSettings,
    pub capabilities: CapabilitySettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub admin_addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct HostSettings {
    /// Host endpoint that recomputes rewrite rules when POSTed to.
    pub flush_url: Option<String>,
    /// Content types whose API saves trigger a flush.
    pub content_types: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub state_file: PathBuf,
}

#[derive(Debug, Clone, Copy)]
pub struct CapabilitySettings {
    pub commerce: bool,
    pub seo: bool,
    pub custom_fields: bool,
}

impl From<&CapabilitySettings> for Capabilities {
    fn from(settings: &CapabilitySettings) -> Self {
        Self {
            commerce: settings.commerce,
            seo: settings.seo,
            custom_fields: settings.custom_fields,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("PERMAFLUSH").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Flush(args)) => raw.apply_host_override(&args.host),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    host: RawHostSettings,
    store: RawStoreSettings,
    capabilities: RawCapabilitySettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(path) = overrides.state_file.as_ref() {
            self.store.state_file = Some(path.clone());
        }
        if let Some(commerce) = overrides.capability_commerce {
            self.capabilities.commerce = Some(commerce);
        }
        if let Some(seo) = overrides.capability_seo {
            self.capabilities.seo = Some(seo);
        }
        if let Some(custom_fields) = overrides.capability_custom_fields {
            self.capabilities.custom_fields = Some(custom_fields);
        }

        self.apply_host_override(&overrides.host);
    }

    fn apply_host_override(&mut self, overrides: &HostOverride) {
        if let Some(url) = overrides.flush_url.as_ref() {
            self.host.flush_url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            host,
            store,
            capabilities,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let host = build_host_settings(host)?;
        let store = build_store_settings(store);
        let capabilities = build_capability_settings(capabilities);

        Ok(Self {
            server,
            logging,
            host,
            store,
            capabilities,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_ADMIN_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_ADMIN_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let admin_addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.admin_addr", reason))?;

    Ok(ServerSettings { admin_addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_host_settings(host: RawHostSettings) -> Result<HostSettings, LoadError> {
    let flush_url = host.flush_url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let content_types = match host.content_types {
        Some(types) => {
            for ty in &types {
                if ty.trim().is_empty() {
                    return Err(LoadError::invalid(
                        "host.content_types",
                        "content type names must not be empty",
                    ));
                }
            }
            types
        }
        None => DEFAULT_CONTENT_TYPES
            .iter()
            .map(|ty| ty.to_string())
            .collect(),
    };

    Ok(HostSettings {
        flush_url,
        content_types,
    })
}

fn build_store_settings(store: RawStoreSettings) -> StoreSettings {
    let state_file = store
        .state_file
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE));

    StoreSettings { state_file }
}

fn build_capability_settings(capabilities: RawCapabilitySettings) -> CapabilitySettings {
    CapabilitySettings {
        commerce: capabilities.commerce.unwrap_or(false),
        seo: capabilities.seo.unwrap_or(false),
        custom_fields: capabilities.custom_fields.unwrap_or(false),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawHostSettings {
    flush_url: Option<String>,
    content_types: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    state_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCapabilitySettings {
    commerce: Option<bool>,
    seo: Option<bool>,
    custom_fields: Option<bool>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
