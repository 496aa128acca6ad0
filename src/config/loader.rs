//! Configuration loading with layered precedence.
//!
//! Layers are composed manually with `MergeComposer` (lowest to highest):
//! application defaults, configuration file, environment variables,
//! command-line arguments. The `Cli` owns subcommand dispatch and the
//! `--config` path, so discovery honours that path before falling back to
//! `ConfigDiscovery`.
//!
//! # Environment Variable Handling
//!
//! String fields (e.g., `EPHEMERA_ENGINE_SOCKET`) are always accepted. Typed
//! fields such as `EPHEMERA_POSTGRES_STARTUP_TIMEOUT_SECS` must parse, or
//! loading fails with `ConfigError::InvalidValue` instead of silently falling
//! back to a default.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{AppConfig, Cli};
use crate::error::{ConfigError, Result};

/// How the raw text of an environment variable is interpreted.
#[derive(Clone, Copy)]
enum EnvVarType {
    /// Taken verbatim.
    String,
    /// Must parse as `u64`.
    U64,
    /// One of `missing`, `always`, `never`.
    PullPolicy,
}

/// One `EPHEMERA_*` variable and the config field it sets.
struct EnvVarSpec {
    env_var: &'static str,
    path: &'static [&'static str],
    var_type: EnvVarType,
}

const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    EnvVarSpec {
        env_var: "EPHEMERA_ENGINE_SOCKET",
        path: &["engine_socket"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "EPHEMERA_HOST",
        path: &["host"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "EPHEMERA_POSTGRES_IMAGE",
        path: &["postgres", "image"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "EPHEMERA_POSTGRES_USER",
        path: &["postgres", "user"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "EPHEMERA_POSTGRES_PASSWORD",
        path: &["postgres", "password"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "EPHEMERA_POSTGRES_DATABASE",
        path: &["postgres", "database"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "EPHEMERA_POSTGRES_STARTUP_TIMEOUT_SECS",
        path: &["postgres", "startup_timeout_secs"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "EPHEMERA_POSTGRES_READY_OCCURRENCES",
        path: &["postgres", "ready_occurrences"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "EPHEMERA_POSTGRES_PULL_POLICY",
        path: &["postgres", "pull_policy"],
        var_type: EnvVarType::PullPolicy,
    },
];

/// Environment variable names recognised by the config loader.
///
/// Tests use this to clear every `EPHEMERA_*` variable without keeping a
/// second list in sync.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|spec| spec.env_var).collect()
}

/// Parse the TOML file at `path` into a JSON layer.
///
/// The file is opened through a `cap_std` directory handle for its parent.
fn read_config_file(path: &Utf8Path) -> Result<Value> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_str().is_empty() => dir,
        _ => Utf8Path::new("."),
    };
    let parse_error = |action: &str, detail: &dyn std::fmt::Display| ConfigError::ParseError {
        message: format!("{action} {path}: {detail}"),
    };

    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|e| parse_error("cannot open the directory of", &e))?;
    let content = dir
        .read_to_string(path.file_name().unwrap_or(path.as_str()))
        .map_err(|e| parse_error("cannot read", &e))?;
    let layer = toml::from_str::<Value>(&content).map_err(|e| parse_error("cannot parse", &e))?;
    Ok(layer)
}

/// First existing configuration file: `--config`, then discovery
/// (`EPHEMERA_CONFIG_PATH`, `.ephemera.toml`, the XDG config directory).
fn discover_config_path(cli: &Cli) -> Option<Utf8PathBuf> {
    if let Some(explicit) = cli.config.as_ref().filter(|candidate| candidate.exists()) {
        return Some(explicit.clone());
    }

    ConfigDiscovery::builder("ephemera")
        .env_var("EPHEMERA_CONFIG_PATH")
        .config_file_name("config.toml")
        .dotfile_name(".ephemera.toml")
        .build()
        .candidates()
        .into_iter()
        .filter(|candidate| candidate.exists())
        .find_map(|candidate| Utf8PathBuf::try_from(candidate).ok())
}

/// Load configuration with full layer precedence, then validate it.
///
/// Sources, later overriding earlier:
/// 1. Defaults from `AppConfig::default()`
/// 2. Configuration file (`--config`, `EPHEMERA_CONFIG_PATH`, or discovery)
/// 3. `EPHEMERA_*` environment variables
/// 4. Command-line arguments
///
/// A `--config` path that does not exist is skipped.
///
/// # Errors
///
/// Returns `ConfigError` for malformed files, unparseable typed environment
/// values, merge failures, or values rejected by [`AppConfig::validate`].
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    let defaults = serde_json::to_value(AppConfig::default()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("cannot serialise defaults: {e}"),
        }
    })?;

    let mut composer = MergeComposer::new();
    composer.push_defaults(defaults);
    if let Some(path) = discover_config_path(cli) {
        let layer = read_config_file(&path)?;
        composer.push_file(layer, Some(path));
    }
    if let Some(layer) = environment_layer()? {
        composer.push_environment(layer);
    }
    if let Some(layer) = cli_layer(cli) {
        composer.push_cli(layer);
    }

    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;
    config.validate()?;
    Ok(config)
}

/// Collect `EPHEMERA_*` variables into a layer shaped like `AppConfig`.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` when a typed variable does not parse.
fn environment_layer() -> Result<Option<Value>> {
    let mut root = Map::new();
    for spec in ENV_VAR_SPECS {
        if let Ok(raw_value) = std::env::var(spec.env_var) {
            let value = parse_env_value(spec, raw_value)?;
            insert_at_path(&mut root, spec.path, value);
        }
    }
    Ok((!root.is_empty()).then_some(Value::Object(root)))
}

fn parse_env_value(spec: &EnvVarSpec, raw_value: String) -> Result<Value> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        field: String::from(spec.env_var),
        reason,
    };

    match spec.var_type {
        EnvVarType::String => Ok(Value::String(raw_value)),
        EnvVarType::U64 => raw_value
            .trim()
            .parse::<u64>()
            .map(|n| Value::Number(n.into()))
            .map_err(|_| invalid(format!("expected unsigned integer, got '{raw_value}'")).into()),
        EnvVarType::PullPolicy => {
            let normalised = raw_value.trim().to_ascii_lowercase();
            if matches!(normalised.as_str(), "missing" | "always" | "never") {
                Ok(Value::String(normalised))
            } else {
                Err(invalid(format!("expected missing, always or never, got '{raw_value}'")).into())
            }
        }
    }
}

/// Set `value` at a dotted `path`, creating intermediate tables.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&leaf, tables)) = path.split_last() else {
        return;
    };

    let mut table = root;
    for &key in tables {
        let slot = table
            .entry(String::from(key))
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(nested) = slot.as_object_mut() else {
            return;
        };
        table = nested;
    }
    table.insert(String::from(leaf), value);
}

/// Global flags given on the command line, as a layer.
fn cli_layer(cli: &Cli) -> Option<Value> {
    let flags = [("engine_socket", &cli.engine_socket), ("host", &cli.host)];
    let overrides: Map<String, Value> = flags
        .into_iter()
        .filter_map(|(key, flag)| {
            flag.as_ref()
                .map(|value| (String::from(key), Value::String(value.clone())))
        })
        .collect();
    (!overrides.is_empty()).then_some(Value::Object(overrides))
}
