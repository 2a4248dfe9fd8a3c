//! Config Loader (spec §4.1). Parses `publisher.config.json` at the server root,
//! walks every string *value* in the tree, and substitutes `${VAR}` tokens from
//! the process environment. Object keys are never touched. Modelled on the
//! teacher's `MCPConfig::load()` env-override-over-file-defaults layering, but
//! the substitution walk itself is bespoke to this spec (§4.1, §8).

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const CONFIG_FILE_NAME: &str = "publisher.config.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment variable '${{{0}}}' is not set in configuration file")]
    EnvVarMissing(String),

    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherConfig {
    #[serde(default)]
    pub frozen_config: bool,
    #[serde(default)]
    pub projects: Vec<ProjectManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectManifest {
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub packages: Vec<PackageManifest>,
    #[serde(default)]
    pub connections: Vec<crate::connection::Connection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    pub name: String,
    pub location: String,
}

/// `\$\{([A-Z_][A-Z0-9_]*)\}` — exact token shape per spec §4.1. Tokens with
/// surrounding whitespace or lowercase letters are left untouched.
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap());

impl PublisherConfig {
    /// Load and substitute the config at `server_root`. Returns the default
    /// (`frozen_config: false, projects: []`) config when the file is absent.
    pub fn load(server_root: &Path) -> Result<Self, ConfigError> {
        let path = server_root.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut value: Value = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        substitute_env_vars(&mut value, &std::env::vars().collect())?;

        let config: PublisherConfig =
            serde_json::from_value(value).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        tracing::info!(
            projects = config.projects.len(),
            frozen = config.frozen_config,
            "loaded publisher config"
        );

        Ok(config)
    }

    pub fn frozen_config(server_root: &Path) -> Result<bool, ConfigError> {
        Ok(Self::load(server_root)?.frozen_config)
    }
}

/// Walk `value` in place, substituting `${VAR}` tokens in every string *value*.
/// Object keys are never substituted — caller is expected to have already
/// parsed the document into a `serde_json::Value`, where keys are immutable
/// map keys distinct from the values being walked here.
fn substitute_env_vars(value: &mut Value, env: &HashMap<String, String>) -> Result<(), ConfigError> {
    match value {
        Value::String(s) => {
            *s = substitute_string(s, env)?;
        }
        Value::Array(items) => {
            for item in items {
                substitute_env_vars(item, env)?;
            }
        }
        Value::Object(map) => {
            for (_key, val) in map.iter_mut() {
                substitute_env_vars(val, env)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn substitute_string(input: &str, env: &HashMap<String, String>) -> Result<String, ConfigError> {
    let mut err = None;
    let replaced = TOKEN_RE.replace_all(input, |caps: &regex::Captures| {
        let var = &caps[1];
        match env.get(var) {
            Some(v) => v.clone(),
            None => {
                if err.is_none() {
                    err = Some(ConfigError::EnvVarMissing(var.to_string()));
                }
                String::new()
            }
        }
    });
    if let Some(e) = err {
        return Err(e);
    }
    Ok(replaced.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn substitutes_known_var() {
        let env = env(&[("BUCKET_NAME", "my-test-bucket")]);
        let mut value = Value::String("gs://${BUCKET_NAME}/packages".to_string());
        substitute_env_vars(&mut value, &env).unwrap();
        assert_eq!(value, Value::String("gs://my-test-bucket/packages".to_string()));
    }

    #[test]
    fn missing_var_is_fatal_with_exact_message() {
        let env = env(&[]);
        let mut value = Value::String("./path/${UNDEFINED_VAR}/end".to_string());
        let err = substitute_env_vars(&mut value, &env).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Environment variable '${UNDEFINED_VAR}' is not set in configuration file"
        );
    }

    #[test]
    fn empty_string_substitution_is_valid() {
        let env = env(&[("EMPTY", "")]);
        let mut value = Value::String("${EMPTY}".to_string());
        substitute_env_vars(&mut value, &env).unwrap();
        assert_eq!(value, Value::String(String::new()));
    }

    #[test]
    fn object_keys_are_never_substituted() {
        let env = env(&[("NORMAL_VALUE", "substituted-value")]);
        let mut value = serde_json::json!({
            "${KEY_NAME}": "value",
            "normal_key": "${NORMAL_VALUE}"
        });
        substitute_env_vars(&mut value, &env).unwrap();
        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("${KEY_NAME}"));
        assert_eq!(obj.get("normal_key").unwrap(), "substituted-value");
    }

    #[test]
    fn tokens_not_matching_exact_pattern_are_left_literal() {
        let env = env(&[("BUCKET", "ignored")]);
        let mut value = Value::String("${ BUCKET }".to_string());
        substitute_env_vars(&mut value, &env).unwrap();
        assert_eq!(value, Value::String("${ BUCKET }".to_string()));
    }

    #[test]
    fn default_config_when_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let config = PublisherConfig::load(dir.path()).unwrap();
        assert!(!config.frozen_config);
        assert!(config.projects.is_empty());
    }

    #[test]
    fn loads_real_file_with_substitution() {
        std::env::set_var("PUBLISHER_TEST_VAR", "hello");
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("publisher.config.json"),
            r#"{"frozenConfig": false, "projects": [{"name": "home", "path": "${PUBLISHER_TEST_VAR}"}]}"#,
        )
        .unwrap();
        let config = PublisherConfig::load(dir.path()).unwrap();
        assert_eq!(config.projects[0].path.as_deref(), Some("hello"));
        std::env::remove_var("PUBLISHER_TEST_VAR");
    }
}
