use crate::core::types::ExchangeName;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize, Serializer};
use std::env;
use std::path::{Path, PathBuf};

/// Name of the variable selecting mainnet (`prod`) or testnet (anything else).
pub const ENVIRONMENT_VAR: &str = "ENVIRONMENT";

/// Deployment environment, decides mainnet vs testnet endpoints and signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    Prod,
    Test,
}

impl Environment {
    /// Read `ENVIRONMENT`; only `prod`/`production` select mainnet.
    pub fn from_env() -> Self {
        match env::var(ENVIRONMENT_VAR).as_deref() {
            Ok("prod" | "production") => Self::Prod,
            _ => Self::Test,
        }
    }

    pub const fn is_mainnet(self) -> bool {
        matches!(self, Self::Prod)
    }

    /// Suffix used by endpoint config files (`hpl.prod.json`, `hpl.test.json`).
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Prod => "prod",
            Self::Test => "test",
        }
    }
}

/// Secrets of one exchange account, read from `{PREFIX}_*` variables.
///
/// bnf carries an API key and its HMAC secret. hpl carries only the
/// hex encoded secp256k1 private key, stored in `secret`.
#[derive(Clone)]
pub struct Credentials {
    api_key: Option<Secret<String>>,
    secret: Secret<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl Serialize for Credentials {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut out = serializer.serialize_struct("Credentials", 2)?;
        out.serialize_field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))?;
        out.serialize_field("secret", "[REDACTED]")?;
        out.end()
    }
}

impl Credentials {
    pub fn api_key_pair(api_key: String, api_secret: String) -> Self {
        Self {
            api_key: Some(Secret::new(api_key)),
            secret: Secret::new(api_secret),
        }
    }

    pub fn private_key(private_key: String) -> Self {
        Self {
            api_key: None,
            secret: Secret::new(private_key),
        }
    }

    /// bnf reads `{PREFIX}_API_KEY` and `{PREFIX}_API_SECRET`,
    /// hpl reads `{PREFIX}_PRIVATE_KEY`. Empty values count as missing.
    pub fn from_env(exchange: ExchangeName, prefix: &str) -> Result<Self, ConfigError> {
        let prefix = prefix.to_uppercase();
        match exchange {
            ExchangeName::BinancePerp => Ok(Self::api_key_pair(
                required_var(&format!("{}_API_KEY", prefix))?,
                required_var(&format!("{}_API_SECRET", prefix))?,
            )),
            ExchangeName::Hyperliquid => Ok(Self::private_key(required_var(&format!(
                "{}_PRIVATE_KEY",
                prefix
            ))?)),
        }
    }

    /// Empty for key-only accounts.
    pub fn api_key(&self) -> &str {
        self.api_key
            .as_ref()
            .map_or("", |key| key.expose_secret().as_str())
    }

    pub fn secret(&self) -> &str {
        self.secret.expose_secret()
    }
}

/// Load a .env file into the process environment, ignoring a missing file.
#[cfg(feature = "env-file")]
pub fn load_env_file(env_file_path: &str) -> Result<(), ConfigError> {
    match dotenv::from_path(env_file_path) {
        Ok(()) => Ok(()),
        Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ConfigError::InvalidConfiguration(format!(
            "Failed to load .env file '{}': {}",
            env_file_path, e
        ))),
    }
}

/// Read a boolean flag variable. Only the literal `true` enables it.
pub fn flag_from_env(name: &str) -> bool {
    env::var(name).map(|v| v == "true").unwrap_or(false)
}

fn required_var(name: &str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnvironmentVariable(name.to_string())),
    }
}

/// Static per-exchange endpoints, one JSON file per environment.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    #[serde(default)]
    pub api_url: String,
    pub ws_url: String,
}

impl EndpointConfig {
    /// Load `{config_dir}/{exchange}/{exchange}.{env}.json`.
    pub fn load(
        config_dir: &Path,
        exchange: ExchangeName,
        environment: Environment,
    ) -> Result<Self, ConfigError> {
        let path = config_dir.join(exchange.as_str()).join(format!(
            "{}.{}.json",
            exchange.as_str(),
            environment.suffix()
        ));
        read_json(&path)
    }
}

/// Parse a JSON config file, mapping every failure to [`ConfigError`].
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::UnreadableFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::UnreadableFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Everything needed to construct one adapter for one account.
#[derive(Debug, Clone)]
pub struct ExchangeSettings {
    pub exchange: ExchangeName,
    /// Prefix of the credential environment variables, e.g. `HPL_MAIN`.
    pub env_prefix: String,
    /// Cross margin when true, isolated otherwise.
    pub is_cross: bool,
    pub config_dir: PathBuf,
    pub environment: Environment,
}

impl ExchangeSettings {
    pub fn new(exchange: ExchangeName, env_prefix: impl Into<String>) -> Self {
        Self {
            exchange,
            env_prefix: env_prefix.into(),
            is_cross: true,
            config_dir: PathBuf::from("config"),
            environment: Environment::from_env(),
        }
    }

    pub fn with_config_dir(mut self, config_dir: impl Into<PathBuf>) -> Self {
        self.config_dir = config_dir.into();
        self
    }

    pub const fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub const fn isolated(mut self) -> Self {
        self.is_cross = false;
        self
    }

    /// Path of the universal → local symbol map for this exchange.
    pub fn symbols_path(&self) -> PathBuf {
        self.config_dir
            .join(self.exchange.as_str())
            .join("symbols.json")
    }

    pub fn endpoints(&self) -> Result<EndpointConfig, ConfigError> {
        EndpointConfig::load(&self.config_dir, self.exchange, self.environment)
    }

    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        Credentials::from_env(self.exchange, &self.env_prefix)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Cannot read config file {path}: {reason}")]
    UnreadableFile { path: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_never_print_secrets() {
        let pair = Credentials::api_key_pair("key".to_string(), "very-secret".to_string());
        let json = serde_json::to_string(&pair).unwrap();
        assert!(!json.contains("very-secret"));
        assert!(json.contains("[REDACTED]"));
        assert!(!format!("{:?}", pair).contains("very-secret"));

        let hpl = Credentials::private_key("0xabc".to_string());
        assert_eq!(hpl.api_key(), "");
        assert_eq!(hpl.secret(), "0xabc");
    }

    #[test]
    fn test_missing_credentials_fail() {
        let err = Credentials::from_env(ExchangeName::Hyperliquid, "LFG_TEST_MISSING_PREFIX")
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvironmentVariable(v) if v == "LFG_TEST_MISSING_PREFIX_PRIVATE_KEY"));
    }

    #[test]
    fn test_binance_requires_both_keys() {
        env::set_var("LFG_TEST_HALF_API_KEY", "abc");
        let err =
            Credentials::from_env(ExchangeName::BinancePerp, "LFG_TEST_HALF").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvironmentVariable(v) if v == "LFG_TEST_HALF_API_SECRET"));
    }

    #[test]
    fn test_endpoint_config_shape() {
        let cfg: EndpointConfig = serde_json::from_str(
            r#"{"apiUrl":"https://api.hyperliquid.xyz","wsUrl":"wss://api.hyperliquid.xyz/ws","chainId":1337}"#,
        )
        .unwrap();
        assert_eq!(cfg.api_url, "https://api.hyperliquid.xyz");
        assert_eq!(cfg.ws_url, "wss://api.hyperliquid.xyz/ws");

        let ws_only: EndpointConfig =
            serde_json::from_str(r#"{"wsUrl":"wss://fstream.binance.com/ws"}"#).unwrap();
        assert!(ws_only.api_url.is_empty());
    }

    #[test]
    fn test_unreadable_file_is_config_error() {
        let err = EndpointConfig::load(
            Path::new("/nonexistent-config-dir"),
            ExchangeName::Hyperliquid,
            Environment::Test,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnreadableFile { .. }));
    }
}
