use crate::core::config::{read_json, ConfigError};
use crate::core::errors::ExchangeError;
use std::collections::HashMap;
use std::path::Path;

/// Two-way symbol map between universal names (`BTC_USD`) and an exchange's
/// local names (`BTC`, `BTCUSDT`).
///
/// The map is validated as a bijection when loaded, so lookups never have to
/// pick between two candidates.
#[derive(Debug, Clone, Default)]
pub struct SymbolMap {
    to_local: HashMap<String, String>,
    to_universal: HashMap<String, String>,
}

impl SymbolMap {
    /// Build from universal → local pairs.
    pub fn new<I, U, L>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (U, L)>,
        U: Into<String>,
        L: Into<String>,
    {
        let mut to_local = HashMap::new();
        let mut to_universal = HashMap::new();

        for (uni, loc) in pairs {
            let (uni, loc) = (uni.into(), loc.into());
            if uni.is_empty() || loc.is_empty() {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "empty symbol in mapping {:?} -> {:?}",
                    uni, loc
                )));
            }
            if let Some(previous) = to_universal.insert(loc.clone(), uni.clone()) {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "local symbol {} mapped from both {} and {}",
                    loc, previous, uni
                )));
            }
            if to_local.insert(uni.clone(), loc).is_some() {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "universal symbol {} mapped twice",
                    uni
                )));
            }
        }

        Ok(Self {
            to_local,
            to_universal,
        })
    }

    /// Parse a JSON object of `{"UNIVERSAL": "local"}` pairs.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let pairs: HashMap<String, String> = serde_json::from_str(raw)
            .map_err(|e| ConfigError::InvalidConfiguration(format!("symbol map: {}", e)))?;
        Self::new(pairs)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let pairs: HashMap<String, String> = read_json(path)?;
        Self::new(pairs)
    }

    pub fn to_local(&self, universal: &str) -> Result<&str, ExchangeError> {
        self.to_local
            .get(universal)
            .map(String::as_str)
            .ok_or_else(|| ExchangeError::UnknownSymbol(universal.to_string()))
    }

    pub fn to_universal(&self, local: &str) -> Result<&str, ExchangeError> {
        self.to_universal
            .get(local)
            .map(String::as_str)
            .ok_or_else(|| ExchangeError::UnknownSymbol(local.to_string()))
    }

    pub fn universal_symbols(&self) -> impl Iterator<Item = &str> {
        self.to_local.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.to_local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_local.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SymbolMap {
        SymbolMap::from_json(r#"{"BTC_USD":"BTC","ETH_USD":"ETH","kPEPE_USD":"kPEPE"}"#).unwrap()
    }

    #[test]
    fn test_round_trip_is_stable() {
        let map = sample();
        for uni in map.universal_symbols() {
            let loc = map.to_local(uni).unwrap();
            let back = map.to_universal(loc).unwrap();
            assert_eq!(map.to_local(back).unwrap(), loc);
            assert_eq!(back, uni);
        }
    }

    #[test]
    fn test_unknown_symbol_is_an_error() {
        let map = sample();
        assert!(matches!(
            map.to_local("DOGE_USD"),
            Err(ExchangeError::UnknownSymbol(s)) if s == "DOGE_USD"
        ));
        assert!(map.to_universal("DOGE").is_err());
    }

    #[test]
    fn test_duplicate_local_rejected() {
        let err = SymbolMap::new([("BTC_USD", "BTC"), ("XBT_USD", "BTC")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfiguration(_)));
    }
}
