use crate::core::config::ExchangeSettings;
use crate::core::errors::ExchangeError;
use crate::core::traits::Exchange;
use crate::core::types::ExchangeName;
use crate::exchanges::{binance_perp, hyperliquid};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Factory for creating exchange adapters
pub struct ExchangeFactory;

impl ExchangeFactory {
    /// Construct the adapter matching `settings.exchange`
    pub async fn create(settings: &ExchangeSettings) -> Result<Arc<dyn Exchange>, ExchangeError> {
        match settings.exchange {
            ExchangeName::BinancePerp => {
                Ok(Arc::new(binance_perp::build_connector(settings).await?))
            }
            ExchangeName::Hyperliquid => {
                Ok(Arc::new(hyperliquid::build_connector(settings).await?))
            }
        }
    }

    /// Same as [`Self::create`] for a configured exchange name such as `"hpl"`
    pub async fn create_by_name(
        name: &str,
        env_prefix: &str,
    ) -> Result<Arc<dyn Exchange>, ExchangeError> {
        let exchange: ExchangeName = name.parse()?;
        Self::create(&ExchangeSettings::new(exchange, env_prefix)).await
    }

    pub fn supported_exchanges() -> Vec<ExchangeName> {
        vec![ExchangeName::BinancePerp, ExchangeName::Hyperliquid]
    }
}

/// Live adapters keyed by a user-assigned exchange id.
///
/// Several ids may point at the same exchange with different accounts.
#[derive(Default)]
pub struct ExchangeRegistry {
    exchanges: HashMap<String, Arc<dyn Exchange>>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an adapter for `settings` and store it under `id`, replacing any previous one
    pub async fn register(
        &mut self,
        id: impl Into<String>,
        settings: &ExchangeSettings,
    ) -> Result<Arc<dyn Exchange>, ExchangeError> {
        let exchange = ExchangeFactory::create(settings).await?;
        let id = id.into();
        info!(id = %id, exchange = %settings.exchange, "exchange registered");
        self.insert(id, exchange.clone());
        Ok(exchange)
    }

    /// Store an already constructed adapter
    pub fn insert(&mut self, id: impl Into<String>, exchange: Arc<dyn Exchange>) {
        self.exchanges.insert(id.into(), exchange);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Exchange>> {
        self.exchanges.get(id).cloned()
    }

    pub fn remove(&mut self, id: &str) -> Option<Arc<dyn Exchange>> {
        self.exchanges.remove(id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.exchanges.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }
}

impl std::fmt::Debug for ExchangeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries: Vec<(String, ExchangeName)> = self
            .ids()
            .into_iter()
            .filter_map(|id| self.exchanges.get(&id).map(|ex| (id, ex.name())))
            .collect();
        f.debug_struct("ExchangeRegistry")
            .field("exchanges", &entries)
            .finish()
    }
}
