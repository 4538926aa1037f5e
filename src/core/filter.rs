use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::WsCodec;
use crate::core::types::{now_ms, TimedEvent};
use serde_json::Value;

/// Drops events whose exchange timestamp lags wall-clock time by more than
/// `max_delay_ms`, plus zero value events.
///
/// The age is measured against the local clock, so a skewed local clock
/// shifts the cutoff by the same amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayFilter {
    pub max_delay_ms: i64,
}

impl DelayFilter {
    pub const fn new(max_delay_ms: i64) -> Self {
        Self { max_delay_ms }
    }

    pub fn admits<E: TimedEvent>(&self, event: &E) -> bool {
        self.admits_at(event, now_ms())
    }

    pub fn admits_at<E: TimedEvent>(&self, event: &E, now_ms: i64) -> bool {
        !event.is_empty() && now_ms - event.event_time_ms() <= self.max_delay_ms
    }
}

/// Codec adapter applying a [`DelayFilter`] to everything `C` decodes.
#[derive(Debug, Clone)]
pub struct Filtered<C> {
    inner: C,
    filter: DelayFilter,
}

impl<C> Filtered<C> {
    pub const fn new(inner: C, max_delay_ms: i64) -> Self {
        Self {
            inner,
            filter: DelayFilter::new(max_delay_ms),
        }
    }
}

impl<C> WsCodec for Filtered<C>
where
    C: WsCodec,
    C::Message: TimedEvent,
{
    type Message = C::Message;

    fn subscription(&self) -> Option<Value> {
        self.inner.subscription()
    }

    fn decode_message(&self, text: &str) -> Result<Vec<Self::Message>, ExchangeError> {
        let now = now_ms();
        let mut events = self.inner.decode_message(text)?;
        events.retain(|event| self.filter.admits_at(event, now));
        Ok(events)
    }
}
