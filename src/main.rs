use lfg_connect::core::config::ExchangeSettings;
use lfg_connect::{ExchangeName, ExchangeRegistry, Interval, StreamEvent};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// Usage: lfg-connect [exchange] [env prefix] [universal symbol]
//   e.g. lfg-connect hpl HPL_MAIN BTC_USD
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    #[cfg(feature = "env-file")]
    lfg_connect::core::config::load_env_file(".env")?;

    let mut args = std::env::args().skip(1);
    let exchange: ExchangeName = args.next().as_deref().unwrap_or("hpl").parse()?;
    let prefix = args
        .next()
        .unwrap_or_else(|| exchange.as_str().to_uppercase());
    let symbol = args.next().unwrap_or_else(|| "BTC_USD".to_string());

    let mut registry = ExchangeRegistry::new();
    let adapter = registry
        .register(
            format!("{}-{}", exchange, prefix.to_lowercase()),
            &ExchangeSettings::new(exchange, prefix),
        )
        .await?;

    if let Some(market) = adapter.get_market(&symbol) {
        info!(?market, "market");
    }
    info!(balance = adapter.get_account_balance().await?, "account");

    for candle in adapter.get_klines(&symbol, Interval::OneMinute, 5).await? {
        info!(open_time = candle.open_time, close = candle.kline.c, "kline");
    }

    let cancel = CancellationToken::new();
    let mut klines = adapter
        .subscribe_kline_stream(cancel.clone(), &symbol, Interval::OneMinute, 5_000)
        .await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                break;
            }
            event = klines.recv() => match event {
                Some(StreamEvent::Connected) => info!(%symbol, "kline stream connected"),
                Some(StreamEvent::Event(k)) => info!(
                    open_time = k.open_time,
                    o = k.kline.o,
                    h = k.kline.h,
                    l = k.kline.l,
                    c = k.kline.c,
                    "kline"
                ),
                Some(StreamEvent::Closed) | None => {
                    warn!("kline stream closed");
                    break;
                }
            },
        }
    }

    klines.close().await;
    Ok(())
}
