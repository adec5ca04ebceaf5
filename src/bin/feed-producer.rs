//! Test feed producer: publishes synthetic two-sided quotes to the
//! configured multicast group until interrupted.

use feed_monitor::config::FeedConfig;
use feed_monitor::encoder::MessageBuilder;
use feed_monitor::generator;
use feed_monitor::publisher::MulticastPublisher;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();

    let config = FeedConfig::from_env()?;
    let producer = config.producer.clone();

    let publisher = MulticastPublisher::open(config.group_addr(), config.interface, producer.ttl)?;
    let mut prices = generator::from_model(producer.model, producer.start_price, producer.seed);
    let mut builder = MessageBuilder::default();
    let mut ticker = tokio::time::interval(producer.interval());

    tracing::info!(
        group = %publisher.target(),
        symbol = %producer.symbol,
        interval_ms = producer.interval_ms,
        "Starting feed producer"
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut sent: u64 = 0;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = ticker.tick() => {}
        }

        let bid = prices.next_price();
        let ask = bid + producer.spread;
        let msg = builder.quote(&producer.symbol, bid, producer.bid_size, ask, producer.ask_size);
        publisher.send(&msg).await?;
        sent += 1;

        tracing::debug!(bid = %format!("{:.2}", bid), ask = %format!("{:.2}", ask), "Sent quote");
    }

    tracing::info!(sent, "Feed producer stopped");
    Ok(())
}
