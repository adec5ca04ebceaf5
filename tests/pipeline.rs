//! Receiver + aggregator pipeline tests over loopback UDP.

use std::net::{Ipv4Addr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use feed_monitor::buffers::TimeSeriesBuffer;
use feed_monitor::encoder::MessageBuilder;
use feed_monitor::{
    FailurePolicy, FeedConfig, FeedError, FeedSession, MetricsAggregator, MulticastFeedReceiver,
    SharedMetrics, StopSignal,
};
use proptest::prelude::*;

const PERIOD: Duration = Duration::from_millis(100);

async fn wait_for_packets(metrics: &SharedMetrics, count: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while metrics.packet_count() < count && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Receiver over a socket connected to a closed loopback port; its next
/// recv fails with ECONNREFUSED.
fn refused_receiver() -> MulticastFeedReceiver {
    let closed = UdpSocket::bind("127.0.0.1:0").unwrap();
    let closed_addr = closed.local_addr().unwrap();
    drop(closed);

    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.connect(closed_addr).unwrap();
    socket.send(&[0]).unwrap();
    MulticastFeedReceiver::from_socket(socket, 64, Duration::from_secs(2)).unwrap()
}

async fn wait_until_finished(session: &FeedSession) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !session.receiver_finished() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[test]
fn test_idle_feed_reports_zero_throughput() {
    let metrics = Arc::new(SharedMetrics::new(10, 10, 4, 100.0));
    let mut aggregator = MetricsAggregator::new(Arc::clone(&metrics), PERIOD);

    for _ in 0..15 {
        let sample = aggregator.sample();
        assert_eq!(sample.tps, 0);
        assert_eq!(sample.mid_price, 100.0);
    }

    let snap = metrics.snapshot();
    assert_eq!(snap.throughput_series, vec![0; 10]);
    assert_eq!(snap.price_series, vec![100.0; 10]);
    assert_eq!(snap.current_tps, 0);
}

#[test]
fn test_window_throughput_scales_to_per_second() {
    let metrics = Arc::new(SharedMetrics::default());
    let mut aggregator = MetricsAggregator::new(Arc::clone(&metrics), PERIOD);

    for k in [1u64, 7, 0, 25] {
        for _ in 0..k {
            metrics.record_packet();
        }
        assert_eq!(aggregator.sample().tps, k * 10);
    }
    assert_eq!(metrics.snapshot().current_tps, 250);
}

#[tokio::test]
async fn test_receiver_feeds_aggregator() {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let receiver = MulticastFeedReceiver::from_socket(socket, 4096, Duration::from_millis(50)).unwrap();
    let target = receiver.local_addr();

    let metrics = Arc::new(SharedMetrics::new(5, 5, 8, 100.0));
    let mut aggregator = MetricsAggregator::new(Arc::clone(&metrics), PERIOD);
    let signal = StopSignal::new();
    let task = tokio::spawn(receiver.run(Arc::clone(&metrics), signal.token()));

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    let mut builder = MessageBuilder::default();
    for i in 0..4 {
        let bid = 100.0 + i as f64;
        sender
            .send_to(&builder.quote("ESZ5", bid, 10, bid + 0.5, 5), target)
            .unwrap();
    }
    wait_for_packets(&metrics, 4).await;

    let sample = aggregator.sample();
    assert_eq!(sample.delta, 4);
    assert_eq!(sample.tps, 40);
    assert_eq!(sample.mid_price, 103.25);

    signal.stop();
    let stats = task.await.unwrap().unwrap();
    assert_eq!(stats.datagrams, 4);

    let snap = metrics.snapshot();
    assert_eq!(snap.log_lines.len(), 4);
    assert!(snap.log_lines[3].ends_with("ESZ5 | BID 103.00 (10) x ASK 103.50 (5)"));
    assert_eq!(snap.price_series, vec![100.0, 100.0, 100.0, 100.0, 103.25]);
}

#[tokio::test]
async fn test_stop_while_blocked_releases_socket() {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = socket.local_addr().unwrap();
    let recv_timeout = Duration::from_millis(200);
    let receiver = MulticastFeedReceiver::from_socket(socket, 4096, recv_timeout).unwrap();

    let metrics = Arc::new(SharedMetrics::default());
    let signal = StopSignal::new();
    let task = tokio::spawn(receiver.run(Arc::clone(&metrics), signal.token()));

    // Nothing is ever sent, so the receiver sits in its bounded wait.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let stopped_at = std::time::Instant::now();
    signal.stop();

    let stats = tokio::time::timeout(recv_timeout * 3, task)
        .await
        .expect("receiver did not stop within the receive timeout")
        .unwrap()
        .unwrap();
    assert!(stopped_at.elapsed() <= recv_timeout * 2);
    assert_eq!(stats.datagrams, 0);

    // The socket was dropped with the loop.
    UdpSocket::bind(addr).unwrap();
}

#[tokio::test]
async fn test_session_snapshot_is_consistent() {
    let config = FeedConfig {
        sample_period_ms: 20,
        recv_timeout_ms: 50,
        price_history_len: 8,
        throughput_history_len: 6,
        log_capacity: 3,
        ..FeedConfig::default()
    };
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let receiver =
        MulticastFeedReceiver::from_socket(socket, config.max_datagram_size, config.recv_timeout())
            .unwrap();
    let target = receiver.local_addr();
    let session = FeedSession::with_receiver(config, receiver).await.unwrap();

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    let mut builder = MessageBuilder::default();
    for _ in 0..5 {
        sender
            .send_to(&builder.quote("NQZ5", 200.0, 1, 201.0, 1), target)
            .unwrap();
    }
    wait_for_packets(&session.metrics(), 5).await;

    for _ in 0..10 {
        let snap = session.snapshot();
        assert_eq!(snap.price_series.len(), 8);
        assert_eq!(snap.throughput_series.len(), 6);
        assert!(snap.log_lines.len() <= 3);
        assert_eq!(snap.current_tps, *snap.throughput_series.last().unwrap());
        tokio::time::sleep(Duration::from_millis(7)).await;
    }

    let snap = session.snapshot();
    assert_eq!(snap.current_mid_price, 200.5);
    assert_eq!(snap.log_lines.len(), 3);

    let report = session.shutdown().await.unwrap();
    assert_eq!(report.packets, 5);
    assert_eq!(report.decode_warnings, 0);
}

#[tokio::test]
async fn test_join_failure_is_setup_error() {
    let port = UdpSocket::bind("0.0.0.0:0").unwrap().local_addr().unwrap().port();
    let config = FeedConfig {
        port,
        // Documentation range; never assigned to a local interface.
        interface: Ipv4Addr::new(192, 0, 2, 1),
        ..FeedConfig::default()
    };

    match FeedSession::init(config).await {
        Err(err) => assert!(err.is_setup(), "unexpected error: {err}"),
        Ok(_) => panic!("joining on a foreign interface should fail"),
    }
}

#[tokio::test]
async fn test_socket_error_ends_receive_loop() {
    let metrics = Arc::new(SharedMetrics::default());
    let signal = StopSignal::new();

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        refused_receiver().run(Arc::clone(&metrics), signal.token()),
    )
    .await
    .expect("receive loop kept running after a socket error");

    match result {
        Err(FeedError::Receive(e)) => {
            assert_eq!(e.kind(), std::io::ErrorKind::ConnectionRefused)
        }
        other => panic!("expected a receive error, got {other:?}"),
    }
    assert!(!signal.is_stopped());
    assert_eq!(metrics.packet_count(), 0);
}

#[tokio::test]
async fn test_shutdown_reports_receiver_error() {
    let session = FeedSession::with_receiver(FeedConfig::default(), refused_receiver())
        .await
        .unwrap();
    wait_until_finished(&session).await;
    assert!(session.receiver_finished());

    match session.shutdown().await {
        Err(FeedError::Receive(e)) => {
            assert_eq!(e.kind(), std::io::ErrorKind::ConnectionRefused)
        }
        other => panic!("expected a receive error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_setup_retries_back_off_before_failing() {
    let port = UdpSocket::bind("0.0.0.0:0").unwrap().local_addr().unwrap().port();
    let config = FeedConfig {
        port,
        interface: Ipv4Addr::new(192, 0, 2, 1),
        failure_policy: FailurePolicy::Retry {
            max_attempts: 3,
            backoff_ms: 20,
        },
        ..FeedConfig::default()
    };

    let started = std::time::Instant::now();
    let result = FeedSession::init(config).await;
    let elapsed = started.elapsed();

    match result {
        Err(err) => assert!(err.is_setup(), "unexpected error: {err}"),
        Ok(_) => panic!("joining on a foreign interface should fail"),
    }
    // 20 + 40 + 80ms of backoff between four attempts.
    assert!(elapsed >= Duration::from_millis(140), "gave up after {elapsed:?}");
}

#[tokio::test]
async fn test_stop_cuts_restart_backoff_short() {
    let config = FeedConfig {
        failure_policy: FailurePolicy::Retry {
            max_attempts: 3,
            backoff_ms: 60_000,
        },
        ..FeedConfig::default()
    };
    let session = FeedSession::with_receiver(config, refused_receiver())
        .await
        .unwrap();
    // Let the receiver fail and enter its backoff.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!session.receiver_finished());

    let result = tokio::time::timeout(Duration::from_secs(2), session.shutdown())
        .await
        .expect("shutdown waited out the retry backoff");
    assert!(matches!(result, Err(FeedError::Receive(_))));
}

#[tokio::test]
async fn test_invalid_group_rejected() {
    let config = FeedConfig {
        group: Ipv4Addr::new(10, 0, 0, 1),
        ..FeedConfig::default()
    };
    assert!(matches!(
        FeedSession::init(config).await,
        Err(FeedError::Config(_))
    ));
}

proptest! {
    #[test]
    fn prop_series_length_is_capacity(
        capacity in 1usize..64,
        pushes in proptest::collection::vec(0u64..1_000, 0..200),
    ) {
        let mut series = TimeSeriesBuffer::new(capacity);
        for value in &pushes {
            series.push(*value);
            prop_assert_eq!(series.len(), capacity);
        }
        prop_assert_eq!(series.len(), capacity);

        let tail: Vec<u64> = pushes.iter().rev().take(capacity).rev().copied().collect();
        let contents = series.to_vec();
        prop_assert_eq!(&contents[capacity - tail.len()..], tail.as_slice());
    }
}
