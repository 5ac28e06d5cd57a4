//! End-to-end ingestion tests over loopback UDP with a recording store.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::net::UdpSocket;

use sensor_ingest::config::TestRun;
use sensor_ingest::error::Result;
use sensor_ingest::ingest::{self, IngestContext};
use sensor_ingest::registry::SensorRegistry;
use sensor_ingest::store::SensorStore;
use sensor_ingest::writer::SensorOutput;

type RecordedWrite = (String, String, Vec<SensorOutput>);

/// Store double that records every write; optionally slowed down to
/// simulate store latency.
#[derive(Default)]
struct RecordingStore {
    delay: Option<Duration>,
    writes: Mutex<Vec<RecordedWrite>>,
}

impl RecordingStore {
    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            writes: Mutex::new(Vec::new()),
        }
    }

    fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait]
impl SensorStore for RecordingStore {
    async fn ensure_database(&self, _database: &str) -> Result<()> {
        Ok(())
    }

    async fn write_records(
        &self,
        database: &str,
        measurement: &str,
        records: &[SensorOutput],
    ) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.writes
            .lock()
            .unwrap()
            .push((database.to_string(), measurement.to_string(), records.to_vec()));
        Ok(())
    }
}

fn test_run(execution_duration: Duration) -> TestRun {
    TestRun {
        test_id: 7,
        measurement: "sensor_outputs_test_7".into(),
        execution_duration,
    }
}

fn registry_of(addrs: &[SocketAddr]) -> SensorRegistry {
    let specs: Vec<String> = addrs.iter().map(|a| a.to_string()).collect();
    SensorRegistry::from_specs(&specs).unwrap()
}

async fn bind_loopback() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

#[tokio::test]
async fn accepted_datagram_is_written_with_sender_and_payload() {
    let listener = bind_loopback().await;
    let sender = bind_loopback().await;
    let listener_addr = listener.local_addr().unwrap();
    let sender_addr = sender.local_addr().unwrap();

    let store = Arc::new(RecordingStore::default());
    let ctx = IngestContext::new(
        Arc::clone(&store) as Arc<dyn SensorStore>,
        test_run(Duration::from_millis(400)),
        registry_of(&[sender_addr]),
        "dms_influx_db".into(),
    );

    let before = Utc::now();
    let session = tokio::spawn(ingest::listen(Arc::clone(&ctx), listener));
    sender.send_to(b"23.5", listener_addr).await.unwrap();
    session.await.unwrap().unwrap();
    let after = Utc::now();

    let writes = store.writes.lock().unwrap();
    assert_eq!(writes.len(), 1);
    let (database, measurement, records) = &writes[0];
    assert_eq!(database, "dms_influx_db");
    assert_eq!(measurement, "sensor_outputs_test_7");
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.sensor_ip, sender_addr.ip().to_string());
    assert_eq!(record.sensor_port, sender_addr.port());
    assert_eq!(record.payload, "23.5");
    assert!(record.timestamp >= before && record.timestamp <= after);
}

#[tokio::test]
async fn unregistered_sender_triggers_no_write() {
    let listener = bind_loopback().await;
    let sender = bind_loopback().await;
    let listener_addr = listener.local_addr().unwrap();

    // Registry holds a sensor that is not our sender.
    let registry = SensorRegistry::from_specs(&["10.0.0.1:5000".to_string()]).unwrap();

    let store = Arc::new(RecordingStore::default());
    let ctx = IngestContext::new(
        Arc::clone(&store) as Arc<dyn SensorStore>,
        test_run(Duration::from_millis(300)),
        registry,
        "dms_influx_db".into(),
    );

    let session = tokio::spawn(ingest::listen(Arc::clone(&ctx), listener));
    sender.send_to(b"23.5", listener_addr).await.unwrap();
    session.await.unwrap().unwrap();

    assert_eq!(store.write_count(), 0);
    assert_eq!(ctx.stats.received.load(Ordering::Relaxed), 1);
    assert_eq!(ctx.stats.filtered.load(Ordering::Relaxed), 1);
    assert_eq!(ctx.stats.accepted.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn slow_store_does_not_throttle_receives() {
    const BURST: u64 = 20;

    let listener = bind_loopback().await;
    let sender = bind_loopback().await;
    let listener_addr = listener.local_addr().unwrap();
    let sender_addr = sender.local_addr().unwrap();

    let store = Arc::new(RecordingStore::slow(Duration::from_millis(500)));
    let ctx = IngestContext::new(
        Arc::clone(&store) as Arc<dyn SensorStore>,
        test_run(Duration::from_secs(2)),
        registry_of(&[sender_addr]),
        "dms_influx_db".into(),
    );

    let session = tokio::spawn(ingest::listen(Arc::clone(&ctx), listener));

    for i in 0..BURST {
        let payload = format!("sample-{i}");
        sender.send_to(payload.as_bytes(), listener_addr).await.unwrap();
    }

    // Well before any slow write can finish, the whole burst must have
    // been received and dispatched.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(ctx.stats.received.load(Ordering::Relaxed), BURST);
    assert_eq!(ctx.stats.accepted.load(Ordering::Relaxed), BURST);
    assert_eq!(store.write_count(), 0);

    session.await.unwrap().unwrap();

    // The writes were dispatched concurrently, so they all complete
    // roughly one store-delay after the burst, not BURST delays.
    let deadline = Instant::now() + Duration::from_secs(5);
    while store.write_count() < BURST as usize {
        assert!(Instant::now() < deadline, "writes never completed");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(ctx.stats.written.load(Ordering::Relaxed), BURST);
}

#[tokio::test]
async fn window_closes_on_time_without_traffic() {
    let listener = bind_loopback().await;

    let store = Arc::new(RecordingStore::default());
    let ctx = IngestContext::new(
        Arc::clone(&store) as Arc<dyn SensorStore>,
        test_run(Duration::from_secs(1)),
        SensorRegistry::from_specs(&["10.0.0.1:5000".to_string()]).unwrap(),
        "dms_influx_db".into(),
    );

    let start = Instant::now();
    ingest::listen(ctx, listener).await.unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_millis(1500), "window overran: {elapsed:?}");
}

#[tokio::test]
async fn traffic_does_not_extend_the_window() {
    let listener = bind_loopback().await;
    let sender = bind_loopback().await;
    let listener_addr = listener.local_addr().unwrap();
    let sender_addr = sender.local_addr().unwrap();

    let store = Arc::new(RecordingStore::default());
    let ctx = IngestContext::new(
        Arc::clone(&store) as Arc<dyn SensorStore>,
        test_run(Duration::from_millis(500)),
        registry_of(&[sender_addr]),
        "dms_influx_db".into(),
    );

    let feeder = tokio::spawn(async move {
        loop {
            if sender.send_to(b"1.0", listener_addr).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });

    let start = Instant::now();
    ingest::listen(Arc::clone(&ctx), listener).await.unwrap();
    let elapsed = start.elapsed();
    feeder.abort();

    assert!(elapsed >= Duration::from_millis(500));
    assert!(elapsed < Duration::from_secs(1), "window overran: {elapsed:?}");
    assert!(ctx.stats.received.load(Ordering::Relaxed) > 0);
}
