use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::config::TestRun;
use crate::error::Result;
use crate::registry::SensorRegistry;
use crate::store::SensorStore;
use crate::writer;

/// Largest payload a single UDP datagram can carry.
const MAX_DATAGRAM_SIZE: usize = 65507;

/// Read-only state shared by the ingestion loop and every dispatched
/// write. Constructed once at startup; the registry is immutable so no
/// locking is needed in the core.
pub struct IngestContext {
    pub store: Arc<dyn SensorStore>,
    pub run: TestRun,
    pub registry: SensorRegistry,
    pub database: String,
    pub stats: Stats,
}

impl IngestContext {
    pub fn new(
        store: Arc<dyn SensorStore>,
        run: TestRun,
        registry: SensorRegistry,
        database: String,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            run,
            registry,
            database,
            stats: Stats::default(),
        })
    }
}

/// Run counters, logged once when the execution window closes.
#[derive(Debug, Default)]
pub struct Stats {
    pub received: AtomicU64,
    pub accepted: AtomicU64,
    pub filtered: AtomicU64,
    pub written: AtomicU64,
    pub write_failures: AtomicU64,
    pub in_flight: AtomicU64,
}

/// Listen for sensor broadcasts until the execution window closes.
///
/// The countdown is armed before the first receive so the window is
/// measured against actual listening time. Returns `Ok(())` on expiry; a
/// socket-level receive failure propagates out instead and is not retried
/// here. In-flight writes are not awaited at expiry — any still pending
/// may be lost, and their count is logged.
pub async fn listen(ctx: Arc<IngestContext>, socket: UdpSocket) -> Result<()> {
    let window = tokio::time::sleep(ctx.run.execution_duration);
    tokio::pin!(window);

    info!(
        "listening on {} for {}s",
        socket.local_addr()?,
        ctx.run.execution_duration.as_secs()
    );

    tokio::select! {
        _ = &mut window => {
            let pending = ctx.stats.in_flight.load(Ordering::Relaxed);
            if pending > 0 {
                warn!("execution window ended with {pending} writes still in flight");
            } else {
                info!("execution window ended");
            }
            Ok(())
        }
        res = receive_loop(&ctx, &socket) => res,
    }
}

/// Blocks on the socket and fans accepted datagrams out to the writer.
/// Only a receive error breaks the loop.
async fn receive_loop(ctx: &Arc<IngestContext>, socket: &UdpSocket) -> Result<()> {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let (len, addr) = socket.recv_from(&mut buf).await?;
        ctx.stats.received.fetch_add(1, Ordering::Relaxed);

        let ip = addr.ip().to_string();
        let port = addr.port();

        if !ctx.registry.contains(&ip, port) {
            ctx.stats.filtered.fetch_add(1, Ordering::Relaxed);
            debug!("discarding broadcast from unregistered {addr}");
            continue;
        }

        ctx.stats.accepted.fetch_add(1, Ordering::Relaxed);
        debug!("received broadcast from {addr}");

        let payload = String::from_utf8_lossy(&buf[..len]).into_owned();
        writer::dispatch(Arc::clone(ctx), ip, port, payload);
    }
}
