use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error};

use crate::ingest::IngestContext;

/// One accepted datagram, stamped at receipt and handed to the store.
#[derive(Debug, Clone, Serialize)]
pub struct SensorOutput {
    pub timestamp: DateTime<Utc>,
    pub sensor_ip: String,
    pub sensor_port: u16,
    pub payload: String,
}

/// Fire-and-forget write of one accepted datagram.
///
/// The record is stamped with the receive time, then the store write runs
/// on its own task so the ingestion loop returns to the socket
/// immediately. Writes for different datagrams may complete out of order;
/// the embedded timestamp is the authoritative ordering. A failed write is
/// logged and the record dropped — no retry, no buffering.
pub fn dispatch(ctx: Arc<IngestContext>, sensor_ip: String, sensor_port: u16, payload: String) {
    let output = SensorOutput {
        timestamp: Utc::now(),
        sensor_ip,
        sensor_port,
        payload,
    };

    ctx.stats.in_flight.fetch_add(1, Ordering::Relaxed);

    tokio::spawn(async move {
        let records = [output];
        match ctx
            .store
            .write_records(&ctx.database, &ctx.run.measurement, &records)
            .await
        {
            Ok(()) => {
                ctx.stats.written.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "wrote broadcast from {}:{} to {}",
                    records[0].sensor_ip, records[0].sensor_port, ctx.run.measurement
                );
            }
            Err(e) => {
                ctx.stats.write_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    "dropping broadcast from {}:{}: {e}",
                    records[0].sensor_ip, records[0].sensor_port
                );
            }
        }
        ctx.stats.in_flight.fetch_sub(1, Ordering::Relaxed);
    });
}
