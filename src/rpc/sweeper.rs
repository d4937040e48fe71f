//! Disconnect sweeper.
//!
//! Reclaims everything a connection still holds when it goes away without
//! closing its resources. Codecs depend on their engine, so the order is
//! fixed:
//!
//! ```text
//!   wait idle ──▶ delete decoders ──▶ delete encoders ──▶ close engines
//!       │
//!       └── timeout: fatal, nothing is released
//! ```
//!
//! Sweeping an absent client is a no-op, so a repeated notice is harmless.

use log::{error, info, warn};

use crate::app::ports::Ports;
use crate::codec::{CapabilityTable, CodecKind};
use crate::error::{DceError, Result};
use crate::handle::ConnectionId;
use crate::registry::Registry;

/// What one sweep released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub decoders: usize,
    pub encoders: usize,
    pub engines: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.decoders + self.encoders + self.engines == 0
    }
}

pub fn sweep(
    registry: &mut Registry,
    codecs: &mut CapabilityTable,
    ports: &mut Ports<'_>,
    connection: ConnectionId,
    idle_timeout_ms: u32,
) -> Result<SweepReport> {
    let mut report = SweepReport::default();
    let Some(client) = registry.find_client(connection) else {
        info!("SWEEP[{}]: nothing held", connection);
        return Ok(report);
    };

    let engines = client.engines().snapshot();
    let held = [
        (CodecKind::Decode, client.codecs(CodecKind::Decode).snapshot()),
        (CodecKind::Encode, client.codecs(CodecKind::Encode).snapshot()),
    ];

    if ports.accelerator.wait_idle(connection, idle_timeout_ms).is_err() {
        error!(
            "SWEEP[{}]: accelerator still busy after {} ms",
            connection, idle_timeout_ms
        );
        return Err(DceError::AcceleratorWedged);
    }

    for (kind, handles) in &held {
        for &codec in handles {
            codecs.delete(*kind, codec);
            if registry.unregister_codec(*kind, connection, codec).is_ok() {
                match kind {
                    CodecKind::Decode => report.decoders += 1,
                    CodecKind::Encode => report.encoders += 1,
                }
            }
        }
    }

    for engine in engines {
        ports.engines.close(engine);
        if registry.unregister_engine(connection, engine).is_ok() {
            report.engines += 1;
        }
    }

    if registry.find_client(connection).is_some() {
        warn!("SWEEP[{}]: client row survived the sweep", connection);
    }
    info!(
        "SWEEP[{}]: released {} decoders, {} encoders, {} engines",
        connection, report.decoders, report.encoders, report.engines
    );
    Ok(report)
}
