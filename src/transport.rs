//! ZeroMQ publisher
//!
//! PUB socket that carries UAV reports and heartbeats to the collector.
//! The tap connects; the collector binds. Outbound messages pass through a
//! bounded queue: when it is full the newest message is dropped and counted,
//! never blocking the correlator. The socket itself carries a send-side HWM
//! and reconnects on its own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::protocol::{self, TapHeartbeat, UavReport, TOPIC_HEARTBEAT, TOPIC_UAV};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("zmq error: {0}")]
    Zmq(#[from] zmq::Error),
}

/// Publisher endpoint and queue bounds.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub host: String,
    pub port: u16,
    /// Outbound queue depth
    pub buffer_size: usize,
    /// ZMQ send high-water mark
    pub hwm: i32,
}

/// One queued outbound message.
#[derive(Debug)]
pub enum Outbound {
    Uav(Box<UavReport>),
    Heartbeat(Box<TapHeartbeat>),
}

/// Cheap handle for enqueueing messages from other tasks.
#[derive(Clone)]
pub struct PublisherHandle {
    tx: mpsc::Sender<Outbound>,
    drops: Arc<AtomicU64>,
}

impl PublisherHandle {
    pub fn publish_uav(&self, report: UavReport) {
        self.enqueue(Outbound::Uav(Box::new(report)));
    }

    pub fn publish_heartbeat(&self, heartbeat: TapHeartbeat) {
        self.enqueue(Outbound::Heartbeat(Box::new(heartbeat)));
    }

    fn enqueue(&self, msg: Outbound) {
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.drops.fetch_add(1, Ordering::Relaxed);
                debug!("outbound queue full, dropping newest message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("publisher gone, message discarded");
            }
        }
    }

    /// Messages dropped on queue overflow.
    pub fn drop_count(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }
}

/// The publishing task: owns the queue receiver and the PUB socket.
pub struct Publisher {
    config: PublisherConfig,
    rx: mpsc::Receiver<Outbound>,
}

impl Publisher {
    /// Build the queue and split into a handle and the task half.
    pub fn channel(config: PublisherConfig) -> (PublisherHandle, Publisher) {
        let (tx, rx) = mpsc::channel(config.buffer_size.max(1));
        let handle = PublisherHandle {
            tx,
            drops: Arc::new(AtomicU64::new(0)),
        };
        (handle, Publisher { config, rx })
    }

    /// Run until every handle is dropped. The socket lingers briefly on
    /// close so queued frames flush.
    pub async fn run(mut self) -> Result<(), TransportError> {
        let context = zmq::Context::new();
        let socket = context.socket(zmq::PUB)?;
        socket.set_sndhwm(self.config.hwm)?;
        socket.set_linger(5_000)?;
        socket.set_reconnect_ivl(1_000)?;
        socket.set_reconnect_ivl_max(30_000)?;
        socket.set_tcp_keepalive(1)?;
        socket.set_tcp_keepalive_idle(60)?;
        socket.set_tcp_keepalive_intvl(10)?;
        socket.set_tcp_keepalive_cnt(3)?;

        let endpoint = format!("tcp://{}:{}", self.config.host, self.config.port);
        socket.connect(&endpoint)?;
        info!("publisher connected to {}", endpoint);

        let mut sent: u64 = 0;
        let mut hwm_drops: u64 = 0;
        let mut errors: u64 = 0;

        while let Some(msg) = self.rx.recv().await {
            let (topic, payload) = match encode_outbound(&msg) {
                Ok(pair) => pair,
                Err(e) => {
                    errors += 1;
                    warn!("failed to encode outbound message: {}", e);
                    continue;
                }
            };

            match socket.send_multipart([topic, payload.as_slice()], zmq::DONTWAIT) {
                Ok(()) => sent += 1,
                Err(zmq::Error::EAGAIN) => {
                    // Socket HWM reached while the collector is unreachable
                    hwm_drops += 1;
                    debug!("socket HWM reached, message dropped");
                }
                Err(e) => {
                    errors += 1;
                    warn!("zmq send failed: {}", e);
                }
            }
        }

        info!(
            "publisher stopped: {} sent, {} hwm drops, {} errors",
            sent, hwm_drops, errors
        );
        Ok(())
    }
}

fn encode_outbound(msg: &Outbound) -> Result<(&'static [u8], Vec<u8>), rmp_serde::encode::Error> {
    match msg {
        Outbound::Uav(report) => Ok((TOPIC_UAV, protocol::encode(report.as_ref())?)),
        Outbound::Heartbeat(hb) => Ok((TOPIC_HEARTBEAT, protocol::encode(hb.as_ref())?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn report(serial: &str) -> UavReport {
        UavReport {
            kind: protocol::MSG_UAV_REPORT.to_string(),
            protocol_version: protocol::PROTOCOL_VERSION,
            tap_uuid: "t".into(),
            timestamp: "2024-01-01T00:00:00Z".into(),
            mac: "aa:bb:cc:00:00:01".into(),
            identifier: serial.into(),
            detection_source: "RemoteIdWiFi".into(),
            latitude: None,
            longitude: None,
            altitude_geodetic: None,
            altitude_pressure: None,
            height: None,
            height_type: None,
            ground_track: None,
            speed: None,
            vertical_speed: None,
            id_serial: Some(serial.into()),
            id_registration: None,
            id_utm: None,
            id_session: None,
            uav_type: "OTHER".into(),
            operational_status: None,
            operator_latitude: None,
            operator_longitude: None,
            operator_altitude: None,
            operator_id: None,
            operator_location_type: None,
            rssi: None,
            ssid: None,
            accuracy_horizontal: None,
            accuracy_vertical: None,
            accuracy_barometer: None,
            accuracy_speed: None,
            category_eu: None,
            class_eu: None,
            area_count: None,
            area_radius: None,
            area_ceiling: None,
            area_floor: None,
            spoof_flags: vec![],
            trust_score: 100,
            auth_type: None,
            auth_data: None,
            designation: None,
            message_types_seen: vec![0],
            self_id_description: None,
            self_id_type: None,
            raw_fields: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_queue_overflow_drops_newest() {
        let (handle, mut publisher) = Publisher::channel(PublisherConfig {
            host: "127.0.0.1".into(),
            port: 5590,
            buffer_size: 2,
            hwm: 1000,
        });

        handle.publish_uav(report("A"));
        handle.publish_uav(report("B"));
        // Queue is full: C is the one dropped
        handle.publish_uav(report("C"));
        assert_eq!(handle.drop_count(), 1);

        // The older messages survive in order
        let first = publisher.rx.recv().await.unwrap();
        let second = publisher.rx.recv().await.unwrap();
        match (first, second) {
            (Outbound::Uav(a), Outbound::Uav(b)) => {
                assert_eq!(a.identifier, "A");
                assert_eq!(b.identifier, "B");
            }
            _ => panic!("unexpected message kinds"),
        }
    }

    #[test]
    fn test_encode_outbound_topics() {
        let (topic, payload) = encode_outbound(&Outbound::Uav(Box::new(report("X")))).unwrap();
        assert_eq!(topic, TOPIC_UAV);
        assert!(!payload.is_empty());
    }
}
