//! Data hosts: one per feed
//!
//! A host maps packets into stamped records, queues them for the consumer and
//! wakes it through the shared data event. Both hosts share one mapper chain
//! so stateful mappers see every packet.

use crate::{
    BroadcastReceiver, BroadcastTarget, DeviceClient, ErrorSlot, IngestError, IngestResult,
    PacketCallback, PollTarget, ReceiverOptions,
};
use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info};
use wll_core::{unit_systems, ObservationPacket, Record};
use wll_mapping::MapperChain;

/// Port the device broadcasts on unless a lease says otherwise
pub const DEFAULT_BROADCAST_PORT: u16 = 22222;

pub type SharedChain = Arc<Mutex<MapperChain>>;

pub struct DataHost {
    name: &'static str,
    chain: SharedChain,
    queue: Mutex<VecDeque<Record>>,
    error: ErrorSlot,
    data_event: Arc<Notify>,
}

impl DataHost {
    pub fn new(name: &'static str, chain: SharedChain, data_event: Arc<Notify>) -> Self {
        Self {
            name,
            chain,
            queue: Mutex::new(VecDeque::new()),
            error: ErrorSlot::new(),
            data_event,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Map `packet` into a US-unit record, queue it and wake the consumer
    pub fn create_record(&self, packet: &ObservationPacket) -> IngestResult<()> {
        let mut record = self
            .chain
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(packet)?;
        record.stamp(packet.timestamp, unit_systems::US);

        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(record);
        self.data_event.notify_one();
        Ok(())
    }

    /// Record a feed failure and wake the consumer so it sees it promptly
    pub fn notify_error(&self, e: IngestError) {
        error!("Error in {} feed: {}", self.name, e);
        self.error.set(e);
        self.data_event.notify_one();
    }

    pub fn has_error(&self) -> bool {
        self.error.is_set()
    }

    pub fn raise_error(&self) -> IngestResult<()> {
        self.error.raise()
    }

    /// Take every queued record, oldest first
    pub fn drain(&self) -> Vec<Record> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl PacketCallback for DataHost {
    fn on_packet_received(&self, packet: ObservationPacket) -> IngestResult<()> {
        self.create_record(&packet)
    }

    fn on_packet_receive_error(&self, error: IngestError) {
        self.notify_error(error);
    }
}

pub struct PollHost {
    data: DataHost,
    client: DeviceClient,
}

impl PollHost {
    pub fn new(data: DataHost, client: DeviceClient) -> Self {
        Self { data, client }
    }

    pub fn data(&self) -> &DataHost {
        &self.data
    }
}

#[async_trait::async_trait]
impl PollTarget for PollHost {
    /// Errors propagate so that a broken poll path stops the scheduler
    async fn poll(&self) -> IngestResult<()> {
        let packet = self.client.request_current().await?;
        debug!("Polled current conditions at {}", packet.timestamp);
        self.data.create_record(&packet)
    }
}

pub struct BroadcastHost {
    data: Arc<DataHost>,
    client: DeviceClient,
    bind_ip: IpAddr,
    options: ReceiverOptions,
    port: Mutex<u16>,
    receiver: tokio::sync::Mutex<Option<BroadcastReceiver>>,
}

impl BroadcastHost {
    pub fn new(
        data: Arc<DataHost>,
        client: DeviceClient,
        bind_ip: IpAddr,
        options: ReceiverOptions,
    ) -> Self {
        Self {
            data,
            client,
            bind_ip,
            options,
            port: Mutex::new(DEFAULT_BROADCAST_PORT),
            receiver: tokio::sync::Mutex::new(None),
        }
    }

    pub fn data(&self) -> &DataHost {
        &self.data
    }

    pub fn port(&self) -> u16 {
        *self.port.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn receiver_addr(&self) -> Option<SocketAddr> {
        self.receiver.lock().await.as_ref().map(BroadcastReceiver::local_addr)
    }

    pub async fn is_receiving(&self) -> bool {
        self.receiver
            .lock()
            .await
            .as_ref()
            .is_some_and(BroadcastReceiver::is_running)
    }

    /// Close the current receiver, if any; safe to call more than once
    pub async fn close(&self) {
        if let Some(mut receiver) = self.receiver.lock().await.take() {
            receiver.close().await;
        }
    }

    fn update_port(&self, granted: u16) -> u16 {
        let mut port = self.port.lock().unwrap_or_else(PoisonError::into_inner);
        if *port != granted {
            info!("Broadcast port changed from {} to {}", *port, granted);
            *port = granted;
        }
        *port
    }
}

#[async_trait::async_trait]
impl BroadcastTarget for BroadcastHost {
    /// Request a new lease and restart reception on the granted port
    async fn refresh_broadcast(&self, duration: Duration) -> IngestResult<()> {
        let lease = self.client.start_broadcast(duration).await?;
        let port = self.update_port(lease.broadcast_port);

        let mut receiver = self.receiver.lock().await;
        if let Some(mut old) = receiver.take() {
            old.close().await;
        }

        let callback: Arc<dyn PacketCallback> = self.data.clone();
        *receiver = Some(
            BroadcastReceiver::start(SocketAddr::new(self.bind_ip, port), callback, self.options)
                .await?,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wll_mapping::{LogFlags, MappingDefinition};

    fn chain(raw: &[&str]) -> SharedChain {
        let definitions: Vec<MappingDefinition> = raw.iter().map(|s| s.parse().unwrap()).collect();
        Arc::new(Mutex::new(
            MapperChain::from_definitions(&definitions, LogFlags::default()).unwrap(),
        ))
    }

    fn packet(ts: i64, temp: f64) -> ObservationPacket {
        ObservationPacket::from_broadcast(&json!({
            "did": "001D0A700002",
            "ts": ts,
            "conditions": [{"data_structure_type": 1, "txid": 1, "temp": temp,
                            "rain_size": 1, "rain_rate_last": 0, "rainfall_daily": 10}]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_record_stamps_and_wakes() {
        let event = Arc::new(Notify::new());
        let host = DataHost::new("broadcast", chain(&["t:1"]), event.clone());

        host.create_record(&packet(1700000000, 61.5)).unwrap();
        host.create_record(&packet(1700000002, 61.7)).unwrap();
        event.notified().await;

        let records = host.drain();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date_time, 1700000000);
        assert_eq!(records[0].us_units, unit_systems::US);
        assert_eq!(records[0].value("outTemp"), Some(61.5));
        assert_eq!(records[1].value("outTemp"), Some(61.7));
        assert_eq!(host.pending(), 0);
    }

    #[tokio::test]
    async fn test_error_is_sticky_and_wakes() {
        let event = Arc::new(Notify::new());
        let host = DataHost::new("poll", chain(&["t:1"]), event.clone());
        assert!(host.raise_error().is_ok());

        host.notify_error(IngestError::Timeout);
        event.notified().await;

        assert!(host.has_error());
        assert!(matches!(host.raise_error(), Err(IngestError::Timeout)));
        assert!(matches!(host.raise_error(), Err(IngestError::Timeout)));
    }

    #[test]
    fn test_hosts_share_rain_state() {
        let shared = chain(&["rain:1"]);
        let event = Arc::new(Notify::new());
        let first = DataHost::new("a", shared.clone(), event.clone());
        let second = DataHost::new("b", shared, event);

        first.create_record(&packet(1, 60.0)).unwrap();
        let mut later = packet(2, 60.0);
        later.conditions[0].values.insert("rainfall_daily".into(), Some(13.0));
        second.create_record(&later).unwrap();

        let record = &second.drain()[0];
        assert_eq!(record.value("rainCount"), Some(3.0));
    }

    #[test]
    fn test_mapping_error_is_returned() {
        let event = Arc::new(Notify::new());
        let host = DataHost::new("broadcast", chain(&["rain:1"]), event);
        let mut bad = packet(1, 60.0);
        bad.conditions[0].values.insert("rain_size".into(), Some(9.0));

        assert!(matches!(
            host.create_record(&bad),
            Err(IngestError::MappingError(_))
        ));
        assert_eq!(host.pending(), 0);
    }
}
