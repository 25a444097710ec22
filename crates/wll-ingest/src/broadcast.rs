//! UDP real-time broadcast reception
//!
//! One [`BroadcastReceiver`] lives for one broadcast lease. It binds the
//! granted port, runs a reception task and is fail-stop: the first error ends
//! reception and is reported through [`PacketCallback::on_packet_receive_error`].
//! The next lease renewal replaces it with a fresh receiver.

use crate::{IngestError, IngestResult, PacketCallback};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};
use wll_core::{ObservationPacket, PacketError};

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// What to do with a datagram that is not valid JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeFailurePolicy {
    /// Report the error and stop receiving until the next renewal
    #[default]
    Terminate,
    /// Log and keep receiving
    Skip,
}

impl FromStr for DecodeFailurePolicy {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "terminate" => Ok(DecodeFailurePolicy::Terminate),
            "skip" => Ok(DecodeFailurePolicy::Skip),
            other => Err(IngestError::ConfigurationError(format!(
                "unknown decode failure policy {other:?}, expected \"terminate\" or \"skip\""
            ))),
        }
    }
}

impl fmt::Display for DecodeFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeFailurePolicy::Terminate => write!(f, "terminate"),
            DecodeFailurePolicy::Skip => write!(f, "skip"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverOptions {
    /// Upper bound on a single socket wait
    pub wait_timeout: Duration,
    pub decode_failure: DecodeFailurePolicy,
}

impl Default for ReceiverOptions {
    fn default() -> Self {
        Self {
            wait_timeout: WAIT_TIMEOUT,
            decode_failure: DecodeFailurePolicy::default(),
        }
    }
}

pub struct BroadcastReceiver {
    local_addr: SocketAddr,
    wait_timeout: Duration,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl BroadcastReceiver {
    pub async fn start(
        bind: SocketAddr,
        callback: Arc<dyn PacketCallback>,
        options: ReceiverOptions,
    ) -> IngestResult<Self> {
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| IngestError::CommunicationError(format!("bind {bind}: {e}")))?;
        socket
            .set_broadcast(true)
            .map_err(|e| IngestError::CommunicationError(e.to_string()))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| IngestError::CommunicationError(e.to_string()))?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(receive_loop(socket, callback, options, stop_rx));
        debug!("Started broadcast reception on {}", local_addr);

        Ok(Self {
            local_addr,
            wait_timeout: options.wait_timeout,
            stop: Some(stop_tx),
            task: Some(task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the reception task is still alive
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop reception and release the socket; safe to call more than once
    pub async fn close(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let Some(mut task) = self.task.take() else {
            return;
        };

        if timeout(self.wait_timeout * 3, &mut task).await.is_err() {
            warn!(
                "Broadcast reception on {} did not stop in time, aborting",
                self.local_addr
            );
            task.abort();
        }
        debug!("Closed broadcast reception on {}", self.local_addr);
    }
}

impl Drop for BroadcastReceiver {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn receive_loop(
    socket: UdpSocket,
    callback: Arc<dyn PacketCallback>,
    options: ReceiverOptions,
    mut stop: oneshot::Receiver<()>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let received = tokio::select! {
            _ = &mut stop => break,
            r = timeout(options.wait_timeout, socket.recv_from(&mut buf)) => r,
        };

        let (n, peer) = match received {
            // Nothing within one wait; look at the stop signal again
            Err(_) => continue,
            Ok(Ok(r)) => r,
            Ok(Err(e)) => {
                callback.on_packet_receive_error(IngestError::CommunicationError(e.to_string()));
                break;
            }
        };
        debug!("Received {} bytes from {}", n, peer);

        let packet = match ObservationPacket::from_broadcast_slice(&buf[..n]) {
            Ok(packet) => packet,
            Err(PacketError::Decode(e)) if options.decode_failure == DecodeFailurePolicy::Skip => {
                warn!("Skipping undecodable broadcast from {}: {}", peer, e);
                continue;
            }
            Err(e) => {
                callback.on_packet_receive_error(e.into());
                break;
            }
        };

        if let Err(e) = callback.on_packet_received(packet) {
            callback.on_packet_receive_error(e);
            break;
        }
    }

    debug!("Broadcast reception stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect {
        packets: Mutex<Vec<ObservationPacket>>,
        errors: Mutex<Vec<IngestError>>,
    }

    impl PacketCallback for Collect {
        fn on_packet_received(&self, packet: ObservationPacket) -> IngestResult<()> {
            self.packets.lock().unwrap().push(packet);
            Ok(())
        }

        fn on_packet_receive_error(&self, error: IngestError) {
            self.errors.lock().unwrap().push(error);
        }
    }

    fn local() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_decode_failure_policy_parsing() {
        assert_eq!("skip".parse::<DecodeFailurePolicy>().unwrap(), DecodeFailurePolicy::Skip);
        assert_eq!(
            " Terminate ".parse::<DecodeFailurePolicy>().unwrap(),
            DecodeFailurePolicy::Terminate
        );
        assert!("ignore".parse::<DecodeFailurePolicy>().is_err());
    }

    #[tokio::test]
    async fn test_receives_broadcast() {
        let callback = Arc::new(Collect::default());
        let mut receiver =
            BroadcastReceiver::start(local(), callback.clone(), ReceiverOptions::default())
                .await
                .unwrap();

        let sender = UdpSocket::bind(local()).await.unwrap();
        let json = r#"{"did":"001D0A700002","ts":1700000000,"conditions":[
            {"data_structure_type":1,"txid":1,"wind_speed_last":4.0,"wind_dir_last":90}
        ]}"#;
        sender
            .send_to(json.as_bytes(), receiver.local_addr())
            .await
            .unwrap();

        wait_until(|| !callback.packets.lock().unwrap().is_empty()).await;
        let packets = callback.packets.lock().unwrap().clone();
        assert_eq!(packets[0].timestamp, 1700000000);
        assert!(packets[0].source.is_realtime());

        receiver.close().await;
        assert!(!receiver.is_running());
    }

    #[tokio::test]
    async fn test_close_twice() {
        let callback = Arc::new(Collect::default());
        let mut receiver =
            BroadcastReceiver::start(local(), callback.clone(), ReceiverOptions::default())
                .await
                .unwrap();
        assert!(receiver.is_running());
        let addr = receiver.local_addr();

        receiver.close().await;
        receiver.close().await;
        assert!(!receiver.is_running());
        assert!(callback.errors.lock().unwrap().is_empty());

        // the port is free again once closed
        UdpSocket::bind(addr).await.unwrap();
    }

    #[tokio::test]
    async fn test_decode_error_terminates_reception() {
        let callback = Arc::new(Collect::default());
        let receiver =
            BroadcastReceiver::start(local(), callback.clone(), ReceiverOptions::default())
                .await
                .unwrap();

        let sender = UdpSocket::bind(local()).await.unwrap();
        sender
            .send_to(b"{not json", receiver.local_addr())
            .await
            .unwrap();

        wait_until(|| !receiver.is_running()).await;
        let errors = callback.errors.lock().unwrap().clone();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], IngestError::InvalidPacket(_)));
    }

    #[tokio::test]
    async fn test_decode_error_skipped() {
        let callback = Arc::new(Collect::default());
        let options = ReceiverOptions {
            decode_failure: DecodeFailurePolicy::Skip,
            ..ReceiverOptions::default()
        };
        let mut receiver = BroadcastReceiver::start(local(), callback.clone(), options)
            .await
            .unwrap();

        let sender = UdpSocket::bind(local()).await.unwrap();
        let addr = receiver.local_addr();
        sender.send_to(b"garbage", addr).await.unwrap();
        sender
            .send_to(br#"{"did":"x","ts":1700000001,"conditions":[]}"#, addr)
            .await
            .unwrap();

        wait_until(|| !callback.packets.lock().unwrap().is_empty()).await;
        assert!(receiver.is_running());
        assert!(callback.errors.lock().unwrap().is_empty());

        receiver.close().await;
    }
}
