use common::SensorType;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Largest payload a single UDP datagram can carry over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("{sensor_type} listener is already started")]
    AlreadyStarted { sensor_type: SensorType },

    #[error("{sensor_type} listener has been shut down")]
    Stopped { sensor_type: SensorType },

    #[error("failed to bind {sensor_type} listener to {addr}: {source}")]
    Bind {
        sensor_type: SensorType,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read local address of {sensor_type} listener: {source}")]
    LocalAddr {
        sensor_type: SensorType,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerState {
    Idle,
    Running,
    Stopped,
}

/// Receives text datagrams for one metric and fans each line out to every
/// subscriber.
///
/// Lines are broadcast in arrival order through a bounded channel; a
/// subscriber that falls more than the channel capacity behind loses the
/// oldest lines. A subscriber sees every line sent after it subscribed.
pub struct UdpListener {
    sensor_type: SensorType,
    bind_addr: SocketAddr,
    sender: Option<broadcast::Sender<String>>,
    state: ListenerState,
    local_addr: Option<SocketAddr>,
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl UdpListener {
    pub fn new(sensor_type: SensorType, bind_addr: SocketAddr, buffer_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_capacity.max(1));
        Self {
            sensor_type,
            bind_addr,
            sender: Some(sender),
            state: ListenerState::Idle,
            local_addr: None,
            stop: CancellationToken::new(),
            task: None,
        }
    }

    pub fn sensor_type(&self) -> SensorType {
        self.sensor_type
    }

    /// Address the socket is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// New independent receiver of the lines emitted from now on.
    pub fn subscribe(&self) -> Result<broadcast::Receiver<String>, ListenerError> {
        self.sender
            .as_ref()
            .map(|sender| sender.subscribe())
            .ok_or(ListenerError::Stopped {
                sensor_type: self.sensor_type,
            })
    }

    /// Bind the socket and spawn the receive task.
    ///
    /// Returns once the socket is bound; datagrams are handled on the
    /// spawned task.
    pub async fn start(&mut self) -> Result<SocketAddr, ListenerError> {
        match self.state {
            ListenerState::Running => {
                return Err(ListenerError::AlreadyStarted {
                    sensor_type: self.sensor_type,
                })
            }
            ListenerState::Stopped => {
                return Err(ListenerError::Stopped {
                    sensor_type: self.sensor_type,
                })
            }
            ListenerState::Idle => {}
        }

        let sender = match &self.sender {
            Some(sender) => sender.clone(),
            None => {
                return Err(ListenerError::Stopped {
                    sensor_type: self.sensor_type,
                })
            }
        };

        let socket = UdpSocket::bind(self.bind_addr)
            .await
            .map_err(|source| ListenerError::Bind {
                sensor_type: self.sensor_type,
                addr: self.bind_addr,
                source,
            })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| ListenerError::LocalAddr {
                sensor_type: self.sensor_type,
                source,
            })?;

        info!(
            sensor_type = %self.sensor_type,
            addr = %local_addr,
            "UDP listener started"
        );

        self.task = Some(tokio::spawn(receive_loop(
            socket,
            self.sensor_type,
            sender,
            self.stop.clone(),
        )));
        self.local_addr = Some(local_addr);
        self.state = ListenerState::Running;

        Ok(local_addr)
    }

    /// Stop receiving and release the socket.
    ///
    /// Waits for the receive task to exit. Once every buffered line has been
    /// read, subscribers observe the end of the stream. Calling it again is
    /// a no-op.
    pub async fn shutdown(&mut self) {
        if self.state == ListenerState::Stopped {
            return;
        }

        self.stop.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(sensor_type = %self.sensor_type, error = %e, "UDP receive task ended abnormally");
            }
        }
        self.sender = None;
        self.state = ListenerState::Stopped;

        info!(sensor_type = %self.sensor_type, "UDP listener stopped");
    }
}

async fn receive_loop(
    socket: UdpSocket,
    sensor_type: SensorType,
    sender: broadcast::Sender<String>,
    stop: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, peer)) => {
                    // Datagrams that are not UTF-8 text are dropped.
                    let Ok(line) = std::str::from_utf8(&buf[..len]) else {
                        continue;
                    };
                    debug!(sensor_type = %sensor_type, peer = %peer, line = %line, "received datagram");
                    // No subscribers is not an error.
                    let _ = sender.send(line.to_string());
                }
                Err(e) => {
                    warn!(sensor_type = %sensor_type, error = %e, "UDP receive error");
                }
            }
        }
    }
}
