//! Live ingestion sources: TCP clients and the AIS UDP receiver.
//!
//! Every source runs as its own task with its own reconnect loop, its own
//! framer/merger state and its own liveness record. Sources only meet at
//! the shared track table.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use seasky_core::config::SourcesConfig;
use seasky_core::liveness::{
    LivenessRegistry, SourceLiveness, ADSB_TIMEOUT_MS, AIS_TIMEOUT_MS, AVR_TIMEOUT_MS,
    MLAT_TIMEOUT_MS,
};
use seasky_core::table::TrackTable;
use seasky_core::types::now_millis;

use crate::ingest::{AisIngest, AvrIngest, BeastIngest, Ingest};

const RECONNECT_DELAY: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_BUF_LEN: usize = 4096;
const MAX_DATAGRAM_LEN: usize = 2048;

/// One ingestion source.
#[async_trait]
pub trait Source: Send {
    fn name(&self) -> &str;

    /// Open the transport and pump it into the table until the transport
    /// closes, fails, or shutdown is signalled.
    async fn run_session(
        &mut self,
        table: &TrackTable,
        shutdown: &mut watch::Receiver<bool>,
    ) -> io::Result<()>;
}

// ---------------------------------------------------------------------------
// TCP
// ---------------------------------------------------------------------------

/// TCP client feeding a stream ingest (BEAST binary or AVR text).
pub struct TcpFeed<I> {
    name: String,
    addr: String,
    ingest: I,
    liveness: Arc<SourceLiveness>,
}

impl<I: Ingest> TcpFeed<I> {
    pub fn new(addr: String, ingest: I, liveness: Arc<SourceLiveness>) -> Self {
        TcpFeed {
            name: liveness.name().to_string(),
            addr,
            ingest,
            liveness,
        }
    }
}

#[async_trait]
impl<I: Ingest> Source for TcpFeed<I> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run_session(
        &mut self,
        table: &TrackTable,
        shutdown: &mut watch::Receiver<bool>,
    ) -> io::Result<()> {
        let connect = TcpStream::connect(self.addr.as_str());
        let mut stream = tokio::time::timeout(CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        info!(source = %self.name, addr = %self.addr, "connected");
        self.ingest.reset();

        // A connected peer that goes quiet is treated like a dead one
        let idle = Duration::from_millis(self.liveness.timeout_ms().max(1) as u64);
        let mut buf = vec![0u8; READ_BUF_LEN];
        let result = loop {
            tokio::select! {
                _ = shutdown.changed() => break Ok(()),
                read = tokio::time::timeout(idle, stream.read(&mut buf)) => match read {
                    Err(_) => {
                        warn!(source = %self.name, idle_ms = idle.as_millis() as u64, "no data, dropping connection");
                        break Err(io::Error::new(io::ErrorKind::TimedOut, "no data within source timeout"));
                    }
                    Ok(Ok(0)) => {
                        info!(source = %self.name, "connection closed by peer");
                        break Ok(());
                    }
                    Ok(Ok(n)) => {
                        let now = now_millis();
                        self.liveness.record_packet(now);
                        self.ingest.feed(table, &buf[..n], now);
                    }
                    Ok(Err(e)) => break Err(e),
                },
            }
        };

        self.ingest.finish(table, now_millis());
        self.liveness.set_online(false);
        result
    }
}

// ---------------------------------------------------------------------------
// UDP
// ---------------------------------------------------------------------------

/// UDP receiver for NMEA AIS datagrams.
pub struct UdpFeed {
    name: String,
    port: u16,
    ingest: AisIngest,
    liveness: Arc<SourceLiveness>,
}

impl UdpFeed {
    pub fn new(port: u16, liveness: Arc<SourceLiveness>) -> Self {
        let name = liveness.name().to_string();
        UdpFeed {
            ingest: AisIngest::new(name.clone()),
            name,
            port,
            liveness,
        }
    }
}

#[async_trait]
impl Source for UdpFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run_session(
        &mut self,
        table: &TrackTable,
        shutdown: &mut watch::Receiver<bool>,
    ) -> io::Result<()> {
        let socket = UdpSocket::bind(("0.0.0.0", self.port)).await?;
        info!(source = %self.name, port = self.port, "listening for AIS datagrams");

        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        loop {
            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                recv = socket.recv(&mut buf) => {
                    let n = recv?;
                    let now = now_millis();
                    self.liveness.record_packet(now);
                    // A datagram is a complete set of sentences
                    self.ingest.feed(table, &buf[..n], now);
                    self.ingest.finish(table, now);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Supervision
// ---------------------------------------------------------------------------

/// Run a source until shutdown, reconnecting after every failure.
pub async fn run_source(
    mut source: Box<dyn Source>,
    table: Arc<TrackTable>,
    mut shutdown: watch::Receiver<bool>,
) {
    while !*shutdown.borrow() {
        match source.run_session(&table, &mut shutdown).await {
            Ok(()) => {}
            Err(e) => warn!(source = source.name(), error = %e, "source failed"),
        }
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(RECONNECT_DELAY) => {
                info!(source = source.name(), "reconnecting");
            }
        }
    }
    info!(source = source.name(), "source stopped");
}

/// Build every source enabled in `config`. A port of 0 disables a source.
pub fn build_sources(
    config: &SourcesConfig,
    registry: &LivenessRegistry,
    reference: Option<(f64, f64)>,
) -> Vec<Box<dyn Source>> {
    let mut sources: Vec<Box<dyn Source>> = Vec::new();

    if config.adsb_port != 0 {
        let liveness = registry.register("ADS-B", ADSB_TIMEOUT_MS);
        sources.push(Box::new(TcpFeed::new(
            format!("{}:{}", config.adsb_host, config.adsb_port),
            BeastIngest::new("ADS-B", reference),
            liveness,
        )));
    }
    if config.mlat_port != 0 {
        let liveness = registry.register("MLAT", MLAT_TIMEOUT_MS);
        sources.push(Box::new(TcpFeed::new(
            format!("{}:{}", config.mlat_host, config.mlat_port),
            BeastIngest::new("MLAT", reference),
            liveness,
        )));
    }
    if config.avr_port != 0 {
        let liveness = registry.register("AVR", AVR_TIMEOUT_MS);
        sources.push(Box::new(TcpFeed::new(
            format!("{}:{}", config.avr_host, config.avr_port),
            AvrIngest::new("AVR", reference),
            liveness,
        )));
    }
    if config.ais_port != 0 {
        let liveness = registry.register("AIS", AIS_TIMEOUT_MS);
        sources.push(Box::new(UdpFeed::new(config.ais_port, liveness)));
    }

    sources
}

/// Spawn one task per source.
pub fn spawn_sources(
    sources: Vec<Box<dyn Source>>,
    table: &Arc<TrackTable>,
    shutdown: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    sources
        .into_iter()
        .map(|source| {
            info!(source = source.name(), "starting source");
            tokio::spawn(run_source(source, Arc::clone(table), shutdown.clone()))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use seasky_core::beast;
    use seasky_core::config::Config;
    use seasky_core::table::TableSettings;
    use seasky_core::types::hex_decode;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_build_sources_respects_disabled_ports() {
        let mut config = Config::default().sources;
        config.mlat_port = 0;
        config.avr_port = 30002;
        let registry = LivenessRegistry::new();
        let sources = build_sources(&config, &registry, None);
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, ["ADS-B", "AVR", "AIS"]);
        assert_eq!(registry.statuses(0).len(), 3);
    }

    #[tokio::test]
    async fn test_tcp_feed_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let payload = hex_decode("8D4840D6202CC371C32CE0576098").unwrap();
        let wire = beast::encode(b'3', [0; 6], 0x20, &payload);

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(&wire).await.unwrap();
            // Connection closes on drop; the framer flushes the last message
        });

        let registry = LivenessRegistry::new();
        let liveness = registry.register("ADS-B", ADSB_TIMEOUT_MS);
        let ingest = BeastIngest::new("ADS-B", None);
        let mut feed = TcpFeed::new(addr.to_string(), ingest, Arc::clone(&liveness));
        let table = TrackTable::new(TableSettings::default());
        let (_tx, mut rx) = watch::channel(false);

        feed.run_session(&table, &mut rx).await.unwrap();
        server.await.unwrap();

        assert!(table.contains("4840d6"));
        assert!(liveness.last_packet().is_some());
        assert!(!liveness.is_online());
    }

    #[tokio::test]
    async fn test_run_source_stops_on_shutdown() {
        let registry = LivenessRegistry::new();
        let liveness = registry.register("ADS-B", ADSB_TIMEOUT_MS);
        // Nothing listens on port 9 locally; every session fails fast
        let feed = TcpFeed::new("127.0.0.1:9".into(), BeastIngest::new("ADS-B", None), liveness);
        let table = Arc::new(TrackTable::new(TableSettings::default()));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(run_source(Box::new(feed), table, rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_tcp_feed_silent_peer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(3)).await;
            drop(sock);
        });

        let registry = LivenessRegistry::new();
        let liveness = registry.register("ADS-B", 100);
        let ingest = BeastIngest::new("ADS-B", None);
        let mut feed = TcpFeed::new(addr.to_string(), ingest, Arc::clone(&liveness));
        let table = TrackTable::new(TableSettings::default());
        let (_tx, mut rx) = watch::channel(false);

        let result = tokio::time::timeout(Duration::from_secs(2), feed.run_session(&table, &mut rx))
            .await
            .expect("session should end on its own");
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::TimedOut);
        assert!(!liveness.is_online());
        server.abort();
    }
}
