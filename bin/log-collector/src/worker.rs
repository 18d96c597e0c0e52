//! Per-socket syslog worker
//!
//! Each worker owns one unix datagram socket named by a serve record and
//! forwards every datagram to logplex under that record's token.

use crate::metrics::CollectorMetrics;
use anyhow::{Context, Result};
use chrono::Utc;
use logplex::{LogplexClient, LogplexConfig};
use serve_db::{RoutingTable, ServeKey, ServeRecord};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixDatagram;
use tokio::sync::oneshot;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

const KB: usize = 1024;
const DATAGRAM_BUFFER: usize = 9 * KB;

/// syslog local0.info
const PRIORITY: u8 = 134;
const PROCID: &str = "audit";
const MSGID: &str = "-";

/// Settings shared by every worker
pub struct WorkerSettings {
    pub http: reqwest::Client,
    pub logplex_url: String,
    pub hostname: String,
    pub max_batch: usize,
    pub flush_interval: Duration,
    pub metrics: Arc<CollectorMetrics>,
}

impl WorkerSettings {
    fn logplex_config(&self, record: &ServeRecord) -> LogplexConfig {
        LogplexConfig {
            url: self.logplex_url.clone(),
            token: record.token().to_string(),
            host: self.hostname.clone(),
            max_batch: self.max_batch,
            ..LogplexConfig::default()
        }
    }
}

/// Serve one socket until `stop` fires or its sender is dropped.
///
/// The record is resolved once; later reloads do not affect a running
/// session. Returns early if the key is no longer routed.
pub async fn run(
    key: ServeKey,
    table: Arc<RoutingTable>,
    settings: Arc<WorkerSettings>,
    mut stop: oneshot::Receiver<()>,
) -> Result<()> {
    let record = match table.lookup(&key) {
        Some(record) => record,
        None => {
            debug!(
                identity = %key.identity,
                path = %key.path,
                "Serve record gone before worker start"
            );
            return Ok(());
        }
    };

    let path = Path::new(record.path());
    let socket = bind_world_writable(path)?;
    info!(identity = %record.identity(), path = %record.path(), "Syslog worker started");

    let mut client = LogplexClient::new(settings.http.clone(), settings.logplex_config(&record));
    let prefix = format!("instance_type=shogun identity={} ", record.identity());
    let mut buf = vec![0u8; DATAGRAM_BUFFER];
    let mut body = Vec::with_capacity(prefix.len() + DATAGRAM_BUFFER);

    let mut ticker = time::interval(settings.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => flush(&mut client, &settings.metrics).await,
            received = socket.recv(&mut buf) => {
                match received {
                    Ok(0) => {}
                    Ok(n) => {
                        settings.metrics.datagrams_total.inc();
                        body.clear();
                        body.extend_from_slice(prefix.as_bytes());
                        body.extend_from_slice(&buf[..n]);
                        if client.buffer_message(PRIORITY, Utc::now(), PROCID, MSGID, &body) {
                            flush(&mut client, &settings.metrics).await;
                        }
                    }
                    Err(e) if is_transient(&e) => continue,
                    Err(e) => {
                        return Err(e).with_context(|| {
                            format!("syslog datagram error on {}", record.path())
                        });
                    }
                }
            }
        }
    }

    flush(&mut client, &settings.metrics).await;
    info!(identity = %record.identity(), path = %record.path(), "Syslog worker stopped");
    Ok(())
}

/// Bind a datagram socket at `path`, replacing a stale one, and let anyone
/// write to it. The database server usually runs as a different user.
fn bind_world_writable(path: &Path) -> Result<UnixDatagram> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => {
            return Err(e)
                .with_context(|| format!("cannot remove stale socket {}", path.display()));
        }
        _ => {}
    }

    let socket = UnixDatagram::bind(path)
        .with_context(|| format!("cannot bind syslog socket {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path)
            .with_context(|| format!("cannot stat just created socket {}", path.display()))?;
        let mode = metadata.permissions().mode() | 0o222;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .with_context(|| format!("cannot make socket {} world-writable", path.display()))?;
    }

    Ok(socket)
}

async fn flush(client: &mut LogplexClient, metrics: &CollectorMetrics) {
    if let Err(e) = client.flush().await {
        metrics.flush_errors_total.inc();
        warn!(error = %e, "Dropped logplex batch");
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serve_db::ServeTable;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const NO_CONTENT: &[u8] =
        b"HTTP/1.1 204 No Content\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";

    /// Answer every request with 204 and count the requests
    async fn counting_drain() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let posts = Arc::new(AtomicUsize::new(0));
        let counter = posts.clone();

        tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                let counter = counter.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut chunk = [0u8; 4096];
                    loop {
                        let n = match stream.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => n,
                        };
                        request.extend_from_slice(&chunk[..n]);
                        let text = String::from_utf8_lossy(&request);
                        if let Some(end) = text.find("\r\n\r\n") {
                            let length = text[..end]
                                .lines()
                                .find_map(|line| {
                                    let (name, value) = line.split_once(':')?;
                                    name.eq_ignore_ascii_case("content-length")
                                        .then(|| value.trim().parse::<usize>().ok())
                                        .flatten()
                                })
                                .unwrap_or(0);
                            if request.len() >= end + 4 + length {
                                break;
                            }
                        }
                    }
                    counter.fetch_add(1, Ordering::SeqCst);
                    let _ = stream.write_all(NO_CONTENT).await;
                });
            }
        });

        (format!("http://{}/logs", addr), posts)
    }

    fn settings() -> Arc<WorkerSettings> {
        Arc::new(WorkerSettings {
            http: reqwest::Client::new(),
            // Nothing listens here; flushes fail and are counted.
            logplex_url: "http://127.0.0.1:1/logs".to_string(),
            hostname: "test".to_string(),
            max_batch: 100,
            flush_interval: Duration::from_millis(50),
            metrics: Arc::new(CollectorMetrics::new().unwrap()),
        })
    }

    fn table_with(record: ServeRecord) -> Arc<RoutingTable> {
        let mut serves = ServeTable::new();
        serves.insert(record);
        let table = Arc::new(RoutingTable::new());
        table.install(serves);
        table
    }

    #[tokio::test]
    async fn test_unrouted_key_exits_immediately() {
        let (_stop_tx, stop_rx) = oneshot::channel();
        let key = ServeKey::new("ghost", "/nonexistent/log.sock");

        run(key, Arc::new(RoutingTable::new()), settings(), stop_rx)
            .await
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_worker_receives_and_stops() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.sock");
        let path_str = path.to_str().unwrap().to_string();
        // A stale file at the socket path is replaced.
        fs::write(&path, b"stale").unwrap();

        let table = table_with(ServeRecord::new("apple", path_str.clone(), "chocolate"));
        let settings = settings();
        let (stop_tx, stop_rx) = oneshot::channel();
        let worker = tokio::spawn(run(
            ServeKey::new("apple", path_str),
            table,
            settings.clone(),
            stop_rx,
        ));

        let sender = UnixDatagram::unbound().unwrap();
        let mut sent = false;
        for _ in 0..100 {
            if sender.send_to(b"LOG: hello", &path).await.is_ok() {
                sent = true;
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        assert!(sent, "socket never became available");

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o222, 0o222);

        for _ in 0..100 {
            if settings.metrics.datagrams_total.get() == 1 {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(settings.metrics.datagrams_total.get(), 1);

        stop_tx.send(()).unwrap();
        worker.await.unwrap().unwrap();
        assert!(settings.metrics.flush_errors_total.get() >= 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_flushes_on_tick_under_steady_traffic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("busy.sock");
        let path_str = path.to_str().unwrap().to_string();
        let (url, posts) = counting_drain().await;

        let settings = Arc::new(WorkerSettings {
            http: reqwest::Client::new(),
            logplex_url: url,
            hostname: "test".to_string(),
            max_batch: 1_000,
            flush_interval: Duration::from_millis(100),
            metrics: Arc::new(CollectorMetrics::new().unwrap()),
        });
        let table = table_with(ServeRecord::new("apple", path_str.clone(), "chocolate"));
        let (stop_tx, stop_rx) = oneshot::channel();
        let worker = tokio::spawn(run(
            ServeKey::new("apple", path_str),
            table,
            settings.clone(),
            stop_rx,
        ));

        // Lines arrive more often than the flush tick, so the socket is
        // never idle for a whole tick.
        let sender = UnixDatagram::unbound().unwrap();
        for _ in 0..30 {
            let _ = sender.send_to(b"LOG: steady", &path).await;
            time::sleep(Duration::from_millis(30)).await;
        }

        assert!(settings.metrics.datagrams_total.get() > 0);
        assert!(
            posts.load(Ordering::SeqCst) >= 1,
            "buffered lines were not posted while traffic kept arriving"
        );

        stop_tx.send(()).unwrap();
        worker.await.unwrap().unwrap();
        assert_eq!(settings.metrics.flush_errors_total.get(), 0);
    }
}
