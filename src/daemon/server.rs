//! UNIX socket server for the personality daemon.
//!
//! Everything runs on one `current_thread` tokio runtime. A single control
//! loop owns the personality and `select!`s over shutdown, finished reads and
//! the heartbeat interval, so commands apply strictly one at a time. Each
//! client gets exactly one command and one reply.
//!
//! CHANGELOG:
//! - 10/16/2026 - Moved the loop onto a current_thread tokio runtime
//! - 10/16/2026 - Connection cap and idle timeout
//! - 10/16/2026 - Multiplexed accept/read loop replaces sequential accept
//! - 10/16/2026 - Initial implementation

use anyhow::{Context, Result};
use std::future::Future;
use std::io;
use std::os::unix::net::UnixListener as StdUnixListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::DaemonConfig;
use crate::daemon::protocol::Reply;
use crate::daemon::service::Personality;

/// A payload read from one client, waiting for the control loop.
struct Exchange {
    raw: String,
    reply: oneshot::Sender<Reply>,
}

/// Daemon server listening on a UNIX socket.
pub struct DaemonServer {
    personality: Personality,
    listener: StdUnixListener,
    socket_path: PathBuf,
    heartbeat_interval: Duration,
    max_clients: usize,
    idle_timeout: Duration,
    read_buffer: usize,
}

impl DaemonServer {
    /// Bind the socket and publish the initial state.
    pub fn bind(config: &DaemonConfig, personality: Personality) -> Result<Self> {
        let listener = bind_listener(&config.socket_path)?;
        info!(socket = %config.socket_path.display(), "socket listening");

        let mut personality = personality;
        personality.publish();

        Ok(Self {
            personality,
            listener,
            socket_path: config.socket_path.clone(),
            heartbeat_interval: config.heartbeat_interval,
            max_clients: config.max_clients.max(1),
            idle_timeout: config.client_idle_timeout,
            read_buffer: config.read_buffer.max(1),
        })
    }

    /// Serve until `shutdown` resolves, then remove the socket file.
    ///
    /// Builds its own single-threaded runtime, so call it after any fork.
    pub fn serve(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to build runtime")?;
        runtime.block_on(self.run(shutdown))
    }

    async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let DaemonServer {
            mut personality,
            listener,
            socket_path,
            heartbeat_interval,
            max_clients,
            idle_timeout,
            read_buffer,
        } = self;

        let listener =
            UnixListener::from_std(listener).context("Failed to register listener")?;
        let (tx, mut rx) = mpsc::channel::<Exchange>(max_clients);
        let acceptor = tokio::spawn(accept_loop(
            listener,
            tx,
            Arc::new(Semaphore::new(max_clients)),
            idle_timeout,
            read_buffer,
        ));

        let mut heartbeat = interval(heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                Some(exchange) = rx.recv() => {
                    let reply = personality.dispatch(&exchange.raw);
                    if exchange.reply.send(reply).is_err() {
                        debug!("client went away before its reply");
                    }
                }
                _ = heartbeat.tick() => personality.heartbeat(),
            }
        }

        acceptor.abort();
        drop(rx);
        if let Err(e) = std::fs::remove_file(&socket_path) {
            warn!(error = %e, "cannot remove socket");
        }
        info!("stopped. goodbye.");
        Ok(())
    }
}

/// Accept while under the connection cap; excess clients wait in the backlog.
async fn accept_loop(
    listener: UnixListener,
    tx: mpsc::Sender<Exchange>,
    slots: Arc<Semaphore>,
    idle_timeout: Duration,
    read_buffer: usize,
) {
    loop {
        let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
            return;
        };
        match listener.accept().await {
            Ok((stream, _addr)) => {
                debug!(free_slots = slots.available_permits(), "client connected");
                tokio::spawn(handle_client(
                    stream,
                    tx.clone(),
                    permit,
                    idle_timeout,
                    read_buffer,
                ));
            }
            Err(e) => {
                warn!(error = %e, "accept error");
                drop(permit);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Read one payload, hand it to the control loop, write the reply, close.
async fn handle_client(
    mut stream: UnixStream,
    tx: mpsc::Sender<Exchange>,
    _permit: OwnedSemaphorePermit,
    idle_timeout: Duration,
    read_buffer: usize,
) {
    let mut buf = vec![0u8; read_buffer];
    let n = match timeout(idle_timeout, stream.read(&mut buf)).await {
        Ok(Ok(0)) => {
            debug!("client closed without a command");
            return;
        }
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            warn!(error = %e, "recv error");
            return;
        }
        Err(_) => {
            debug!("closing idle client");
            return;
        }
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    let exchange = Exchange {
        raw: String::from_utf8_lossy(&buf[..n]).into_owned(),
        reply: reply_tx,
    };
    if tx.send(exchange).await.is_err() {
        return;
    }
    let Ok(reply) = reply_rx.await else {
        return;
    };

    match reply.to_line() {
        Ok(line) => {
            if let Err(e) = stream.write_all(line.as_bytes()).await {
                warn!(error = %e, "send error");
            }
        }
        Err(e) => warn!(error = %e, "cannot encode reply"),
    }
    let _ = stream.shutdown().await;
}

/// Remove any stale socket, bind, and open it to every local user.
///
/// The listener is left non-blocking so the runtime can adopt it.
pub fn bind_listener(socket_path: &Path) -> Result<StdUnixListener> {
    match std::fs::remove_file(socket_path) {
        Ok(()) => info!(socket = %socket_path.display(), "removed stale socket"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(error = %e, "unlink old socket failed"),
    }

    let listener = StdUnixListener::bind(socket_path)
        .with_context(|| format!("Failed to bind {}", socket_path.display()))?;

    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o666))
            .with_context(|| format!("Failed to chmod {}", socket_path.display()))?;
    }

    listener
        .set_nonblocking(true)
        .context("Failed to make listener non-blocking")?;
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::state::StateStore;
    use crate::speech::RecordingSpeaker;
    use std::os::unix::net::UnixStream as StdUnixStream;

    fn server(dir: &Path, tweak: impl FnOnce(&mut DaemonConfig)) -> DaemonServer {
        let mut config = DaemonConfig::with_base(dir);
        config.autospeak = false;
        tweak(&mut config);
        let store = StateStore::new(&config.state_path, None);
        let personality =
            Personality::new(store, Box::new(RecordingSpeaker::new()), Duration::ZERO);
        DaemonServer::bind(&config, personality).unwrap()
    }

    #[test]
    fn test_bind_replaces_stale_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kilo.sock");
        std::fs::write(&path, "left over from a crash").unwrap();

        let _listener = bind_listener(&path).unwrap();
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            std::fs::metadata(&path).unwrap().permissions().mode()
        };
        assert_eq!(mode & 0o777, 0o666);
        assert!(StdUnixStream::connect(&path).is_ok());
    }

    #[test]
    fn test_serve_returns_when_shutdown_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path(), |_| {});
        let socket = dir.path().join("kilo.sock");
        assert!(socket.exists());

        server.serve(std::future::ready(())).unwrap();
        assert!(!socket.exists());
    }

    #[test]
    fn test_heartbeat_flushes_on_first_tick() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path(), |config| {
            config.heartbeat_interval = Duration::from_secs(3600);
        });
        let state_path = dir.path().join("state.json");
        std::fs::remove_file(&state_path).unwrap();

        server
            .serve(async { tokio::time::sleep(Duration::from_millis(100)).await })
            .unwrap();
        // The first tick fires immediately; the next is an hour away
        assert!(state_path.exists());
    }
}
