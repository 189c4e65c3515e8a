//! UNIX socket client for the personality daemon.
//!
//! CHANGELOG:
//! - 10/16/2026 - Initial implementation

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use crate::daemon::protocol::Reply;
use thiserror::Error;

/// Errors that can occur when talking to the daemon.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Socket not found: {0}")]
    SocketNotFound(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    ParseError(#[source] serde_json::Error),

    #[error("Empty response from daemon")]
    EmptyResponse,

    #[error("Timeout waiting for response")]
    Timeout,
}

/// A client for the personality daemon. One command per connection.
pub struct DaemonClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl DaemonClient {
    /// Create a new client with the given socket path and timeout.
    pub fn new(socket_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout,
        }
    }

    /// Send one command line and wait for the reply.
    pub fn send(&self, command: &str) -> Result<Reply, ClientError> {
        if !self.socket_path.exists() {
            return Err(ClientError::SocketNotFound(
                self.socket_path.display().to_string(),
            ));
        }

        let stream = UnixStream::connect(&self.socket_path)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        // One write, so the daemon sees the whole line in a single read
        let mut writer = &stream;
        writer.write_all(format!("{}\n", command.trim()).as_bytes())?;
        writer.flush()?;

        let mut reader = BufReader::new(&stream);
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).map_err(|e| match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => ClientError::Timeout,
            _ => ClientError::ConnectionFailed(e),
        })?;

        if bytes_read == 0 {
            return Err(ClientError::EmptyResponse);
        }

        serde_json::from_str(line.trim()).map_err(ClientError::ParseError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::unix::net::UnixListener;
    use std::thread;

    #[test]
    fn test_missing_socket() {
        let client = DaemonClient::new("/definitely/not/here.sock", Duration::from_secs(1));
        assert!(matches!(client.send("status"), Err(ClientError::SocketNotFound(_))));
    }

    #[test]
    fn test_round_trip_against_fake_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kilo.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 64];
            let n = stream.read(&mut buf).unwrap();
            stream
                .write_all(b"{\"ok\":true,\"msg\":\"Scanning.\"}\n")
                .unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });

        let client = DaemonClient::new(&path, Duration::from_secs(2));
        let reply = client.send("  scan  ").unwrap();
        assert_eq!(reply, Reply::success("Scanning."));
        assert_eq!(server.join().unwrap(), "scan\n");
    }

    #[test]
    fn test_closed_without_reply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kilo.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 64];
            let _ = stream.read(&mut buf);
        });

        let client = DaemonClient::new(&path, Duration::from_secs(2));
        assert!(matches!(client.send("status"), Err(ClientError::EmptyResponse)));
        server.join().unwrap();
    }
}
