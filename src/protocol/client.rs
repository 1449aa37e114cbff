//! TCP client for the Luxtronik socket protocol
//!
//! The controller speaks a strict half-duplex request/response protocol with
//! no transaction IDs: correctness depends on one outstanding request at a
//! time and on the echoed command code matching the request. Any echo
//! mismatch means the channel is desynchronized and cannot be trusted for
//! further reads, so the connection is torn down and reopened.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::codec;
use super::command::Command;
use crate::error::{HeatSrvError, Result};

/// Connection and retry options for the protocol client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub host: String,
    pub port: u16,
    /// Bound on establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Bound on each read step (header, body) and on sending the request.
    pub read_timeout: Duration,
    /// Total attempts per command before surfacing `ProtocolFailure`.
    pub retry_attempts: u32,
    /// Delay between attempts.
    pub retry_backoff: Duration,
}

impl ClientOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Protocol client owning a single, lazily opened TCP connection.
#[derive(Debug)]
pub struct LuxtronikClient {
    options: ClientOptions,
    stream: Option<TcpStream>,
}

impl LuxtronikClient {
    pub fn new(options: ClientOptions) -> Self {
        Self {
            options,
            stream: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Close the connection. Any pending read on it fails terminally, which
    /// is how a poll cycle is abandoned on shutdown.
    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!("disconnected");
        }
    }

    /// Execute one command with the bounded retry policy: transient failures
    /// (connection, echo mismatch, read timeout) close and reopen the
    /// connection and retry after a short backoff; once attempts are
    /// exhausted, `ProtocolFailure` is surfaced and the connection is left
    /// closed. Framing errors and rejected writes are not retried.
    pub async fn execute(&mut self, command: &Command) -> Result<Vec<i32>> {
        let attempts = self.options.retry_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.execute_once(command).await {
                Ok(values) => return Ok(values),
                Err(e) if e.is_transient() => {
                    warn!(
                        attempt,
                        attempts,
                        error = %e,
                        code = command.code(),
                        "command failed, reconnecting"
                    );
                    self.disconnect();
                    last_error = e.to_string();
                    if attempt < attempts {
                        sleep(self.options.retry_backoff).await;
                    }
                },
                Err(e) => {
                    // Framing errors and write rejections leave the stream
                    // position unknown; the channel cannot be reused.
                    self.disconnect();
                    return Err(e);
                },
            }
        }

        Err(HeatSrvError::ProtocolFailure {
            attempts,
            last: last_error,
        })
    }

    /// Single request/response exchange without retry.
    async fn execute_once(&mut self, command: &Command) -> Result<Vec<i32>> {
        self.ensure_connected().await?;
        let read_timeout = self.options.read_timeout;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| HeatSrvError::connection("not connected"))?;

        // Send the request frame.
        let frame = codec::encode(command);
        timeout(read_timeout, stream.write_all(&frame))
            .await
            .map_err(|_| HeatSrvError::connection("request send timed out"))?
            .map_err(|e| HeatSrvError::connection(format!("send failed: {e}")))?;
        debug!(code = command.code(), len = frame.len(), "TX");

        // Read and verify the echoed header.
        let mut header = [0u8; codec::HEADER_LEN];
        timeout(read_timeout, stream.read_exact(&mut header))
            .await
            .map_err(|_| HeatSrvError::ReadTimeout("response header".to_string()))?
            .map_err(|e| HeatSrvError::connection(format!("header read failed: {e}")))?;

        let (echoed, element_count) = codec::decode_header(&header)?;
        if echoed != command.code() {
            return Err(HeatSrvError::EchoMismatch {
                sent: command.code(),
                received: echoed,
            });
        }

        // Read exactly element_count integers under the deadline.
        let mut body = vec![0u8; element_count * 4];
        if element_count > 0 {
            timeout(read_timeout, stream.read_exact(&mut body))
                .await
                .map_err(|_| HeatSrvError::ReadTimeout("response body".to_string()))?
                .map_err(|e| HeatSrvError::connection(format!("body read failed: {e}")))?;
        }
        let values = codec::decode_body(&body, element_count)?;
        debug!(code = echoed, count = element_count, "RX");

        // Writes echo the written (index, value) pair back; a mismatch is a
        // failed write, never silently ignored.
        if let Command::WriteParameter { index, value } = command {
            let acknowledged =
                values.len() >= 2 && values[0] == *index && values[1] == *value;
            if !acknowledged {
                return Err(HeatSrvError::WriteNotAcknowledged {
                    index: *index,
                    value: *value,
                    echoed: format!("{values:?}"),
                });
            }
        }

        Ok(values)
    }

    async fn ensure_connected(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let addr = format!("{}:{}", self.options.host, self.options.port);
        debug!("connecting: {}", addr);
        match timeout(self.options.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("TCP_NODELAY: {}", e);
                }
                info!("connected: {}", addr);
                self.stream = Some(stream);
                Ok(())
            },
            Ok(Err(e)) => Err(HeatSrvError::connection(format!(
                "failed to connect to {addr}: {e}"
            ))),
            Err(_) => Err(HeatSrvError::connection(format!(
                "connection to {addr} timed out"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};
    use tokio::net::TcpListener;

    fn test_options(port: u16) -> ClientOptions {
        ClientOptions {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout: Duration::from_millis(500),
            read_timeout: Duration::from_millis(200),
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(10),
        }
    }

    fn response(code: i32, values: &[i32]) -> BytesMut {
        let mut frame = BytesMut::new();
        frame.put_i32(code);
        frame.put_i32(values.len() as i32);
        for v in values {
            frame.put_i32(*v);
        }
        frame
    }

    async fn bind() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn test_execute_read_happy_path() {
        let (listener, port) = bind().await;
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 8];
            socket.read_exact(&mut request).await.unwrap();
            assert_eq!(&request[..4], &3004i32.to_be_bytes());
            socket
                .write_all(&response(3004, &[455, 400, -53]))
                .await
                .unwrap();
        });

        let mut client = LuxtronikClient::new(test_options(port));
        let values = client.execute(&Command::ReadCalculatedValues).await.unwrap();
        assert_eq!(values, vec![455, 400, -53]);
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_echo_mismatch_exhausts_retries() {
        let (listener, port) = bind().await;
        tokio::spawn(async move {
            // Always answer with the wrong command code, regardless of
            // payload content.
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = [0u8; 8];
                if socket.read_exact(&mut request).await.is_err() {
                    continue;
                }
                let _ = socket.write_all(&response(3003, &[1, 2])).await;
            }
        });

        let mut client = LuxtronikClient::new(test_options(port));
        let result = client.execute(&Command::ReadCalculatedValues).await;
        match result {
            Err(HeatSrvError::ProtocolFailure { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(last.contains("echo mismatch"), "last error: {last}");
            },
            other => panic!("expected ProtocolFailure, got {other:?}"),
        }
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_read_timeouts_surface_protocol_failure_and_close() {
        let (listener, port) = bind().await;
        tokio::spawn(async move {
            // Accept and read the request but never respond.
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = [0u8; 8];
                let _ = socket.read_exact(&mut request).await;
                tokio::time::sleep(Duration::from_secs(5)).await;
                drop(socket);
            }
        });

        let mut client = LuxtronikClient::new(test_options(port));
        let result = client.execute(&Command::ReadParameters).await;
        match result {
            Err(HeatSrvError::ProtocolFailure { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(last.contains("read timeout"), "last error: {last}");
            },
            other => panic!("expected ProtocolFailure, got {other:?}"),
        }
        // Retries exhausted: connection left closed, next call must reconnect.
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_write_acknowledged() {
        let (listener, port) = bind().await;
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 12];
            socket.read_exact(&mut request).await.unwrap();
            let index = i32::from_be_bytes([request[4], request[5], request[6], request[7]]);
            let value = i32::from_be_bytes([request[8], request[9], request[10], request[11]]);
            socket
                .write_all(&response(3002, &[index, value]))
                .await
                .unwrap();
        });

        let mut client = LuxtronikClient::new(test_options(port));
        let result = client
            .execute(&Command::WriteParameter {
                index: 105,
                value: 450,
            })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_write_echo_mismatch_is_failed_write() {
        let (listener, port) = bind().await;
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 12];
            socket.read_exact(&mut request).await.unwrap();
            // Echo a different value than what was written.
            socket.write_all(&response(3002, &[105, 451])).await.unwrap();
        });

        let mut client = LuxtronikClient::new(test_options(port));
        let result = client
            .execute(&Command::WriteParameter {
                index: 105,
                value: 450,
            })
            .await;
        assert!(matches!(
            result,
            Err(HeatSrvError::WriteNotAcknowledged {
                index: 105,
                value: 450,
                ..
            })
        ));
        // The channel is not trusted after a rejected write.
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_unavailable() {
        let (listener, port) = bind().await;
        drop(listener);

        let mut options = test_options(port);
        options.retry_attempts = 1;
        let mut client = LuxtronikClient::new(options);
        let result = client.execute(&Command::ReadParameters).await;
        assert!(matches!(
            result,
            Err(HeatSrvError::ProtocolFailure { attempts: 1, .. })
        ));
    }
}
