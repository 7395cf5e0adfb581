use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::sink::{AgentChannel, DeliveryError};

/// Port the local forwarding agent listens on by default.
pub const DEFAULT_AGENT_PORT: u16 = 24224;

/// Client for a local forwarding agent speaking the forward protocol's
/// JSON message mode: one newline-terminated `[tag, time, record]`
/// array per event.
///
/// Connects lazily on the first post and keeps the connection for
/// subsequent ones; a failed write is retried once on a fresh
/// connection. Buffering and upstream delivery belong to the agent.
pub struct ForwardClient {
    addr: SocketAddr,
    connection: Mutex<Option<TcpStream>>,
}

impl ForwardClient {
    pub fn new(addr: SocketAddr) -> ForwardClient {
        ForwardClient {
            addr,
            connection: Mutex::new(None),
        }
    }

    /// Client for the agent on its default local address.
    pub fn localhost() -> ForwardClient {
        ForwardClient::new(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::LOCALHOST,
            DEFAULT_AGENT_PORT,
        )))
    }
}

#[async_trait]
impl AgentChannel for ForwardClient {
    async fn post(&self, channel: &str, record: &serde_json::Value) -> Result<(), DeliveryError> {
        let frame = frame(channel, Utc::now().timestamp(), record)?;

        let mut connection = self.connection.lock().await;
        if let Some(stream) = connection.as_mut() {
            if write_frame(stream, &frame).await.is_ok() {
                return Ok(());
            }
            // stale connection; reconnect and retry once
            *connection = None;
        }

        let mut stream =
            TcpStream::connect(self.addr)
                .await
                .map_err(|source| DeliveryError::Io {
                    context: "connecting to the forwarding agent",
                    source,
                })?;
        write_frame(&mut stream, &frame)
            .await
            .map_err(|source| DeliveryError::Io {
                context: "writing to the forwarding agent",
                source,
            })?;
        *connection = Some(stream);
        Ok(())
    }
}

fn frame(tag: &str, timestamp: i64, record: &serde_json::Value) -> Result<Vec<u8>, DeliveryError> {
    let mut frame = serde_json::to_vec(&serde_json::json!([tag, timestamp, record])).map_err(
        |source| DeliveryError::Serialize {
            context: "forward frame",
            source,
        },
    )?;
    frame.push(b'\n');
    Ok(frame)
}

async fn write_frame(stream: &mut TcpStream, frame: &[u8]) -> std::io::Result<()> {
    stream.write_all(frame).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    #[test]
    fn frames_are_newline_terminated_arrays() {
        let frame = frame("app", 1234, &json!({"severity": "INFO"})).unwrap();

        assert_eq!(
            String::from_utf8(frame).unwrap(),
            "[\"app\",1234,{\"severity\":\"INFO\"}]\n"
        );
    }

    #[tokio::test]
    async fn posts_reuse_one_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(stream).lines();
            let first = lines.next_line().await.unwrap().unwrap();
            let second = lines.next_line().await.unwrap().unwrap();
            (first, second)
        });

        let client = ForwardClient::new(addr);
        client.post("app", &json!({"message": "one"})).await.unwrap();
        client
            .post("app_errors", &json!({"message": "two"}))
            .await
            .unwrap();

        let (first, second) = server.await.unwrap();
        let first: serde_json::Value = serde_json::from_str(&first).unwrap();
        assert_eq!(first[0], "app");
        assert_eq!(first[2]["message"], "one");
        let second: serde_json::Value = serde_json::from_str(&second).unwrap();
        assert_eq!(second[0], "app_errors");
        assert_eq!(second[2]["message"], "two");
    }

    #[tokio::test]
    async fn unreachable_agent_surfaces_an_io_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ForwardClient::new(addr);
        let error = client.post("app", &json!({})).await.unwrap_err();

        assert!(matches!(error, DeliveryError::Io { .. }));
    }
}
