//! Envelope-speaking test client.

#![allow(dead_code)]

use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use rchat_proto::{ClientRequest, Envelope, FrameCodec, Reply};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;

/// A test client speaking the NUL-framed envelope protocol.
pub struct TestClient {
    framed: Framed<TcpStream, FrameCodec>,
}

impl TestClient {
    /// Connect to a replica's client endpoint, retrying briefly so tests
    /// can race the listener coming up.
    pub async fn connect(port: u16) -> anyhow::Result<Self> {
        let addr = format!("127.0.0.1:{port}");
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let stream = loop {
            match TcpStream::connect(&addr).await {
                Ok(stream) => break stream,
                Err(e) if tokio::time::Instant::now() > deadline => {
                    return Err(e).context(format!("connecting to {addr}"));
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        };
        Ok(Self {
            framed: Framed::new(stream, FrameCodec::new()),
        })
    }

    /// Send one request and read its reply.
    pub async fn request(&mut self, req: ClientRequest) -> anyhow::Result<Reply> {
        self.send_envelope(req.to_envelope()).await
    }

    /// Send a raw envelope (for version/vocabulary edge cases) and read the
    /// reply.
    pub async fn send_envelope(&mut self, envelope: Envelope) -> anyhow::Result<Reply> {
        self.framed.send(envelope).await?;
        self.recv().await
    }

    /// Write raw bytes straight through the socket (for malformed-frame
    /// cases) and read the reply.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> anyhow::Result<Reply> {
        self.framed.get_mut().write_all(bytes).await?;
        self.framed.get_mut().flush().await?;
        self.recv().await
    }

    async fn recv(&mut self) -> anyhow::Result<Reply> {
        let frame = timeout(Duration::from_secs(10), self.framed.next())
            .await
            .context("timed out waiting for reply")?
            .context("connection closed")??;
        let envelope = Envelope::parse(&frame)?;
        Ok(Reply::from_envelope(&envelope)?)
    }

    // Convenience wrappers for the common account operations.

    pub async fn create(&mut self, username: &str, password: &str) -> anyhow::Result<Reply> {
        self.request(ClientRequest::Create {
            username: username.into(),
            password: password.into(),
        })
        .await
    }

    pub async fn login(&mut self, username: &str, password: &str) -> anyhow::Result<Reply> {
        self.request(ClientRequest::Login {
            username: username.into(),
            password: password.into(),
        })
        .await
    }

    pub async fn logout(&mut self, username: &str) -> anyhow::Result<Reply> {
        self.request(ClientRequest::Logout {
            username: username.into(),
        })
        .await
    }

    pub async fn send_msg(&mut self, from: &str, to: &str, body: &str) -> anyhow::Result<Reply> {
        self.request(ClientRequest::SendMsg {
            sender: from.into(),
            recipient: to.into(),
            message: body.into(),
        })
        .await
    }
}
