//! Scripted server side of a test connection.

use anyhow::{anyhow, bail};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::time::timeout;

/// The server end of a [`MockConnector`](super::MockConnector) pipe.
pub struct TestServer {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl TestServer {
    pub fn new(stream: DuplexStream) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Send one line to the client, CRLF terminated.
    pub async fn send_raw(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Receive one line from the client, without its terminator.
    pub async fn recv(&mut self) -> anyhow::Result<String> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<String> {
        let mut line = String::new();
        let read = timeout(dur, self.reader.read_line(&mut line)).await??;
        if read == 0 {
            bail!("client closed the connection");
        }
        if !line.ends_with('\n') {
            return Err(anyhow!("unterminated line {:?}", line));
        }
        Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string())
    }

    /// Receive lines until `predicate` matches; returns all of them.
    #[allow(dead_code)]
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<Vec<String>>
    where
        F: FnMut(&str) -> bool,
    {
        let mut lines = Vec::new();
        loop {
            let line = self.recv().await?;
            let done = predicate(&line);
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }

    /// Read the client's registration and welcome it.
    #[allow(dead_code)]
    pub async fn accept_registration(&mut self, nick: &str) -> anyhow::Result<()> {
        let nick_line = self.recv().await?;
        if nick_line != format!("NICK {}", nick) {
            bail!("expected NICK {}, got {:?}", nick, nick_line);
        }
        let user_line = self.recv().await?;
        if !user_line.starts_with("USER ") {
            bail!("expected USER, got {:?}", user_line);
        }
        self.send_raw(&format!(":irc.test 001 {} :Welcome to the test network", nick))
            .await
    }

    /// Round-trip a PING so everything sent before it has been dispatched.
    #[allow(dead_code)]
    pub async fn sync(&mut self) -> anyhow::Result<()> {
        self.send_raw("PING :sync").await?;
        self.recv_until(|line| line == "PONG :sync").await?;
        Ok(())
    }

    /// Whether the client has closed its side (EOF within `dur`).
    #[allow(dead_code)]
    pub async fn closed_within(&mut self, dur: Duration) -> bool {
        let mut line = String::new();
        matches!(timeout(dur, self.reader.read_line(&mut line)).await, Ok(Ok(0)))
    }
}
