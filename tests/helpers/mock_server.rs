#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A simple HTTP/1.1 mock server for single-shot connections.
///
/// Records the raw request text it receives so tests can assert on the
/// request line, headers, and body as they appeared on the wire.
pub struct MockHttpServer {
    listener: TcpListener,
    port: u16,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockHttpServer {
    /// Create a new mock server bound to a random port.
    pub async fn new() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self {
            listener,
            port,
            requests: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Get the base URL for this server.
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Raw request texts received so far.
    pub fn requests(&self) -> Arc<Mutex<Vec<String>>> {
        self.requests.clone()
    }

    /// Serve every incoming connection with a fixed response, one request
    /// per connection.
    pub fn start(self, status: u16, body: &'static str) -> tokio::task::JoinHandle<()> {
        let listener = self.listener;
        let requests = self.requests;
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let requests = requests.clone();
                        tokio::spawn(async move {
                            let _ = handle_connection(stream, status, body, requests).await;
                        });
                    }
                    Err(e) => {
                        tracing::error!("accept error: {}", e);
                        break;
                    }
                }
            }
        })
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    status: u16,
    body: &'static str,
    requests: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    let mut read_buf = vec![0u8; 4096];

    // Read the head, then as much body as Content-Length promises.
    let head_end = loop {
        let n = stream.read(&mut read_buf).await?;
        if n == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&read_buf[..n]);
        if let Some(pos) = find_double_crlf(&buffer) {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..head_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.trim().eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    while buffer.len() < head_end + content_length {
        let n = stream.read(&mut read_buf).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&read_buf[..n]);
    }

    requests
        .lock()
        .unwrap()
        .push(String::from_utf8_lossy(&buffer).to_string());

    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Response",
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

fn find_double_crlf(buffer: &[u8]) -> Option<usize> {
    (0..buffer.len().saturating_sub(3)).find_map(|i| {
        if &buffer[i..i + 4] == b"\r\n\r\n" {
            Some(i + 4)
        } else {
            None
        }
    })
}
