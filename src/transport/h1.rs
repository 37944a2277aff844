//! Single-shot HTTP/1.1 exchange over a connected stream.
//!
//! Uses httparse for response parsing and raw I/O for request formatting.
//! Each connection carries exactly one request: the race engine retries on
//! a fresh connection from another transport rather than reusing this one,
//! so every request is sent with `Connection: close`.

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::request::{Body, Request};
use crate::response::Response;
use crate::transport::connector::MaybeTlsStream;

/// Maximum response header size (64KB).
const MAX_HEADERS_SIZE: usize = 64 * 1024;

/// Maximum number of headers to parse.
const MAX_HEADERS_COUNT: usize = 100;

/// HTTP/1.1 connection for sending one request.
pub struct H1Connection {
    stream: MaybeTlsStream,
}

impl H1Connection {
    /// Create a connection from an established stream.
    pub fn new(stream: MaybeTlsStream) -> Self {
        Self { stream }
    }

    /// Send the request and read the response. Consumes the connection.
    pub async fn send_request(mut self, req: Request) -> Result<Response> {
        let head = build_request(&req)?;
        self.stream
            .write_all(&head)
            .await
            .map_err(|e| Error::http_protocol(format!("failed to write request: {}", e)))?;

        if let Body::Bytes(body) = &req.body {
            self.stream
                .write_all(body)
                .await
                .map_err(|e| Error::http_protocol(format!("failed to write body: {}", e)))?;
        }

        self.stream
            .flush()
            .await
            .map_err(|e| Error::http_protocol(format!("failed to flush: {}", e)))?;

        self.read_response(&req).await
    }

    /// Read and parse the response. 1xx informational responses are
    /// consumed until a final response arrives.
    async fn read_response(&mut self, req: &Request) -> Result<Response> {
        let mut buffer = Vec::with_capacity(8 * 1024);

        loop {
            while find_header_end(&buffer).is_none() {
                if buffer.len() >= MAX_HEADERS_SIZE {
                    return Err(Error::http_protocol("response headers too large"));
                }
                let mut read_buf = vec![0u8; 8192];
                let n = self
                    .stream
                    .read(&mut read_buf)
                    .await
                    .map_err(|e| Error::http_protocol(format!("failed to read response: {}", e)))?;
                if n == 0 {
                    return Err(Error::http_protocol(
                        "connection closed before response complete",
                    ));
                }
                buffer.extend_from_slice(&read_buf[..n]);
            }

            let (response, consumed) = self.parse_response(&buffer, req).await?;
            buffer = buffer[consumed..].to_vec();

            if (100..200).contains(&response.status) {
                continue;
            }
            return Ok(response);
        }
    }

    /// Parse headers and body, returning the response and bytes consumed
    /// from the buffer.
    async fn parse_response(&mut self, buffer: &[u8], req: &Request) -> Result<(Response, usize)> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS_COUNT];
        let mut response = httparse::Response::new(&mut headers);

        let headers_len = match response
            .parse(buffer)
            .map_err(|e| Error::http_protocol(format!("failed to parse response: {}", e)))?
        {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => {
                return Err(Error::http_protocol("incomplete response headers"));
            }
        };

        let status = response
            .code
            .ok_or_else(|| Error::http_protocol("missing status code"))?;
        let version = format!("HTTP/1.{}", response.version.unwrap_or(1));

        let response_headers: Vec<String> = response
            .headers
            .iter()
            .filter(|h| !h.name.is_empty())
            .map(|h| format!("{}: {}", h.name, String::from_utf8_lossy(h.value)))
            .collect();

        // HEAD responses and 1xx/204/304 have no body.
        let has_body =
            !matches!(status, 100..=199 | 204 | 304) && req.method != http::Method::HEAD;
        if !has_body {
            let resp = Response::new(status, response_headers, Bytes::new(), version);
            return Ok((resp, headers_len));
        }

        let transfer_encoding = find_header_value(&response_headers, "transfer-encoding");
        let is_chunked = transfer_encoding
            .map(|v| {
                v.split(',')
                    .next_back()
                    .map(|s| s.trim().eq_ignore_ascii_case("chunked"))
                    .unwrap_or(false)
            })
            .unwrap_or(false);

        // Transfer-Encoding overrides Content-Length.
        let content_length = if transfer_encoding.is_some() {
            None
        } else {
            find_header_value(&response_headers, "content-length")
                .map(parse_content_length)
                .transpose()?
        };

        let body_start = &buffer[headers_len..];
        let (body, consumed) = if is_chunked {
            let body = self.read_chunked_body(body_start.to_vec()).await?;
            (body, buffer.len())
        } else if let Some(len) = content_length {
            let body = self.read_fixed_body(body_start, len).await?;
            (body, headers_len + body_start.len().min(len))
        } else {
            let body = self.read_until_close(body_start).await?;
            (body, buffer.len())
        };

        let resp = Response::new(status, response_headers, body, version);
        Ok((resp, consumed))
    }

    async fn read_until_close(&mut self, initial: &[u8]) -> Result<Bytes> {
        let mut body = initial.to_vec();
        let mut read_buf = vec![0u8; 8192];
        loop {
            let n = self.stream.read(&mut read_buf).await.map_err(|e| {
                Error::http_protocol(format!("failed to read close-delimited body: {}", e))
            })?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&read_buf[..n]);
        }
        Ok(Bytes::from(body))
    }

    async fn read_fixed_body(&mut self, initial: &[u8], content_length: usize) -> Result<Bytes> {
        let initial_len = initial.len().min(content_length);
        let mut body = Vec::with_capacity(content_length);
        body.extend_from_slice(&initial[..initial_len]);

        while body.len() < content_length {
            let remaining = content_length - body.len();
            let mut chunk = vec![0u8; remaining.min(8192)];
            let n = self
                .stream
                .read(&mut chunk)
                .await
                .map_err(|e| Error::http_protocol(format!("failed to read body: {}", e)))?;
            if n == 0 {
                return Err(Error::http_protocol(format!(
                    "connection closed before receiving full body (got {} of {} bytes)",
                    body.len(),
                    content_length
                )));
            }
            body.extend_from_slice(&chunk[..n]);
        }

        Ok(Bytes::from(body))
    }

    async fn read_chunked_body(&mut self, initial: Vec<u8>) -> Result<Bytes> {
        let mut body = Vec::new();
        let mut buffer = initial;
        let mut read_buf = vec![0u8; 8192];

        loop {
            let (chunk_size, line_end) = loop {
                if let Some((size, end)) = find_chunk_size(&buffer) {
                    break (size, end);
                }
                let n = self
                    .stream
                    .read(&mut read_buf)
                    .await
                    .map_err(|e| Error::http_protocol(format!("failed to read chunk size: {}", e)))?;
                if n == 0 {
                    return Err(Error::http_protocol(
                        "connection closed while reading chunk size",
                    ));
                }
                buffer.extend_from_slice(&read_buf[..n]);
            };

            buffer = buffer[line_end..].to_vec();

            if chunk_size == 0 {
                // Trailer section is skipped; the connection closes after
                // this response anyway.
                return Ok(Bytes::from(body));
            }

            let chunk_end = chunk_size + 2; // data + \r\n
            while buffer.len() < chunk_end {
                let n = self
                    .stream
                    .read(&mut read_buf)
                    .await
                    .map_err(|e| Error::http_protocol(format!("failed to read chunk data: {}", e)))?;
                if n == 0 {
                    return Err(Error::http_protocol(
                        "connection closed while reading chunk data",
                    ));
                }
                buffer.extend_from_slice(&read_buf[..n]);
            }

            body.extend_from_slice(&buffer[..chunk_size]);
            buffer = buffer[chunk_end..].to_vec();
        }
    }
}

/// Serialise the request head (request line + headers).
fn build_request(req: &Request) -> Result<Vec<u8>> {
    for (name, value) in &req.headers {
        validate_header_name(name)?;
        validate_header_value(value)?;
    }

    let mut head = Vec::with_capacity(1024);

    head.extend_from_slice(req.method.as_str().as_bytes());
    head.push(b' ');
    let path = req
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    head.extend_from_slice(path.as_bytes());
    head.extend_from_slice(b" HTTP/1.1\r\n");

    head.extend_from_slice(b"Host: ");
    if let Some(host) = req.uri.host() {
        head.extend_from_slice(host.as_bytes());
        if let Some(port) = req.uri.port() {
            head.push(b':');
            head.extend_from_slice(port.as_str().as_bytes());
        }
    }
    head.extend_from_slice(b"\r\n");

    for (name, value) in &req.headers {
        if name.eq_ignore_ascii_case("host") || name.eq_ignore_ascii_case("connection") {
            continue;
        }
        head.extend_from_slice(name.as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }

    head.extend_from_slice(b"Connection: close\r\n");

    if let Body::Bytes(body) = &req.body {
        let has_content_length = req
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-length"));
        if !has_content_length {
            head.extend_from_slice(b"Content-Length: ");
            head.extend_from_slice(body.len().to_string().as_bytes());
            head.extend_from_slice(b"\r\n");
        }
    }

    head.extend_from_slice(b"\r\n");
    Ok(head)
}

/// Find the end of HTTP headers (\r\n\r\n).
fn find_header_end(buffer: &[u8]) -> Option<usize> {
    (0..buffer.len().saturating_sub(3)).find_map(|i| {
        if &buffer[i..i + 4] == b"\r\n\r\n" {
            Some(i + 4)
        } else {
            None
        }
    })
}

/// Find a header value by name (case-insensitive).
fn find_header_value<'a>(headers: &'a [String], name: &str) -> Option<&'a str> {
    for header in headers {
        if let Some((hname, hvalue)) = header.split_once(": ") {
            if hname.eq_ignore_ascii_case(name) {
                return Some(hvalue);
            }
        }
    }
    None
}

/// Parse a chunk size line, returning (size, end_of_line_position).
fn find_chunk_size(buffer: &[u8]) -> Option<(usize, usize)> {
    for i in 0..buffer.len().saturating_sub(1) {
        if &buffer[i..i + 2] == b"\r\n" {
            let line = String::from_utf8_lossy(&buffer[..i]);
            let size_part = line.split(';').next()?;
            let size = usize::from_str_radix(size_part.trim(), 16).ok()?;
            return Some((size, i + 2));
        }
    }
    None
}

/// Header names must be tokens per RFC 9110.
fn validate_header_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::http_protocol("empty header name"));
    }
    for b in name.bytes() {
        if !is_tchar(b) {
            return Err(Error::http_protocol(format!(
                "invalid character in header name: {:?}",
                name
            )));
        }
    }
    Ok(())
}

fn is_tchar(b: u8) -> bool {
    matches!(b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' |
        b'^' | b'_' | b'`' | b'|' | b'~' | b'0'..=b'9' | b'A'..=b'Z' | b'a'..=b'z'
    )
}

/// Header values must not contain NUL, CR, or LF.
fn validate_header_value(value: &str) -> Result<()> {
    for b in value.bytes() {
        if b == 0 || b == b'\r' || b == b'\n' {
            return Err(Error::http_protocol(
                "invalid character in header value (CR/LF/NUL not allowed)",
            ));
        }
    }
    Ok(())
}

/// Content-Length must be a non-negative integer; multiple values must all
/// be identical.
fn parse_content_length(value: &str) -> Result<usize> {
    let mut parts = value.split(',').map(|s| s.trim());
    let first = parts
        .next()
        .unwrap_or("")
        .parse::<usize>()
        .map_err(|_| Error::http_protocol(format!("invalid Content-Length: {}", value)))?;
    for part in parts {
        let val = part
            .parse::<usize>()
            .map_err(|_| Error::http_protocol(format!("invalid Content-Length: {}", value)))?;
        if val != first {
            return Err(Error::http_protocol(format!(
                "conflicting Content-Length values: {}",
                value
            )));
        }
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn request(method: Method, uri: &str) -> Request {
        Request::new(method, uri.parse().unwrap())
    }

    #[test]
    fn build_request_basic_get() {
        let mut req = request(Method::GET, "http://example.com/path?q=1");
        req.headers.push(("Accept".into(), "text/plain".into()));
        let head = build_request(&req).unwrap();
        let text = String::from_utf8(head).unwrap();
        assert!(text.starts_with("GET /path?q=1 HTTP/1.1\r\n"));
        assert!(text.contains("Host: example.com\r\n"));
        assert!(text.contains("Accept: text/plain\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn build_request_adds_content_length_for_buffered_body() {
        let mut req = request(Method::POST, "http://example.com/submit");
        req.body = Body::from("hello");
        let text = String::from_utf8(build_request(&req).unwrap()).unwrap();
        assert!(text.contains("Content-Length: 5\r\n"));
    }

    #[test]
    fn build_request_keeps_explicit_port_in_host() {
        let req = request(Method::GET, "http://example.com:8443/");
        let text = String::from_utf8(build_request(&req).unwrap()).unwrap();
        assert!(text.contains("Host: example.com:8443\r\n"));
    }

    #[test]
    fn build_request_rejects_header_injection() {
        let mut req = request(Method::GET, "http://example.com/");
        req.headers
            .push(("X-App".into(), "value\r\nEvil: injected".into()));
        assert!(build_request(&req).is_err());
    }

    #[test]
    fn header_end_detection() {
        let data = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
        assert_eq!(find_header_end(data), Some(38));
        assert_eq!(find_header_end(b"HTTP/1.1 200 OK\r\n"), None);
    }

    #[test]
    fn chunk_size_parsing() {
        assert_eq!(find_chunk_size(b"5\r\nhello"), Some((5, 3)));
        assert_eq!(find_chunk_size(b"a\r\n0123456789"), Some((10, 3)));
        assert_eq!(find_chunk_size(b"0\r\n"), Some((0, 3)));
        assert_eq!(find_chunk_size(b"5;ext=val\r\ndata"), Some((5, 11)));
        assert_eq!(find_chunk_size(b"XYZ\r\n"), None);
        assert_eq!(find_chunk_size(b"10"), None);
    }

    #[test]
    fn content_length_validation() {
        assert_eq!(parse_content_length("0").unwrap(), 0);
        assert_eq!(parse_content_length("100, 100").unwrap(), 100);
        assert!(parse_content_length("100, 200").is_err());
        assert!(parse_content_length("abc").is_err());
        assert!(parse_content_length("-1").is_err());
    }

    #[test]
    fn header_name_and_value_validation() {
        assert!(validate_header_name("X-Kindling-App").is_ok());
        assert!(validate_header_name("").is_err());
        assert!(validate_header_name("Bad Name").is_err());
        assert!(validate_header_value("plain value").is_ok());
        assert!(validate_header_value("bad\r\nvalue").is_err());
        assert!(validate_header_value("bad\x00value").is_err());
    }
}
