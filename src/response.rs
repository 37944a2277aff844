//! HTTP response handling.

use std::io::Read;

use bytes::Bytes;

use crate::error::{Error, Result};

/// HTTP response returned by a transport attempt.
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<String>,
    body: Bytes,
    http_version: String,
}

impl Response {
    pub fn new(status: u16, headers: Vec<String>, body: Bytes, http_version: String) -> Self {
        Self {
            status,
            headers,
            body,
            http_version,
        }
    }

    pub fn http_version(&self) -> &str {
        &self.http_version
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        for header in &self.headers {
            if let Some((key, value)) = header.split_once(':') {
                if key.trim().eq_ignore_ascii_case(name) {
                    return Some(value.trim());
                }
            }
        }
        None
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get_header("Content-Type")
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.get_header("Content-Encoding")
    }

    /// Decode the body based on Content-Encoding. Configuration endpoints
    /// serve either identity or gzip; gzip is also sniffed by magic bytes
    /// when the header is missing.
    pub fn decoded_body(&self) -> Result<Bytes> {
        match self.content_encoding().map(|s| s.to_lowercase()).as_deref() {
            Some("gzip") | Some("x-gzip") => decode_gzip(&self.body),
            _ => {
                if self.body.len() >= 2 && self.body[0] == 0x1f && self.body[1] == 0x8b {
                    return decode_gzip(&self.body);
                }
                Ok(self.body.clone())
            }
        }
    }

    pub fn text(&self) -> Result<String> {
        let decoded = self.decoded_body()?;
        String::from_utf8(decoded.to_vec())
            .map_err(|e| Error::Decompression(format!("UTF-8 decode error: {}", e)))
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let text = self.text()?;
        serde_json::from_str(&text).map_err(Error::from)
    }
}

fn decode_gzip(data: &[u8]) -> Result<Bytes> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| Error::Decompression(format!("gzip: {}", e)))?;
    Ok(Bytes::from(decoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn response_with(headers: Vec<&str>, body: &[u8]) -> Response {
        Response::new(
            200,
            headers.into_iter().map(String::from).collect(),
            Bytes::copy_from_slice(body),
            "HTTP/1.1".to_string(),
        )
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let resp = response_with(vec!["Content-Type: application/json"], b"{}");
        assert_eq!(resp.get_header("content-type"), Some("application/json"));
        assert_eq!(resp.get_header("missing"), None);
    }

    #[test]
    fn identity_body_passes_through() {
        let resp = response_with(vec![], b"plain");
        assert_eq!(&resp.decoded_body().unwrap()[..], b"plain");
    }

    #[test]
    fn gzip_body_is_decoded() {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"config blob").unwrap();
        let compressed = encoder.finish().unwrap();

        let resp = response_with(vec!["Content-Encoding: gzip"], &compressed);
        assert_eq!(&resp.decoded_body().unwrap()[..], b"config blob");

        // Same payload without the header still decodes via magic bytes.
        let resp = response_with(vec![], &compressed);
        assert_eq!(&resp.decoded_body().unwrap()[..], b"config blob");
    }

    #[test]
    fn json_deserializes_decoded_body() {
        let resp = response_with(vec![], br#"{"endpoint":"https://example.com"}"#);
        let value: serde_json::Value = resp.json().unwrap();
        assert_eq!(value["endpoint"], "https://example.com");
    }
}
