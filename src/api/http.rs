//! Minimal HTTP/1.1 framing over a blocking `TcpStream`.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::time::Duration;

use anyhow::{anyhow, Result};

const MAX_HEADER_BYTES: usize = 8192;
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Returned (inside `anyhow::Error`) when a body exceeds the configured cap.
#[derive(Debug)]
pub struct PayloadTooLarge {
    pub limit: usize,
}

impl std::fmt::Display for PayloadTooLarge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "request body exceeds {} bytes", self.limit)
    }
}

impl std::error::Error for PayloadTooLarge {}

#[derive(Debug)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn content_length(&self) -> Result<usize> {
        match self.header("content-length") {
            Some(value) => value
                .parse()
                .map_err(|_| anyhow!("invalid content-length '{}'", value)),
            None => Ok(0),
        }
    }
}

/// Read the request head and a `Content-Length` body of at most `max_body`
/// bytes. Chunked uploads are not supported.
pub fn read_request<S: Read + Write>(stream: &mut S, max_body: usize) -> Result<HttpRequest> {
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let head_end = loop {
        if let Some(pos) = find_header_end(&data) {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request header too large"));
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before request header"));
        }
        data.extend_from_slice(&buf[..n]);
    };

    let mut request = parse_head(&data[..head_end])?;
    let length = request.content_length()?;
    if length > max_body {
        return Err(PayloadTooLarge { limit: max_body }.into());
    }
    if request
        .header("expect")
        .is_some_and(|v| v.eq_ignore_ascii_case("100-continue"))
    {
        stream.write_all(b"HTTP/1.1 100 Continue\r\n\r\n")?;
    }

    let mut body = data.split_off(head_end + 4);
    body.truncate(length);
    while body.len() < length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!(
                "connection closed after {} of {} body bytes",
                body.len(),
                length
            ));
        }
        let take = n.min(length - body.len());
        body.extend_from_slice(&buf[..take]);
    }
    request.body = body;
    Ok(request)
}

pub fn set_timeouts(stream: &std::net::TcpStream) -> Result<()> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    Ok(())
}

fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_head(head: &[u8]) -> Result<HttpRequest> {
    let text = String::from_utf8_lossy(head);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
        }
    }
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_ascii_uppercase(),
        path,
        headers,
        body: Vec::new(),
    })
}

fn status_line(status: u16) -> &'static str {
    match status {
        200 => "HTTP/1.1 200 OK",
        204 => "HTTP/1.1 204 No Content",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        _ => "HTTP/1.1 500 Internal Server Error",
    }
}

pub fn write_json<W: Write, T: serde::Serialize>(out: &mut W, status: u16, body: &T) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    write_response(out, status, "application/json", &payload)
}

pub fn write_response<W: Write>(
    out: &mut W,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nAccess-Control-Allow-Origin: *\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line(status),
        content_type = content_type,
        len = body.len()
    );
    out.write_all(header.as_bytes())?;
    out.write_all(body)?;
    out.flush()?;
    Ok(())
}

/// CORS preflight answer.
pub fn write_preflight<W: Write>(out: &mut W) -> Result<()> {
    out.write_all(
        b"HTTP/1.1 204 No Content\r\nAccess-Control-Allow-Origin: *\r\nAccess-Control-Allow-Methods: GET, POST, OPTIONS\r\nAccess-Control-Allow-Headers: Content-Type\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
    )?;
    out.flush()?;
    Ok(())
}

/// Head of an endless response; the body follows until the connection closes.
pub fn write_stream_head<W: Write>(out: &mut W, content_type: &str) -> Result<()> {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nAccess-Control-Allow-Origin: *\r\nCache-Control: no-cache, no-store\r\nConnection: close\r\n\r\n"
    );
    out.write_all(header.as_bytes())?;
    out.flush()?;
    Ok(())
}
