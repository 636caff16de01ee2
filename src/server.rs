//! HTTP shell
//!
//! Minimal HTTP/1.1 handling over tokio sockets: one task per connection, one request per
//! connection, JSON in and out.
//!
//! Routes:
//! - `POST /api/ask` with `{"query": "..."}` → [`crate::pipeline::PipelineResponse`]
//! - `GET /api/health`
//! - `GET /api/schema` → the schema document
//! - `GET /api/examples` → sample questions

use crate::agent_prompts::EXAMPLE_REQUESTS;
use crate::pipeline::Pipeline;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

const MAX_REQUEST_BYTES: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct AskBody {
    query: String,
}

/// Accept connections forever, handling each on its own task
pub async fn serve(listener: TcpListener, pipeline: Arc<Pipeline>) -> std::io::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        debug!("📥 New connection from: {}", addr);
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, &pipeline).await {
                error!("Connection from {} failed: {}", addr, e);
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, pipeline: &Pipeline) -> std::io::Result<()> {
    let raw = read_request(&mut stream).await?;
    let response = handle_request(pipeline, &raw).await;
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await
}

/// Read headers, then as much body as Content-Length announces
async fn read_request(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buffer = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    loop {
        let size = stream.read(&mut chunk).await?;
        if size == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..size]);

        if let Some(header_end) = find_header_end(&buffer) {
            let headers = String::from_utf8_lossy(&buffer[..header_end]);
            let body_len = parse_headers(&headers)
                .get("content-length")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0);
            if buffer.len() >= header_end + 4 + body_len {
                break;
            }
        }
        if buffer.len() > MAX_REQUEST_BYTES {
            break;
        }
    }

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_headers(head: &str) -> HashMap<String, String> {
    head.lines()
        .skip(1)
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_lowercase(), value.trim().to_string()))
        .collect()
}

/// Route one raw HTTP request and render the full HTTP response
pub async fn handle_request(pipeline: &Pipeline, request: &str) -> String {
    let (head, body) = match request.split_once("\r\n\r\n") {
        Some((head, body)) => (head, body),
        None => (request, ""),
    };

    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    let (Some(method), Some(target)) = (request_line.next(), request_line.next()) else {
        return create_response(400, "Bad Request", r#"{"error":"malformed request line"}"#);
    };

    let path = target.split('?').next().unwrap_or(target).trim_end_matches('/');
    info!("🔍 Request: {} {}", method, path);

    match (method, path) {
        ("GET", "/api/health") => create_response(200, "OK", r#"{"status":"ok","service":"askdb"}"#),
        ("GET", "/api/schema") => json_response(&pipeline.schema().to_json()),
        ("GET", "/api/examples") => json_response(&serde_json::json!({ "examples": EXAMPLE_REQUESTS })),
        ("POST", "/api/ask") => match serde_json::from_str::<AskBody>(body.trim_end_matches('\0')) {
            Ok(ask) => {
                let response = pipeline.ask(&ask.query).await;
                json_response(&response)
            }
            Err(e) => {
                let message = serde_json::json!({ "error": format!("invalid request body: {}", e) });
                create_response(400, "Bad Request", &message.to_string())
            }
        },
        ("OPTIONS", _) => create_response(204, "No Content", ""),
        _ => create_response(404, "Not Found", r#"{"error":"not found"}"#),
    }
}

fn json_response<T: serde::Serialize>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(body) => create_response(200, "OK", &body),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            create_response(500, "Internal Server Error", r#"{"error":"serialization failed"}"#)
        }
    }
}

fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        status_text,
        body.len(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_headers_lowercases_keys() {
        let headers = parse_headers("POST /api/ask HTTP/1.1\r\nContent-Length: 17\r\nHost: x");
        assert_eq!(headers.get("content-length").map(String::as_str), Some("17"));
        assert_eq!(headers.get("host").map(String::as_str), Some("x"));
    }

    #[test]
    fn test_create_response_sets_length() {
        let response = create_response(200, "OK", r#"{"a":1}"#);
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Content-Length: 7\r\n"));
        assert!(response.ends_with("\r\n\r\n{\"a\":1}"));
    }

    #[test]
    fn test_find_header_end() {
        assert_eq!(find_header_end(b"GET / HTTP/1.1\r\n\r\nbody"), Some(14));
        assert_eq!(find_header_end(b"GET / HTTP/1.1\r\n"), None);
    }
}
