//! Test-only scripted HTTP stub.
//!
//! Serves canned responses over a real TCP socket, one response per
//! connection, and captures every raw request for assertions. Responses
//! must carry `Connection: close` so the client's connection pool does not
//! try to reuse a socket the next scripted exchange expects fresh.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const ACCEPT_DEADLINE: Duration = Duration::from_secs(5);

pub struct StubServer {
    base_url: String,
    handle: JoinHandle<Vec<String>>,
}

impl StubServer {
    /// Serve `responses` in order, one per connection, then stop accepting.
    /// Gives up after a few seconds if the client under test makes fewer
    /// requests than scripted, so a missing retry fails an assertion
    /// instead of hanging the test.
    pub fn start(responses: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub listener");
        let addr = listener.local_addr().expect("stub listener addr");
        listener
            .set_nonblocking(true)
            .expect("nonblocking stub listener");

        let handle = thread::spawn(move || {
            let mut requests = Vec::new();
            let deadline = Instant::now() + ACCEPT_DEADLINE;
            for canned in responses {
                let Some(mut stream) = accept_until(&listener, deadline) else {
                    break;
                };
                requests.push(read_request(&mut stream));
                stream.write_all(canned.as_bytes()).ok();
                stream.flush().ok();
            }
            requests
        });

        Self {
            base_url: format!("http://{addr}"),
            handle,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Wait for the server thread and return the raw requests it saw.
    pub fn finish(self) -> Vec<String> {
        self.handle.join().expect("stub server thread")
    }
}

/// Minimal HTTP/1.1 response with the headers the client cares about.
pub fn json_response(status: u16, body: &str) -> String {
    let reason = match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        _ => "Other",
    };
    format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {len}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        len = body.len()
    )
}

fn accept_until(listener: &TcpListener, deadline: Instant) -> Option<TcpStream> {
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false).ok();
                stream
                    .set_read_timeout(Some(Duration::from_secs(5)))
                    .ok();
                return Some(stream);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return None;
                }
                thread::sleep(Duration::from_millis(10));
            }
            Err(_) => return None,
        }
    }
}

/// Read one full request: headers, then `Content-Length` bytes of body.
fn read_request(stream: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let Ok(n) = stream.read(&mut buf) else { break };
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(end) = find(&data, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&data[..end]).to_lowercase();
            let content_length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&data).into_owned()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
