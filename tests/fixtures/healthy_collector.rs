//! Stand-in for the externally-supplied collector binary, used only by this
//! workspace's own integration tests to exercise the Collector Process
//! (4.D), Health Checker (4.E) and Reload Engine (4.G) against a real child
//! process instead of mocking `tokio::process::Command` itself.
//!
//! Binds `SUPERVISOR_HEALTH_PORT` (the same env var `collector_process.rs`
//! sets on every spawn) and answers any request on `/health` with a bare
//! 200, forever -- the "blue becomes healthy" half of a blue-green reload.

use std::env;
use std::io::{Read, Write};
use std::net::TcpListener;

fn main() {
    let port: u16 = env::var("SUPERVISOR_HEALTH_PORT")
        .expect("SUPERVISOR_HEALTH_PORT must be set by the spawning supervisor")
        .parse()
        .expect("SUPERVISOR_HEALTH_PORT must be a valid port number");

    let listener = TcpListener::bind(("127.0.0.1", port)).expect("failed to bind health port");
    for stream in listener.incoming() {
        let Ok(mut stream) = stream else { continue };
        let mut buf = [0u8; 1024];
        let _ = stream.read(&mut buf);
        let body = b"ok";
        let response =
            format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n", body.len());
        let _ = stream.write_all(response.as_bytes());
        let _ = stream.write_all(body);
    }
}
