use crate::ledger::Ledger;
use crate::output::MemoryReport;
use crate::owner::OwnerId;
use serde::Serialize;
use std::fmt::Display;
use std::thread;
use tiny_http::{Header, Request, Response, Server};

/// Serves `ledger` over HTTP on a background thread and returns the bound
/// port, which differs from `port` when `port` is 0. `None` if binding fails.
///
/// - `GET /memory` returns the full [`MemoryReport`] as JSON.
/// - `GET /owners/<id>` returns one owner's row; `<id>` is decimal, or hex
///   when prefixed with `0x` or `:` (the form owners are displayed in).
pub fn start_metrics_server(port: u16, ledger: &'static Ledger) -> Option<u16> {
    let addr = format!("0.0.0.0:{}", port);
    let server = match Server::http(&addr) {
        Ok(s) => s,
        Err(e) => {
            eprintln!(
                "[tagalloc] Failed to bind metrics server to {}: {}. Customize the port using the TAGALLOC_HTTP_PORT environment variable.",
                addr, e
            );
            return None;
        }
    };
    let bound = server.server_addr().to_ip().map_or(port, |addr| addr.port());

    eprintln!("[tagalloc] Metrics server listening on http://0.0.0.0:{}", bound);

    thread::Builder::new()
        .name("tagalloc-http-server".into())
        .spawn(move || {
            for request in server.incoming_requests() {
                handle_request(request, ledger);
            }
        })
        .expect("Failed to spawn HTTP metrics server thread");

    Some(bound)
}

fn handle_request(request: Request, ledger: &Ledger) {
    let path = request.url().split('?').next().unwrap_or("/").to_string();

    if path == "/memory" {
        respond_json(request, &MemoryReport::capture(ledger, 0));
    } else if let Some(raw) = path.strip_prefix("/owners/") {
        let Some(owner) = parse_owner(raw) else {
            respond_error(request, 400, &format!("Invalid owner id: {}", raw));
            return;
        };
        match MemoryReport::capture(ledger, 0).owner(owner) {
            Some(usage) => respond_json(request, usage),
            None => respond_error(
                request,
                404,
                &format!("Owner {} has no attributed memory", owner),
            ),
        }
    } else {
        respond_error(request, 404, "Not found");
    }
}

pub(crate) fn parse_owner(raw: &str) -> Option<OwnerId> {
    let raw = raw.trim();
    let hex = raw
        .strip_prefix(':')
        .or_else(|| raw.strip_prefix("0x"))
        .or_else(|| raw.strip_prefix("0X"));
    let parsed = match hex {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.ok().map(OwnerId::new)
}

fn respond_json<T: Serialize>(request: Request, value: &T) {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::from_data(body);
            if let Ok(header) =
                Header::from_bytes(b"Content-Type".as_slice(), b"application/json".as_slice())
            {
                response.add_header(header);
            }
            let _ = request.respond(response);
        }
        Err(e) => respond_internal_error(request, e),
    }
}

fn respond_error(request: Request, code: u16, msg: &str) {
    let _ = request.respond(Response::from_string(msg).with_status_code(code));
}

fn respond_internal_error(request: Request, e: impl Display) {
    eprintln!("[tagalloc] Internal server error: {}", e);
    let _ = request.respond(
        Response::from_string(format!("Internal server error: {}", e)).with_status_code(500),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;

    static SERVED_LEDGER: Ledger = Ledger::new();

    #[test]
    fn test_parse_owner() {
        assert_eq!(parse_owner("7"), Some(OwnerId::new(7)));
        assert_eq!(parse_owner("0x01000007"), Some(OwnerId::new(0x0100_0007)));
        assert_eq!(parse_owner(":01000007"), Some(OwnerId::new(0x0100_0007)));
        assert_eq!(parse_owner("nope"), None);
    }

    fn get(port: u16, path: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        write!(
            stream,
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        )
        .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    #[test]
    fn test_serves_memory_report() {
        SERVED_LEDGER.record_alloc(OwnerId::new(0x0100_0007), 4096);
        let port = start_metrics_server(0, &SERVED_LEDGER).expect("server did not bind");
        assert_ne!(port, 0);

        let memory = get(port, "/memory");
        assert!(memory.starts_with("HTTP/1.1 200"), "{memory}");
        assert!(memory.contains("\"live_bytes\":4096"), "{memory}");

        let owner = get(port, "/owners/0x01000007");
        assert!(owner.contains("\"bytes\":4096"), "{owner}");

        let missing = get(port, "/owners/12");
        assert!(missing.starts_with("HTTP/1.1 404"), "{missing}");
    }
}
