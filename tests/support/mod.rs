#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::thread;

use tiny_http::{Header, Response, Server};

/// Local stand-in for the remote image service. Every request path is
/// recorded; unknown paths get a 404.
pub struct MockApi {
    pub base: String,
    paths: Arc<Mutex<Vec<String>>>,
}

impl MockApi {
    pub fn start(routes: Vec<(&'static str, u16, Vec<u8>)>) -> Self {
        let server = Server::http("127.0.0.1:0").expect("bind mock api");
        let port = server
            .server_addr()
            .to_ip()
            .expect("mock api listens on tcp")
            .port();
        let paths = Arc::new(Mutex::new(Vec::new()));
        let seen = paths.clone();

        thread::spawn(move || {
            for request in server.incoming_requests() {
                let path = request.url().to_string();
                seen.lock().unwrap().push(path.clone());
                let (status, body) = routes
                    .iter()
                    .find(|(route, _, _)| *route == path)
                    .map(|(_, status, body)| (*status, body.clone()))
                    .unwrap_or((404, b"{}".to_vec()));
                let response = Response::from_data(body)
                    .with_status_code(status)
                    .with_header(
                        Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                            .unwrap(),
                    );
                let _ = request.respond(response);
            }
        });

        Self {
            base: format!("http://127.0.0.1:{port}"),
            paths,
        }
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

/// A base url nothing listens on.
pub fn dead_base() -> String {
    let server = Server::http("127.0.0.1:0").expect("bind unused port");
    let port = server.server_addr().to_ip().expect("tcp").port();
    drop(server);
    format!("http://127.0.0.1:{port}")
}
