use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{debug, error, info, warn};

use crate::error::RelayError;
use crate::relay::{OtpRelay, RelayResponse};
use crate::transport::PortalTransport;

/// Blocking HTTP front door for an [`OtpRelay`].
pub struct RelayServer<T: PortalTransport + 'static> {
    server: Arc<Server>,
    relay: Arc<OtpRelay<T>>,
    listen: String,
}

impl<T: PortalTransport + 'static> RelayServer<T> {
    pub fn bind(listen: &str, relay: OtpRelay<T>) -> Result<Self, RelayError> {
        let server = Server::http(listen)
            .map_err(|err| RelayError::Server(format!("failed to bind {listen}: {err}")))?;
        Ok(Self {
            server: Arc::new(server),
            relay: Arc::new(relay),
            listen: listen.to_string(),
        })
    }

    /// Address actually bound, which differs from `listen` for port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    /// Serves until the listener fails, using `workers` accept threads.
    pub fn serve(self, workers: usize) -> Result<(), RelayError> {
        info!(listen = %self.listen, workers, "relay listening");
        let handles = (0..workers.max(1))
            .map(|worker| {
                let server = Arc::clone(&self.server);
                let relay = Arc::clone(&self.relay);
                thread::Builder::new()
                    .name(format!("relay-worker-{worker}"))
                    .spawn(move || accept_loop(&*server, &*relay))
                    .map_err(|err| RelayError::Server(err.to_string()))
            })
            .collect::<Result<Vec<_>, RelayError>>()?;

        for handle in handles {
            if handle.join().is_err() {
                error!("relay worker panicked");
            }
        }
        Ok(())
    }
}

fn accept_loop<T: PortalTransport>(server: &Server, relay: &OtpRelay<T>) {
    loop {
        let request = match server.recv() {
            Ok(request) => request,
            Err(err) => {
                error!(%err, "relay listener stopped");
                return;
            }
        };
        debug!(method = %request.method(), url = request.url(), "relay request");
        let response = if *request.method() == Method::Get {
            relay.handle(request.url())
        } else {
            RelayResponse {
                status: 405,
                body: serde_json::json!({ "error": "Method not allowed" }),
            }
        };
        respond(request, response);
    }
}

fn respond(request: Request, response: RelayResponse) {
    let body = response.body.to_string();
    let mut reply = Response::from_string(body).with_status_code(response.status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        reply = reply.with_header(header);
    }
    if let Err(err) = request.respond(reply) {
        warn!(%err, "failed to write relay response");
    }
}
