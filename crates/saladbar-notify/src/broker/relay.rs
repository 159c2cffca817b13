//! Broker relay.
//!
//! Pulls channel-tagged frames from publishers and fans them out to every
//! subscriber. Frames are forwarded unchanged; subscribers do their own
//! decoding and drop what they cannot read.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nng::options::{Options, RecvTimeout};
use nng::{Protocol, Socket};

use crate::error::{Error, Result};

/// How long the forwarding thread blocks before re-checking the stop flag.
const RECV_POLL: Duration = Duration::from_millis(200);

/// A running relay between an ingress PULL socket and an egress PUB socket.
pub struct Relay {
    ingress: Socket,
    egress: Socket,
    ingress_url: String,
    egress_url: String,
    stop_flag: Arc<AtomicBool>,
    forwarded: Arc<AtomicU64>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Relay {
    /// Bind both sockets and start forwarding on a background thread.
    pub fn bind(ingress_url: &str, egress_url: &str) -> Result<Self> {
        let ingress = Socket::new(Protocol::Pull0)
            .map_err(|e| Error::Broker(format!("failed to create ingress socket: {}", e)))?;
        ingress
            .set_opt::<RecvTimeout>(Some(RECV_POLL))
            .map_err(|e| Error::Broker(format!("failed to set receive timeout: {}", e)))?;
        ingress
            .listen(ingress_url)
            .map_err(|e| Error::Broker(format!("failed to listen on {}: {}", ingress_url, e)))?;

        let egress = Socket::new(Protocol::Pub0)
            .map_err(|e| Error::Broker(format!("failed to create egress socket: {}", e)))?;
        egress
            .listen(egress_url)
            .map_err(|e| Error::Broker(format!("failed to listen on {}: {}", egress_url, e)))?;

        let stop_flag = Arc::new(AtomicBool::new(false));
        let forwarded = Arc::new(AtomicU64::new(0));

        let handle = {
            let ingress = ingress.clone();
            let egress = egress.clone();
            let stop_flag = stop_flag.clone();
            let forwarded = forwarded.clone();
            thread::Builder::new()
                .name("saladbar-relay".to_string())
                .spawn(move || forward(ingress, egress, stop_flag, forwarded))
                .map_err(|e| Error::Broker(format!("failed to spawn relay thread: {}", e)))?
        };

        tracing::info!(ingress = %ingress_url, egress = %egress_url, "broker relay listening");

        Ok(Self {
            ingress,
            egress,
            ingress_url: ingress_url.to_string(),
            egress_url: egress_url.to_string(),
            stop_flag,
            forwarded,
            handle: Some(handle),
        })
    }

    /// URL publishers push to.
    pub fn ingress_url(&self) -> &str {
        &self.ingress_url
    }

    /// URL subscribers dial.
    pub fn egress_url(&self) -> &str {
        &self.egress_url
    }

    /// Number of frames forwarded so far.
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Stop forwarding and close both sockets.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        self.stop_flag.store(true, Ordering::SeqCst);
        self.ingress.close();
        let _ = handle.join();
        self.egress.close();

        tracing::info!(forwarded = self.forwarded(), "broker relay stopped");
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.stop();
    }
}

fn forward(ingress: Socket, egress: Socket, stop_flag: Arc<AtomicBool>, forwarded: Arc<AtomicU64>) {
    loop {
        if stop_flag.load(Ordering::SeqCst) {
            return;
        }

        match ingress.recv() {
            Ok(msg) => {
                tracing::trace!(bytes = msg.len(), "relaying frame");
                if let Err((_, e)) = egress.send(msg) {
                    tracing::warn!(error = %e, "failed to publish frame");
                } else {
                    forwarded.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(nng::Error::TimedOut) => continue,
            Err(nng::Error::Closed) => return,
            Err(e) => {
                tracing::error!(error = %e, "relay receive error");
            }
        }
    }
}
