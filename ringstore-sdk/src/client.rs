//! Client side of the peer protocol.
//!
//! Two delivery flavors, per the cooperative protocols' needs:
//!
//! - [`call`]: connect, send one framed request, block for the framed
//!   response, decode. Any socket or decode failure comes back as a
//!   [`WireError`]; callers fall back to their local defaults and never
//!   retry.
//! - [`cast`]: fire-and-forget. The exchange runs on a spawned task and the
//!   result is dropped. Each cast registers with a [`TaskGauge`] so tests
//!   (and graceful shutdown) can [`TaskGauge::drain`] to quiescence.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::de::DeserializeOwned;
use tokio::net::TcpStream;
use tokio::sync::Notify;

use crate::error::WireError;
use crate::frame;
use crate::message::Request;

/// Perform one synchronous request/response exchange with a peer.
pub async fn call<T>(host: &str, port: u16, req: &Request) -> Result<T, WireError>
where
    T: DeserializeOwned,
{
    let mut stream = TcpStream::connect((host, port)).await?;
    let payload = serde_json::to_vec(req)?;
    frame::write_frame(&mut stream, &payload).await?;
    let resp = frame::read_frame(&mut stream).await?;
    if resp == b"ERROR" {
        return Err(WireError::Remote);
    }
    Ok(serde_json::from_slice(&resp)?)
}

/// Deliver `req` on a background task, dropping the outcome. Failures are
/// logged at debug and never surface to the caller.
pub fn cast(host: &str, port: u16, req: Request, gauge: &TaskGauge) {
    let host = host.to_string();
    let in_flight = gauge.enter();
    tokio::spawn(async move {
        if let Err(e) = call::<serde_json::Value>(&host, port, &req).await {
            tracing::debug!(%host, port, error = %e, "fire-and-forget send failed");
        }
        drop(in_flight);
    });
}

/// Counts in-flight fire-and-forget sends so callers can await quiescence.
#[derive(Clone, Default)]
pub struct TaskGauge {
    inner: Arc<GaugeInner>,
}

#[derive(Default)]
struct GaugeInner {
    count: AtomicUsize,
    notify: Notify,
}

/// RAII registration of one in-flight send.
pub struct InFlight {
    inner: Arc<GaugeInner>,
}

impl TaskGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> InFlight {
        self.inner.count.fetch_add(1, Ordering::SeqCst);
        InFlight { inner: self.inner.clone() }
    }

    pub fn in_flight(&self) -> usize {
        self.inner.count.load(Ordering::SeqCst)
    }

    /// Wait until every registered send has completed.
    pub async fn drain(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.inner.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.notify.notify_waiters();
        }
    }
}
