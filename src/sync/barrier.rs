//! HTTP wait/continue barrier.
//!
//! A minimal always-listening local service with two endpoints: `GET /` for
//! liveness and `GET /continue` to release the one pending wait. The listener
//! runs on its own thread so `arm()` can block the calling thread while the
//! endpoints stay serviceable.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tiny_http::{Response, Server};

use crate::error::{Result, RigError};

/// Default listen port of the barrier service.
pub const DEFAULT_PORT: u16 = 5100;

/// How a blocked `arm()` call came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The continue endpoint was invoked.
    Satisfied,
    /// The timeout elapsed with no continue signal.
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Idle,
    Armed,
    Released,
}

struct BarrierState {
    slot: Mutex<Slot>,
    cond: Condvar,
}

/// The barrier service: one listener thread, one pending-wait slot.
pub struct AwaitService {
    state: Arc<BarrierState>,
    local_addr: std::net::SocketAddr,
}

impl AwaitService {
    /// Bind the listener and start serving. The listener thread is detached
    /// and lives until process exit.
    pub fn bind(addr: &str) -> Result<Self> {
        let server =
            Server::http(addr).map_err(|e| RigError::Barrier(format!("bind {addr}: {e}")))?;
        let local_addr = server
            .server_addr()
            .to_ip()
            .ok_or_else(|| RigError::Barrier("listener has no IP address".to_string()))?;

        let state = Arc::new(BarrierState {
            slot: Mutex::new(Slot::Idle),
            cond: Condvar::new(),
        });

        let listener_state = Arc::clone(&state);
        thread::spawn(move || {
            log::info!("Await service listening on {local_addr}.");
            for request in server.incoming_requests() {
                let (status, body) = match request.url() {
                    "/" => (200, "railbench await service is up and running"),
                    "/continue" => {
                        let mut slot = listener_state.slot.lock();
                        if *slot == Slot::Armed {
                            *slot = Slot::Released;
                            listener_state.cond.notify_all();
                            (200, "OK")
                        } else {
                            // client error, not a crash
                            (400, "no await armed; call arm() first")
                        }
                    }
                    _ => (404, "not found"),
                };
                let response = Response::from_string(body).with_status_code(status);
                if let Err(e) = request.respond(response) {
                    log::warn!("Failed to respond to barrier request: {e}");
                }
            }
        });

        Ok(Self { state, local_addr })
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Arm the single pending wait and block until the continue endpoint
    /// fires or `timeout` elapses. Either way the slot is cleared so a later
    /// `arm()` can proceed.
    pub fn arm(&self, timeout: Option<Duration>) -> Result<WaitOutcome> {
        let mut slot = self.state.slot.lock();
        if *slot != Slot::Idle {
            return Err(RigError::BarrierAlreadyArmed);
        }
        *slot = Slot::Armed;
        log::info!("Await armed (timeout: {timeout:?}).");

        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if *slot == Slot::Released {
                *slot = Slot::Idle;
                return Ok(WaitOutcome::Satisfied);
            }
            match deadline {
                Some(deadline) => {
                    if self.state.cond.wait_until(&mut slot, deadline).timed_out() {
                        if *slot == Slot::Released {
                            *slot = Slot::Idle;
                            return Ok(WaitOutcome::Satisfied);
                        }
                        *slot = Slot::Idle;
                        log::warn!("Timeout reached while waiting for the continue signal.");
                        return Ok(WaitOutcome::TimedOut);
                    }
                }
                None => self.state.cond.wait(&mut slot),
            }
        }
    }
}
