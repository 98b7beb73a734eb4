//! Keyframe request scheduling
//!
//! When the depacketizer detects damage it can only recover from a fresh
//! keyframe, so it flags the stream as wanting one. A lazily started task
//! turns that flag into actual requests, pacing them by two independent
//! timers: a grace period after the last keyframe actually arrived, and a
//! minimum spacing between consecutive requests. Requests are delivered
//! through an ordered list of requesters, tried until one succeeds.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::dtls::transport::DatagramConnector;
use crate::packet::rtcp::feedback::RtcpFeedback;
use crate::{Result, RtpSsrc};

/// Grace period after a received keyframe before a new request may go out
pub const KEYFRAME_GRACE_PERIOD: Duration = Duration::from_millis(1000);

/// Minimum spacing between consecutive keyframe requests
pub const KEYFRAME_REQUEST_INTERVAL: Duration = Duration::from_millis(3000);

/// Delivers a keyframe request to the remote peer
///
/// `Ok` means the request went out; an error makes the scheduler fall
/// through to the next requester in its list.
pub trait KeyframeRequester: Send + Sync {
    /// Ask the remote peer for a keyframe
    fn request_keyframe(&self) -> Result<()>;
}

struct KeyframeRequestState {
    wanted: bool,
    running: bool,
    task_active: bool,
    last_keyframe_at: Instant,
    last_request_at: Instant,
}

/// Deadline-driven keyframe request loop
///
/// Created inside a tokio runtime; the request task is spawned on demand the
/// first time a keyframe becomes wanted and exits as soon as it no longer
/// is, so an undamaged session carries no background work at all.
pub struct KeyframeScheduler {
    state: Mutex<KeyframeRequestState>,
    notify: Notify,
    requesters: Vec<Arc<dyn KeyframeRequester>>,
    runtime: Handle,
    grace_period: Duration,
    request_interval: Duration,
}

impl KeyframeScheduler {
    /// Create a scheduler over an ordered list of requesters
    ///
    /// Must be called from within a tokio runtime; the current handle is
    /// kept so the synchronous depacketizer path can start the task later.
    pub fn new(requesters: Vec<Arc<dyn KeyframeRequester>>) -> Arc<Self> {
        Self::with_policy(requesters, KEYFRAME_GRACE_PERIOD, KEYFRAME_REQUEST_INTERVAL)
    }

    fn with_policy(
        requesters: Vec<Arc<dyn KeyframeRequester>>,
        grace_period: Duration,
        request_interval: Duration,
    ) -> Arc<Self> {
        let now = Instant::now();
        Arc::new(Self {
            state: Mutex::new(KeyframeRequestState {
                wanted: false,
                running: true,
                task_active: false,
                last_keyframe_at: now,
                // Backdated so the spacing timer never delays the first
                // request; only the grace period applies at session start.
                last_request_at: now.checked_sub(request_interval).unwrap_or(now),
            }),
            notify: Notify::new(),
            requesters,
            runtime: Handle::current(),
            grace_period,
            request_interval,
        })
    }

    /// Flag that the stream needs a keyframe, starting the task if idle
    pub fn keyframe_needed(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if !state.running {
            return;
        }
        state.wanted = true;
        if !state.task_active {
            state.task_active = true;
            debug!("starting keyframe request task");
            let scheduler = self.clone();
            self.runtime.spawn(Self::run(scheduler));
        }
        drop(state);
        self.notify.notify_one();
    }

    /// Record that a keyframe arrived, clearing the want flag
    pub fn keyframe_received(&self) {
        let mut state = self.state.lock();
        state.wanted = false;
        state.last_keyframe_at = Instant::now();
        drop(state);
        self.notify.notify_one();
    }

    /// Record that a keyframe is imminent (SPS/PPS seen), deferring any
    /// pending request by one spacing interval without clearing the flag
    pub fn keyframe_imminent(&self) {
        let mut state = self.state.lock();
        state.last_request_at = Instant::now();
        drop(state);
        self.notify.notify_one();
    }

    /// Whether the stream currently wants a keyframe
    pub fn is_keyframe_wanted(&self) -> bool {
        self.state.lock().wanted
    }

    /// Stop the scheduler; the task observes the flag and exits
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.running = false;
        drop(state);
        self.notify.notify_one();
    }

    fn task_active(&self) -> bool {
        self.state.lock().task_active
    }

    async fn run(self: Arc<Self>) {
        loop {
            let deadline = {
                let mut state = self.state.lock();
                if !state.running || !state.wanted {
                    state.task_active = false;
                    debug!("keyframe request task going idle");
                    return;
                }
                let due = (state.last_keyframe_at + self.grace_period)
                    .max(state.last_request_at + self.request_interval);
                let now = Instant::now();
                if now >= due {
                    state.last_request_at = now;
                    None
                } else {
                    Some(due)
                }
            };

            match deadline {
                None => self.fire_request(),
                Some(due) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(tokio::time::Instant::from_std(due)) => {}
                        _ = self.notify.notified() => {}
                    }
                }
            }
        }
    }

    fn fire_request(&self) {
        for requester in &self.requesters {
            match requester.request_keyframe() {
                Ok(()) => {
                    debug!("keyframe request sent");
                    return;
                }
                Err(e) => {
                    warn!("keyframe requester failed: {}", e);
                }
            }
        }
        // Exhausting the list just postpones to the next cycle.
        debug!("no keyframe requester succeeded, will retry");
    }
}

/// Requester that asks for a keyframe with an RTCP picture loss indication
pub struct RtcpKeyframeRequester {
    sender_ssrc: RtpSsrc,
    source_ssrc: RtpSsrc,
    connector: Arc<dyn DatagramConnector>,
}

impl RtcpKeyframeRequester {
    /// Create a PLI requester sending through `connector`
    pub fn new(
        sender_ssrc: RtpSsrc,
        source_ssrc: RtpSsrc,
        connector: Arc<dyn DatagramConnector>,
    ) -> Self {
        Self {
            sender_ssrc,
            source_ssrc,
            connector,
        }
    }
}

impl KeyframeRequester for RtcpKeyframeRequester {
    fn request_keyframe(&self) -> Result<()> {
        let packet = RtcpFeedback::pli(self.sender_ssrc, self.source_ssrc).serialize()?;
        self.connector.send_datagram(&packet)
    }
}
