use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use foundation::ids::{Id, IdGen};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::frame::Frame;

/// Live-tunable parameters of one animation loop.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AnimationParams {
    pub enabled: bool,
    /// Phase cycles per second.
    pub speed: f64,
}

impl AnimationParams {
    pub fn new(enabled: bool, speed: f64) -> Self {
        Self { enabled, speed }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            speed: 0.0,
        }
    }
}

/// Token identifying one running loop. A restarted loop gets a new handle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AnimationHandle(Id);

/// Returned by [`AnimationScheduler::ensure`] when called outside a tokio runtime.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NoRuntime;

impl std::fmt::Display for NoRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("no tokio runtime to drive the animation loop")
    }
}

impl std::error::Error for NoRuntime {}

/// Called once per frame with the frame metadata and the phase in `[0, 1)`.
pub type FrameCallback = Arc<dyn Fn(Frame, f64) + Send + Sync>;

struct Running {
    handle: AnimationHandle,
    params: watch::Sender<AnimationParams>,
    task: JoinHandle<()>,
}

/// Cancellable per-key frame loops.
///
/// At most one loop runs per key. [`AnimationScheduler::ensure`] either starts a loop
/// or pushes new parameters into the running one, which reads them on its next frame.
/// Loops never outlive the scheduler.
pub struct AnimationScheduler<K> {
    frame_interval: Duration,
    ids: IdGen,
    loops: Mutex<BTreeMap<K, Running>>,
}

impl<K> AnimationScheduler<K>
where
    K: Ord + Clone + Debug + Send + 'static,
{
    pub fn new(frame_interval: Duration) -> Self {
        Self {
            frame_interval: frame_interval.max(Duration::from_millis(1)),
            ids: IdGen::new(),
            loops: Mutex::new(BTreeMap::new()),
        }
    }

    /// Bring the loop for `key` in line with `params`.
    ///
    /// Returns the handle of the loop running after the call, or `None` when the
    /// parameters disable animation. Starting a loop needs a tokio runtime; without one
    /// the call fails with [`NoRuntime`] and nothing runs for `key`.
    pub fn ensure(
        &self,
        key: K,
        params: AnimationParams,
        on_frame: FrameCallback,
    ) -> Result<Option<AnimationHandle>, NoRuntime> {
        let mut loops = self.loops.lock();

        if let Some(running) = loops.get(&key) {
            if params.enabled && !running.task.is_finished() {
                running.params.send_replace(params);
                return Ok(Some(running.handle));
            }
            if let Some(old) = loops.remove(&key) {
                old.params.send_replace(AnimationParams::disabled());
                old.task.abort();
                debug!(?key, handle = %old.handle.0, "animation loop stopped");
            }
        }

        if !params.enabled {
            return Ok(None);
        }
        let runtime = Handle::try_current().map_err(|_| NoRuntime)?;

        let handle = AnimationHandle(self.ids.next_id());
        let (tx, rx) = watch::channel(params);
        let task = runtime.spawn(run_loop(rx, self.frame_interval, on_frame));
        debug!(?key, handle = %handle.0, "animation loop started");
        loops.insert(
            key,
            Running {
                handle,
                params: tx,
                task,
            },
        );
        Ok(Some(handle))
    }

    /// Stop the loop for `key`. Returns `true` if one was running.
    pub fn stop(&self, key: &K) -> bool {
        let Some(running) = self.loops.lock().remove(key) else {
            return false;
        };
        running.task.abort();
        debug!(?key, handle = %running.handle.0, "animation loop stopped");
        true
    }

    pub fn handle(&self, key: &K) -> Option<AnimationHandle> {
        self.loops
            .lock()
            .get(key)
            .filter(|r| !r.task.is_finished())
            .map(|r| r.handle)
    }

    pub fn is_running(&self, key: &K) -> bool {
        self.handle(key).is_some()
    }

    pub fn running_count(&self) -> usize {
        self.loops
            .lock()
            .values()
            .filter(|r| !r.task.is_finished())
            .count()
    }
}

impl<K> Drop for AnimationScheduler<K> {
    fn drop(&mut self) {
        for running in self.loops.get_mut().values() {
            running.task.abort();
        }
    }
}

/// Advance a cyclic phase by `speed` cycles per second over `dt_s` seconds.
pub fn advance_phase(phase: f64, speed: f64, dt_s: f64) -> f64 {
    let next = (phase + speed * dt_s).rem_euclid(1.0);
    if next.is_finite() { next } else { 0.0 }
}

async fn run_loop(
    params: watch::Receiver<AnimationParams>,
    interval: Duration,
    on_frame: FrameCallback,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut frame: Option<Frame> = None;
    let mut last = Instant::now();
    let mut phase = 0.0;

    loop {
        let now = ticker.tick().await;
        let current = *params.borrow();
        if !current.enabled {
            break;
        }

        let next = match frame {
            None => Frame::first(),
            Some(f) => f.advance(now.saturating_duration_since(last).as_secs_f64()),
        };
        last = now;
        phase = advance_phase(phase, current.speed, next.dt_s);
        on_frame(next, phase);
        frame = Some(next);
    }
}
