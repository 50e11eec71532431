//! Deferred GPU work.
//!
//! Producer threads only enqueue; the render thread drains once per frame.
//! The queue is an unbounded `flume` channel, so scheduling never blocks and
//! work runs in FIFO order. There is no dependency ordering between
//! resources: a resource that needs another to be `Ready` first must not be
//! scheduled before that.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use log::{debug, error, trace, warn};
use parking_lot::Mutex;

use crate::cache::gpu::{GpuDevice, GpuResource};
use crate::cache::state::ResourceState;
use crate::errors::{EmberError, Result};

type RenderEvent = Box<dyn FnOnce(&dyn GpuDevice) + Send>;

enum GpuWork {
    Init(Arc<dyn GpuResource>),
    Cleanup(Arc<dyn GpuResource>),
    Event(RenderEvent),
}

/// What one drain did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub initialised: usize,
    pub failed: usize,
    pub cleaned: usize,
    pub events: usize,
    /// Work items still queued (non-zero only for bounded drains).
    pub remaining: usize,
}

/// Single-consumer queue of render-thread work.
pub struct GpuInitScheduler {
    device: Arc<dyn GpuDevice>,
    sender: flume::Sender<GpuWork>,
    receiver: flume::Receiver<GpuWork>,
    render_thread: Mutex<Option<ThreadId>>,
}

impl GpuInitScheduler {
    #[must_use]
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            device,
            sender,
            receiver,
            render_thread: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }

    /// Makes the calling thread the render thread.
    ///
    /// Without an explicit binding, the first thread to drain becomes the
    /// render thread.
    pub fn bind_render_thread(&self) {
        *self.render_thread.lock() = Some(thread::current().id());
    }

    #[must_use]
    pub fn is_render_thread(&self) -> bool {
        *self.render_thread.lock() == Some(thread::current().id())
    }

    /// Queues `resource` for GPU initialisation.
    ///
    /// Only an `Unloaded` resource is queued; scheduling a queued, `Ready`
    /// or `Failed` resource is a no-op and returns `false`.
    pub fn schedule_init(&self, resource: Arc<dyn GpuResource>) -> bool {
        if !resource
            .status()
            .transition(ResourceState::Unloaded, ResourceState::Initialising)
        {
            return false;
        }
        trace!("Scheduled GPU init of '{}'", resource.label());
        self.push(GpuWork::Init(resource));
        true
    }

    /// Re-queues a `Failed` resource. Returns `false` for any other state.
    pub fn retry(&self, resource: Arc<dyn GpuResource>) -> bool {
        if !resource
            .status()
            .transition(ResourceState::Failed, ResourceState::Initialising)
        {
            return false;
        }
        debug!("Retrying GPU init of '{}'", resource.label());
        self.push(GpuWork::Init(resource));
        true
    }

    /// Queues the release of the resource's GPU side. The resource returns to
    /// `Unloaded` once drained. Returns `false` if it is already `Unloaded`.
    pub fn schedule_cleanup(&self, resource: Arc<dyn GpuResource>) -> bool {
        if resource.status().state() == ResourceState::Unloaded {
            return false;
        }
        self.push(GpuWork::Cleanup(resource));
        true
    }

    /// Queues an arbitrary closure to run on the render thread.
    pub fn post(&self, event: impl FnOnce(&dyn GpuDevice) + Send + 'static) {
        self.push(GpuWork::Event(Box::new(event)));
    }

    /// Number of queued work items.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Runs every queued item. Render thread only.
    pub fn drain(&self) -> Result<DrainReport> {
        self.drain_limited(usize::MAX)
    }

    /// Runs at most `budget` queued items, oldest first. Render thread only.
    ///
    /// Initialisation failures are recorded on the resource (`Failed` plus
    /// the message) and are not re-queued.
    pub fn drain_limited(&self, budget: usize) -> Result<DrainReport> {
        self.ensure_render_thread()?;

        let mut report = DrainReport::default();
        let mut processed = 0;
        while processed < budget {
            let Ok(work) = self.receiver.try_recv() else {
                break;
            };
            self.run(work, &mut report);
            processed += 1;
        }
        report.remaining = self.receiver.len();

        if processed > 0 {
            trace!("GPU drain: {report:?}");
        }
        Ok(report)
    }

    fn run(&self, work: GpuWork, report: &mut DrainReport) {
        let device = self.device.as_ref();
        match work {
            GpuWork::Init(resource) => {
                let status = resource.status();
                if status.state() != ResourceState::Initialising {
                    return;
                }
                match resource.initialise(device) {
                    Ok(()) => {
                        status.mark_ready();
                        report.initialised += 1;
                    }
                    Err(err) => {
                        warn!("GPU init of '{}' failed: {err}", resource.label());
                        status.mark_failed(err.to_string());
                        report.failed += 1;
                    }
                }
            }
            GpuWork::Cleanup(resource) => {
                if resource.status().state() == ResourceState::Unloaded {
                    return;
                }
                resource.cleanup(device);
                resource.status().reset();
                report.cleaned += 1;
            }
            GpuWork::Event(event) => {
                event(device);
                report.events += 1;
            }
        }
    }

    fn push(&self, work: GpuWork) {
        if let Err(e) = self.sender.send(work) {
            error!("Failed to queue GPU work: {e}");
        }
    }

    fn ensure_render_thread(&self) -> Result<()> {
        let current = thread::current().id();
        let mut bound = self.render_thread.lock();
        match *bound {
            Some(id) if id != current => Err(EmberError::NotRenderThread),
            Some(_) => Ok(()),
            None => {
                *bound = Some(current);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::gpu::HeadlessDevice;
    use crate::cache::state::GpuStatus;

    struct Tracked {
        label: String,
        status: GpuStatus,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Tracked {
        fn new(label: &str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                label: label.to_string(),
                status: GpuStatus::new(),
                log: Arc::clone(log),
            })
        }
    }

    impl GpuResource for Tracked {
        fn label(&self) -> &str {
            &self.label
        }

        fn status(&self) -> &GpuStatus {
            &self.status
        }

        fn initialise(&self, device: &dyn GpuDevice) -> Result<()> {
            device.create_buffer(&self.label, 16)?;
            self.log.lock().push(self.label.clone());
            Ok(())
        }

        fn cleanup(&self, _device: &dyn GpuDevice) {
            self.log.lock().push(format!("cleanup:{}", self.label));
        }
    }

    fn scheduler() -> (GpuInitScheduler, Arc<HeadlessDevice>) {
        let device = Arc::new(HeadlessDevice::new());
        (GpuInitScheduler::new(device.clone()), device)
    }

    #[test]
    fn test_drain_runs_in_fifo_order() {
        let (scheduler, _) = scheduler();
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b", "c"] {
            assert!(scheduler.schedule_init(Tracked::new(name, &log)));
        }

        let report = scheduler.drain().unwrap();
        assert_eq!(report.initialised, 3);
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_schedule_is_idempotent() {
        let (scheduler, _) = scheduler();
        let log = Arc::new(Mutex::new(Vec::new()));
        let tracked = Tracked::new("a", &log);

        assert!(scheduler.schedule_init(tracked.clone()));
        assert!(!scheduler.schedule_init(tracked.clone()));
        assert_eq!(scheduler.pending(), 1);

        scheduler.drain().unwrap();
        assert!(tracked.status().is_ready());
        assert!(!scheduler.schedule_init(tracked.clone()));
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_failure_is_recorded_not_requeued() {
        let (scheduler, device) = scheduler();
        let log = Arc::new(Mutex::new(Vec::new()));
        let tracked = Tracked::new("broken", &log);
        device.fail_on("broken");

        scheduler.schedule_init(tracked.clone());
        let report = scheduler.drain().unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(tracked.status().state(), ResourceState::Failed);
        assert!(tracked.status().failure().is_some());
        assert_eq!(scheduler.pending(), 0);

        assert!(!scheduler.schedule_init(tracked.clone()));

        device.heal("broken");
        assert!(scheduler.retry(tracked.clone()));
        scheduler.drain().unwrap();
        assert!(tracked.status().is_ready());
    }

    #[test]
    fn test_drain_from_other_thread_is_rejected() {
        let (scheduler, _) = scheduler();
        scheduler.bind_render_thread();
        let scheduler = Arc::new(scheduler);

        let other = Arc::clone(&scheduler);
        let outcome = std::thread::spawn(move || other.drain()).join().unwrap();
        assert_eq!(outcome, Err(EmberError::NotRenderThread));
        assert!(scheduler.drain().is_ok());
    }

    #[test]
    fn test_bounded_drain_keeps_remainder() {
        let (scheduler, _) = scheduler();
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b", "c"] {
            scheduler.schedule_init(Tracked::new(name, &log));
        }

        let first = scheduler.drain_limited(2).unwrap();
        assert_eq!(first.initialised, 2);
        assert_eq!(first.remaining, 1);

        let second = scheduler.drain_limited(2).unwrap();
        assert_eq!(second.initialised, 1);
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cleanup_returns_resource_to_unloaded() {
        let (scheduler, _) = scheduler();
        let log = Arc::new(Mutex::new(Vec::new()));
        let tracked = Tracked::new("a", &log);

        assert!(!scheduler.schedule_cleanup(tracked.clone()));
        scheduler.schedule_init(tracked.clone());
        assert!(scheduler.schedule_cleanup(tracked.clone()));

        let report = scheduler.drain().unwrap();
        assert_eq!((report.initialised, report.cleaned), (1, 1));
        assert_eq!(tracked.status().state(), ResourceState::Unloaded);
        assert_eq!(*log.lock(), vec!["a", "cleanup:a"]);
    }

    #[test]
    fn test_posted_events_run_on_drain() {
        let (scheduler, device) = scheduler();
        scheduler.post(|device| {
            device.create_texture("posted", 2, 2).unwrap();
        });
        assert_eq!(device.live_objects(), 0);

        let report = scheduler.drain().unwrap();
        assert_eq!(report.events, 1);
        assert_eq!(device.live_objects(), 1);
    }
}
