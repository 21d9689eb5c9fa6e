//! Background worker that waits for cards and reports what it read.
//!
//! One [`ScanLoop`] drives one chip. Its worker thread is the only place
//! register traffic happens while scanning: the [`ReaderDriver`] is moved
//! into the thread on [`ScanLoop::start`] and handed back when the thread
//! ends.
//!
//! Each cycle goes `WaitingForCard -> Acquiring -> Cooldown` and delivers
//! exactly one [`ScanOutcome`] to the registered [`ScanObserver`], on the
//! worker thread.

use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::interrupt::{InterruptLine, IrqSignal};
use crate::reader::ReaderDriver;
use crate::transport::SpiTransport;
use crate::types::{ReaderError, ScanConfig, ScanOutcome};

/// Receives one outcome per completed detection cycle.
///
/// Called on the worker thread with the scanner's observer lock held:
/// implementations must not stop the scanner or change its observer.
pub trait ScanObserver: Send + Sync {
    fn on_scan_result(&self, outcome: ScanOutcome);
}

/// Forward outcomes into a channel, e.g. to handle them on the main thread
impl ScanObserver for Sender<ScanOutcome> {
    fn on_scan_result(&self, outcome: ScanOutcome) {
        if self.send(outcome).is_err() {
            warn!("Scan outcome receiver is gone");
        }
    }
}

/// Where the worker currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Created, never started
    Idle,
    WaitingForCard,
    Acquiring,
    Cooldown,
    /// Worker finished after a stop request
    Stopped,
}

struct Shared {
    scanning: AtomicBool,
    state: Mutex<ScanState>,
    observer: Mutex<Option<Weak<dyn ScanObserver>>>,
}

impl Shared {
    fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    fn state(&self) -> ScanState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ScanState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn deliver(&self, outcome: ScanOutcome) {
        // Held across the flag check and the call; `halt` takes it too, so
        // no outcome reaches the observer once a stop has returned.
        let observer = self.observer.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.is_scanning() {
            debug!("Dropping outcome produced after stop: {:?}", outcome);
            return;
        }

        match &outcome {
            ScanOutcome::Success(uid) => info!("Card {} detected", uid),
            ScanOutcome::Failure(e) => warn!("Card read failed: {}", e),
        }

        match observer.as_ref().and_then(Weak::upgrade) {
            Some(observer) => observer.on_scan_result(outcome),
            None => warn!("No scan observer registered, outcome dropped"),
        }
    }

    /// Report an error that ends scanning, then stop
    fn deliver_fatal(&self, error: ReaderError) {
        error!("Scanning stopped: {}", error);
        self.deliver(ScanOutcome::Failure(error));
        self.halt();
    }

    /// Clear the scanning flag, waiting for an in-flight delivery. Returns
    /// whether the flag was set.
    fn halt(&self) -> bool {
        let _observer = self.observer.lock().unwrap_or_else(PoisonError::into_inner);
        self.scanning.swap(false, Ordering::SeqCst)
    }

    /// Sleep for `pause` in `slice` steps, returning early on stop
    fn cooldown(&self, pause: Duration, slice: Duration) {
        self.set_state(ScanState::Cooldown);
        let deadline = Instant::now() + pause;
        while self.is_scanning() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(slice));
        }
    }
}

/// Cloneable handle to stop a [`ScanLoop`] from any thread
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    /// Ask the worker to finish. Returns `false` if it was not scanning.
    ///
    /// The worker notices within one poll interval while waiting for a card;
    /// a cycle already acquiring runs to its end but its outcome is dropped.
    /// An outcome being delivered when this is called is delivered first.
    pub fn stop(&self) -> bool {
        let was_scanning = self.shared.halt();
        if was_scanning {
            info!("Stop requested");
        }
        was_scanning
    }

    pub fn is_scanning(&self) -> bool {
        self.shared.is_scanning()
    }
}

enum Worker<T: SpiTransport> {
    Parked(ReaderDriver<T>),
    Running(JoinHandle<ReaderDriver<T>>),
    /// The worker panicked and took the driver with it
    Lost,
}

/// Interrupt-driven card scanner for one reader chip
pub struct ScanLoop<T, I>
where
    T: SpiTransport + Send + 'static,
    I: InterruptLine,
{
    worker: Worker<T>,
    irq_line: I,
    signal: Arc<IrqSignal>,
    shared: Arc<Shared>,
    config: ScanConfig,
    torn_down: bool,
}

impl<T, I> ScanLoop<T, I>
where
    T: SpiTransport + Send + 'static,
    I: InterruptLine,
{
    pub fn new(driver: ReaderDriver<T>, irq_line: I, config: ScanConfig) -> Self {
        Self {
            worker: Worker::Parked(driver),
            irq_line,
            signal: Arc::new(IrqSignal::new()),
            shared: Arc::new(Shared {
                scanning: AtomicBool::new(false),
                state: Mutex::new(ScanState::Idle),
                observer: Mutex::new(None),
            }),
            config,
            torn_down: false,
        }
    }

    /// Register the observer outcomes go to, replacing the previous one.
    ///
    /// Only a weak reference is kept: the caller owns the observer and should
    /// call [`clear_observer`](Self::clear_observer) before dropping it.
    pub fn set_observer<O: ScanObserver + 'static>(&self, observer: &Arc<O>) {
        let weak: Weak<O> = Arc::downgrade(observer);
        *self
            .shared
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(weak);
    }

    pub fn clear_observer(&self) {
        *self
            .shared
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn state(&self) -> ScanState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_scanning()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Start the worker thread. Does nothing if it is already running.
    ///
    /// A worker that was stopped but not yet joined is joined first, so
    /// this may block for up to one poll interval or one acquisition.
    pub fn start(&mut self) -> Result<(), ReaderError> {
        if self.shared.is_scanning() {
            debug!("Scanner already running");
            return Ok(());
        }

        self.reclaim();
        if !matches!(self.worker, Worker::Parked(_)) {
            return Err(ReaderError::Worker(
                "reader driver was lost with a failed worker".into(),
            ));
        }

        let signal = Arc::clone(&self.signal);
        self.irq_line
            .on_falling_edge(Box::new(move || signal.notify()))
            .map_err(ReaderError::transport)?;

        let Worker::Parked(driver) = std::mem::replace(&mut self.worker, Worker::Lost) else {
            return Err(ReaderError::Worker("reader driver not available".into()));
        };

        self.shared.scanning.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let signal = Arc::clone(&self.signal);
        let config = self.config.clone();

        match thread::Builder::new()
            .name("rc522-scan".into())
            .spawn(move || run_worker(driver, shared, signal, config))
        {
            Ok(handle) => {
                self.worker = Worker::Running(handle);
                info!("Scanner started");
                Ok(())
            }
            Err(e) => {
                self.shared.scanning.store(false, Ordering::SeqCst);
                Err(ReaderError::Worker(format!("failed to spawn scan thread: {}", e)))
            }
        }
    }

    /// Ask the worker to finish. See [`StopHandle::stop`].
    pub fn stop(&self) -> bool {
        self.stop_handle().stop()
    }

    /// Stop and join the worker, release the interrupt callback and switch
    /// the antenna off. Returns the driver for further use.
    pub fn teardown(mut self) -> Result<ReaderDriver<T>, ReaderError> {
        self.torn_down = true;
        self.stop();
        self.reclaim();

        let cleared = self.irq_line.clear_callbacks();

        let Worker::Parked(mut driver) = std::mem::replace(&mut self.worker, Worker::Lost) else {
            return Err(ReaderError::Worker(
                "reader driver was lost with a failed worker".into(),
            ));
        };

        if driver.is_authenticated() {
            driver.stop_crypto()?;
        }
        driver.set_antenna_off()?;
        cleared.map_err(ReaderError::transport)?;

        self.shared.set_state(ScanState::Stopped);
        info!("Scanner torn down");
        Ok(driver)
    }

    /// Join a finished (or finishing) worker and park its driver
    fn reclaim(&mut self) {
        if !matches!(self.worker, Worker::Running(_)) {
            return;
        }
        let Worker::Running(handle) = std::mem::replace(&mut self.worker, Worker::Lost) else {
            return;
        };
        match handle.join() {
            Ok(driver) => self.worker = Worker::Parked(driver),
            Err(_) => {
                error!("Scan worker panicked, reader driver lost");
                self.shared.set_state(ScanState::Stopped);
            }
        }
    }
}

impl<T, I> Drop for ScanLoop<T, I>
where
    T: SpiTransport + Send + 'static,
    I: InterruptLine,
{
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        self.stop();
        self.reclaim();
        if let Worker::Parked(driver) = &mut self.worker {
            if let Err(e) = driver.set_antenna_off() {
                warn!("Failed to switch antenna off: {}", e);
            }
        }
        if let Err(e) = self.irq_line.clear_callbacks() {
            warn!("Failed to clear interrupt callbacks: {:?}", e);
        }
    }
}

fn run_worker<T: SpiTransport>(
    mut driver: ReaderDriver<T>,
    shared: Arc<Shared>,
    signal: Arc<IrqSignal>,
    config: ScanConfig,
) -> ReaderDriver<T> {
    debug!("Scan worker started");

    while shared.is_scanning() {
        match wait_for_card(&mut driver, &shared, &signal, &config) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) if !e.is_retryable() => {
                shared.deliver_fatal(e);
                break;
            }
            Err(e) => {
                shared.deliver(ScanOutcome::Failure(e));
                shared.cooldown(config.failure_cooldown, config.poll_interval);
                continue;
            }
        }

        shared.set_state(ScanState::Acquiring);
        let outcome: ScanOutcome = match driver.request().and_then(|_| driver.anticollision()) {
            Err(e) if !e.is_retryable() => {
                shared.deliver_fatal(e);
                break;
            }
            result => result.into(),
        };

        let pause = if outcome.is_success() {
            config.success_cooldown
        } else {
            config.failure_cooldown
        };
        shared.deliver(outcome);
        shared.cooldown(pause, config.poll_interval);
    }

    shared.set_state(ScanState::Stopped);
    debug!("Scan worker finished");
    driver
}

/// Block until the IRQ line reports a card (`Ok(true)`) or a stop is
/// requested (`Ok(false)`).
fn wait_for_card<T: SpiTransport>(
    driver: &mut ReaderDriver<T>,
    shared: &Shared,
    signal: &IrqSignal,
    config: &ScanConfig,
) -> Result<bool, ReaderError> {
    driver.configure()?;
    signal.reset();
    shared.set_state(ScanState::WaitingForCard);
    debug!("Waiting for card");

    loop {
        if !shared.is_scanning() {
            return Ok(false);
        }
        driver.arm_card_detect()?;
        if signal.wait_timeout(config.poll_interval) {
            debug!("Card detect interrupt");
            driver.configure()?;
            return Ok(shared.is_scanning());
        }
    }
}
