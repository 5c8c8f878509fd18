//! Chrome Native Messaging host.
//!
//! The main thread reads framed requests from the extension and hands them to
//! the [`Engine`]. Replies, rule installs, notifications and focus broadcasts
//! all go through one outbox drained by a writer thread, so frames never
//! interleave. A ticker thread fires due timers.

pub mod protocol;

use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::clock::Clock;
use crate::engine::{Engine, EngineOptions};
use crate::error::{AppError, Result};
use crate::models::FocusModeConfig;
use crate::notify::{Notification, Notifier};
use crate::rules::{Rule, RuleEngine, RuleLayer};
use crate::safe_lock;
use crate::store::PolicyStore;
use protocol::{read_message, write_message, FrameError, OutgoingMessage};

/// How long the writer waits for output before checking for shutdown.
const WRITER_POLL: Duration = Duration::from_millis(100);

/// Longest uninterrupted sleep of the ticker, so `stop` takes effect quickly.
const TICK_SLICE: Duration = Duration::from_millis(100);

/// Installs rules by asking the extension to apply them.
///
/// The browser cannot be queried from here, so the installed IDs are the ones
/// last sent, corrected by `INSTALLED_RULES` reports.
pub struct ExtensionRuleEngine {
    outbox: Sender<OutgoingMessage>,
    installed: Mutex<BTreeMap<RuleLayer, Vec<u32>>>,
}

impl ExtensionRuleEngine {
    pub fn new(outbox: Sender<OutgoingMessage>) -> Self {
        Self {
            outbox,
            installed: Mutex::new(BTreeMap::new()),
        }
    }
}

impl RuleEngine for ExtensionRuleEngine {
    fn installed_ids(&self, layer: RuleLayer) -> Result<Vec<u32>> {
        Ok(safe_lock(&self.installed, "Installed rules")
            .get(&layer)
            .cloned()
            .unwrap_or_default())
    }

    fn replace(&self, layer: RuleLayer, remove_ids: &[u32], add: &[Rule]) -> Result<()> {
        self.outbox
            .send(OutgoingMessage::ApplyRules {
                layer,
                remove_rule_ids: remove_ids.to_vec(),
                add_rules: add.to_vec(),
            })
            .map_err(|_| AppError::RuleInstall("extension connection closed".into()))?;

        safe_lock(&self.installed, "Installed rules")
            .insert(layer, add.iter().map(|rule| rule.id).collect());
        Ok(())
    }

    fn record_installed(&self, layer: RuleLayer, ids: Vec<u32>) {
        debug!("Extension reports {} {} rule(s)", ids.len(), layer.as_str());
        safe_lock(&self.installed, "Installed rules").insert(layer, ids);
    }
}

/// Forwards notifications to the extension, which displays them.
pub struct OutboxNotifier {
    outbox: Sender<OutgoingMessage>,
}

impl OutboxNotifier {
    pub fn new(outbox: Sender<OutgoingMessage>) -> Self {
        Self { outbox }
    }
}

impl Notifier for OutboxNotifier {
    fn notify(&self, notification: Notification) {
        if self.outbox.send(notification.into()).is_err() {
            warn!("Dropping notification, extension connection closed");
        }
    }
}

/// Fires due timers on a fixed interval.
pub struct Ticker {
    engine: Arc<Engine>,
    interval: Duration,
    running: Arc<AtomicBool>,
}

impl Ticker {
    pub fn new(engine: Arc<Engine>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn start(&self) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let engine = Arc::clone(&self.engine);
        let interval = self.interval;

        thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                let fired = engine.fire_due_timers();
                if fired > 0 {
                    debug!("Fired {fired} timer(s)");
                }

                let mut waited = Duration::ZERO;
                while waited < interval && running.load(Ordering::SeqCst) {
                    let step = TICK_SLICE.min(interval - waited);
                    thread::sleep(step);
                    waited += step;
                }
            }
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

pub struct NativeHost {
    engine: Arc<Engine>,
    outbox: Sender<OutgoingMessage>,
    outbox_rx: Receiver<OutgoingMessage>,
    tick_interval: Duration,
}

impl NativeHost {
    pub fn new(
        store: PolicyStore,
        clock: Arc<dyn Clock>,
        options: EngineOptions,
        tick_interval: Duration,
    ) -> Self {
        let (outbox, outbox_rx) = channel();
        let rule_engine: Arc<dyn RuleEngine> = Arc::new(ExtensionRuleEngine::new(outbox.clone()));
        let notifier: Arc<dyn Notifier> = Arc::new(OutboxNotifier::new(outbox.clone()));
        let engine = Arc::new(Engine::new(store, rule_engine, notifier, clock, options));

        Self {
            engine,
            outbox,
            outbox_rx,
            tick_interval,
        }
    }

    /// Serve the extension until `input` reaches EOF.
    pub fn run<R, W>(self, mut input: R, output: W) -> io::Result<()>
    where
        R: Read,
        W: Write + Send + 'static,
    {
        let NativeHost {
            engine,
            outbox,
            outbox_rx,
            tick_interval,
        } = self;

        let writer_running = Arc::new(AtomicBool::new(true));
        let writer = spawn_writer(outbox_rx, output, Arc::clone(&writer_running));
        spawn_focus_forwarder(engine.subscribe_focus(), outbox.clone());

        if let Err(e) = engine.start() {
            error!("Engine startup failed: {e}");
        }
        let ticker = Ticker::new(Arc::clone(&engine), tick_interval);
        let ticker_handle = ticker.start();

        let result = loop {
            match read_message(&mut input) {
                Ok(message) => {
                    if outbox.send(engine.handle(message)).is_err() {
                        break Err(io::Error::new(
                            io::ErrorKind::BrokenPipe,
                            "writer thread stopped",
                        ));
                    }
                }
                Err(FrameError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    info!("Extension closed the connection");
                    break Ok(());
                }
                Err(FrameError::Io(e)) => break Err(e),
                Err(e @ (FrameError::TooLarge(_) | FrameError::Malformed(_))) => {
                    warn!("Rejected frame: {e}");
                    // A dead writer surfaces on the next reply.
                    let _ = outbox.send(OutgoingMessage::Error {
                        message: e.to_string(),
                    });
                }
            }
        };

        ticker.stop();
        if ticker_handle.join().is_err() {
            error!("Ticker thread panicked");
        }

        writer_running.store(false, Ordering::SeqCst);
        let written = writer
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("writer thread panicked")));

        result.and(written)
    }
}

fn spawn_writer<W>(
    outbox: Receiver<OutgoingMessage>,
    mut output: W,
    running: Arc<AtomicBool>,
) -> JoinHandle<io::Result<()>>
where
    W: Write + Send + 'static,
{
    thread::spawn(move || {
        loop {
            match outbox.recv_timeout(WRITER_POLL) {
                Ok(message) => write_message(&mut output, &message)?,
                Err(RecvTimeoutError::Timeout) => {
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        // Flush whatever was queued before shutdown.
        while let Ok(message) = outbox.try_recv() {
            write_message(&mut output, &message)?;
        }
        Ok(())
    })
}

/// Best effort: ends quietly once either side goes away.
fn spawn_focus_forwarder(updates: Receiver<FocusModeConfig>, outbox: Sender<OutgoingMessage>) {
    thread::spawn(move || {
        for state in updates {
            if outbox.send(OutgoingMessage::FocusStateUpdate { state }).is_err() {
                break;
            }
        }
    });
}
