// Runtime - Hosts a beat scheduler on its own scheduling thread
// Callers talk to it through a command channel; state flows back through
// transport events and the shared atomics. The scheduler itself never leaves
// its thread, so all mutation happens on one timeline.

use super::scheduler::BeatScheduler;
use super::settings::MetronomeSettings;
use super::sound::SoundPlayer;
use super::timer::{DeadlineTimer, TimerFacility};
use super::transport::{
    ChannelListener, SharedTransportState, TransportEvent, TransportListener, TransportSnapshot,
};
use super::{MetronomeError, MetronomeResult};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, info};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Default capacity of the event channel; events beyond it are dropped
const EVENT_CAPACITY: usize = 256;

type Reply = Sender<MetronomeResult<()>>;

/// Commands sent to the scheduling thread
enum EngineCommand {
    Start(Reply),
    Stop,
    Apply(Box<MetronomeSettings>, Reply),
    SetBpm(u32, Reply),
    Shutdown,
}

/// Builder for a threaded metronome
pub struct MetronomeRuntime<P: SoundPlayer> {
    scheduler: BeatScheduler<DeadlineTimer, P>,
    event_capacity: usize,
}

impl<P: SoundPlayer + Send + 'static> MetronomeRuntime<P> {
    pub fn new(player: P) -> Self {
        Self {
            scheduler: BeatScheduler::new(DeadlineTimer::new(), player),
            event_capacity: EVENT_CAPACITY,
        }
    }

    /// Applies initial settings before the thread starts
    pub fn with_settings(mut self, settings: &MetronomeSettings) -> MetronomeResult<Self> {
        self.scheduler.apply_settings(settings)?;
        Ok(self)
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Registers a listener that runs on the scheduling thread
    pub fn add_listener(&mut self, listener: impl TransportListener + 'static) {
        self.scheduler.add_listener(listener);
    }

    /// Spawns the scheduling thread
    pub fn spawn(mut self) -> MetronomeResult<MetronomeHandle> {
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::bounded(self.event_capacity);
        self.scheduler.add_listener(ChannelListener(event_tx));
        let shared = self.scheduler.shared_state();

        let scheduler = self.scheduler;
        let thread = thread::Builder::new()
            .name("metronome-scheduler".to_string())
            .spawn(move || run_engine(scheduler, command_rx))
            .map_err(|err| MetronomeError::Spawn(err.to_string()))?;

        Ok(MetronomeHandle {
            commands: command_tx,
            events: event_rx,
            shared,
            thread: Some(thread),
        })
    }
}

/// Scheduling thread main loop
/// Sleeps on the command channel until the earliest timer deadline, then
/// fires whatever is due. Commands and timer callbacks never interleave.
fn run_engine<P: SoundPlayer>(
    mut scheduler: BeatScheduler<DeadlineTimer, P>,
    commands: Receiver<EngineCommand>,
) {
    debug!("Metronome scheduling thread running");

    loop {
        let command = match scheduler.timer().next_due() {
            Some((slot, wait)) if wait.is_zero() => {
                // Errors are already logged and reported as a stop event
                let _ = scheduler.fire(slot);
                continue;
            }
            Some((_, wait)) => match commands.recv_timeout(wait) {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match commands.recv() {
                Ok(command) => command,
                Err(_) => break,
            },
        };

        match command {
            EngineCommand::Start(reply) => {
                let _ = reply.send(scheduler.start());
            }
            EngineCommand::Stop => scheduler.stop(),
            EngineCommand::Apply(settings, reply) => {
                let _ = reply.send(scheduler.apply_settings(&settings));
            }
            EngineCommand::SetBpm(bpm, reply) => {
                let _ = reply.send(scheduler.set_bpm(bpm));
            }
            EngineCommand::Shutdown => break,
        }
    }

    scheduler.stop();
    info!("Metronome scheduling thread finished");
}

/// Control handle of a running metronome thread
/// Dropping the handle stops playback and joins the thread.
pub struct MetronomeHandle {
    commands: Sender<EngineCommand>,
    events: Receiver<TransportEvent>,
    shared: Arc<SharedTransportState>,
    thread: Option<JoinHandle<()>>,
}

impl MetronomeHandle {
    fn request(&self, command: impl FnOnce(Reply) -> EngineCommand) -> MetronomeResult<()> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.commands
            .send(command(reply_tx))
            .map_err(|_| MetronomeError::EngineGone)?;
        reply_rx.recv().map_err(|_| MetronomeError::EngineGone)?
    }

    pub fn start(&self) -> MetronomeResult<()> {
        self.request(EngineCommand::Start)
    }

    pub fn stop(&self) -> MetronomeResult<()> {
        self.commands
            .send(EngineCommand::Stop)
            .map_err(|_| MetronomeError::EngineGone)
    }

    /// Sends a copy of `settings`; later edits of the original do not reach the engine
    pub fn apply_settings(&self, settings: &MetronomeSettings) -> MetronomeResult<()> {
        self.request(|reply| EngineCommand::Apply(Box::new(settings.clone()), reply))
    }

    pub fn set_bpm(&self, bpm: u32) -> MetronomeResult<()> {
        self.request(|reply| EngineCommand::SetBpm(bpm, reply))
    }

    /// Latest published state, without a round trip to the engine thread
    pub fn snapshot(&self) -> TransportSnapshot {
        self.shared.snapshot()
    }

    pub fn is_playing(&self) -> bool {
        self.shared.is_playing()
    }

    pub fn shared_state(&self) -> Arc<SharedTransportState> {
        Arc::clone(&self.shared)
    }

    /// Transport events, oldest first
    pub fn events(&self) -> &Receiver<TransportEvent> {
        &self.events
    }

    /// Stops playback and joins the scheduling thread
    pub fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        let _ = self.commands.send(EngineCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for MetronomeHandle {
    fn drop(&mut self) {
        self.join();
    }
}
