//! Session controller: the single owner of the session state
//!
//! Front ends talk to it through a [`SessionHandle`]; commands arrive on an
//! mpsc channel and every state change is published on a watch channel.
//! Timers, capture completion and analysis results come back as events
//! tagged with their cycle number, so anything left over from an earlier
//! cycle is dropped instead of touching the current one.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::state::{Session, SessionError, SessionSnapshot, SessionStatus};
use crate::audio::{AudioClip, CaptureError, CaptureService, LiveFeed, LiveStream, StopToken};
use crate::recognition::{RecognitionError, Recognizer, SongRecord};

/// Default automatic recording window
pub const DEFAULT_CAPTURE_WINDOW: Duration = Duration::from_secs(10);

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

enum SessionCommand {
    Start(Reply<SessionSnapshot>),
    Stop(Reply<SessionSnapshot>),
    Reset(Reply<SessionSnapshot>),
}

enum SessionEvent {
    WindowElapsed {
        cycle: u64,
    },
    InputEnded {
        cycle: u64,
    },
    AnalysisFinished {
        cycle: u64,
        outcome: Result<Option<SongRecord>, RecognitionError>,
    },
}

/// Capture in progress for one cycle
struct ActiveCapture {
    cycle: u64,
    token: StopToken,
    timer: JoinHandle<()>,
    watcher: Option<JoinHandle<()>>,
}

impl ActiveCapture {
    fn cancel_tasks(&mut self) {
        self.timer.abort();
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

pub struct SessionController {
    session: Session,
    capture: CaptureService,
    recognizer: Arc<dyn Recognizer>,
    window: Duration,
    commands: mpsc::Receiver<SessionCommand>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    capture_errors: mpsc::UnboundedReceiver<CaptureError>,
    state_tx: watch::Sender<SessionSnapshot>,
    active: Option<ActiveCapture>,
}

impl SessionController {
    /// Spawn the controller task and return a handle to it
    ///
    /// The task exits (releasing the capture device) once every handle is dropped.
    pub fn spawn(
        mut capture: CaptureService,
        recognizer: Arc<dyn Recognizer>,
        window: Duration,
    ) -> SessionHandle {
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Session::new();
        let (state_tx, state_rx) = watch::channel(session.snapshot());

        let capture_errors = capture.take_errors().unwrap_or_else(|| {
            let (_tx, rx) = mpsc::unbounded_channel();
            rx
        });
        let live = capture.live_feed();

        info!(
            "Session controller ready ({}, {:.1}s window)",
            capture.backend_name(),
            window.as_secs_f64()
        );

        let controller = Self {
            session,
            capture,
            recognizer,
            window,
            commands: commands_rx,
            events_tx,
            events_rx,
            capture_errors,
            state_tx,
            active: None,
        };
        tokio::spawn(controller.run());

        SessionHandle {
            commands: commands_tx,
            state: state_rx,
            live,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event).await,
                Some(err) = self.capture_errors.recv() => self.handle_capture_error(err).await,
            }
        }

        if let Some(mut active) = self.active.take() {
            active.cancel_tasks();
            if let Err(e) = self.capture.stop(&active.token).await {
                warn!("Failed to release capture on shutdown: {}", e);
            }
        }
        debug!("Session controller stopped");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start(reply) => {
                let result = self.start().await;
                let _ = reply.send(result);
            }
            SessionCommand::Stop(reply) => {
                if let Some(cycle) = self.active.as_ref().map(|a| a.cycle) {
                    info!("Manual stop for cycle {}", cycle);
                    self.finish_capture(cycle).await;
                }
                let _ = reply.send(Ok(self.session.snapshot()));
            }
            SessionCommand::Reset(reply) => {
                let result = self.reset().await;
                let _ = reply.send(result);
            }
        }
    }

    async fn start(&mut self) -> Result<SessionSnapshot, SessionError> {
        let cycle = self.session.start()?;
        self.publish();

        let (_live, token) = match self.capture.start().await {
            Ok(started) => started,
            Err(e) => {
                error!("Capture failed to start: {}", e);
                if let Err(transition) = self.session.capture_failed(e.to_string()) {
                    warn!("{}", transition);
                }
                self.publish();
                return Err(SessionError::Capture(e));
            }
        };

        let events = self.events_tx.clone();
        let window = self.window;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = events.send(SessionEvent::WindowElapsed { cycle });
        });

        let watcher = self.capture.input_ended().map(|mut ended| {
            let events = self.events_tx.clone();
            tokio::spawn(async move {
                // Err means the collector went away, which also ends the input
                let _ = ended.wait_for(|ended| *ended).await;
                let _ = events.send(SessionEvent::InputEnded { cycle });
            })
        });

        self.active = Some(ActiveCapture {
            cycle,
            token,
            timer,
            watcher,
        });

        Ok(self.session.snapshot())
    }

    async fn reset(&mut self) -> Result<SessionSnapshot, SessionError> {
        self.session.reset()?;

        if let Some(mut active) = self.active.take() {
            active.cancel_tasks();
            if let Err(e) = self.capture.stop(&active.token).await {
                warn!("Failed to release capture on reset: {}", e);
            }
        }

        self.publish();
        Ok(self.session.snapshot())
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::WindowElapsed { cycle } => {
                debug!("Capture window elapsed for cycle {}", cycle);
                self.finish_capture(cycle).await;
            }
            SessionEvent::InputEnded { cycle } => {
                debug!("Capture input ended for cycle {}", cycle);
                self.finish_capture(cycle).await;
            }
            SessionEvent::AnalysisFinished { cycle, outcome } => {
                if cycle != self.session.cycle() {
                    debug!("Dropping analysis result from stale cycle {}", cycle);
                    return;
                }
                match self.session.complete(outcome) {
                    Ok(status) => info!("Cycle {} finished: {:?}", cycle, status),
                    Err(e) => debug!("Analysis result ignored: {}", e),
                }
                self.publish();
            }
        }
    }

    async fn handle_capture_error(&mut self, err: CaptureError) {
        if !self.session.status().is_busy() {
            warn!("Capture error outside an active cycle: {}", err);
            return;
        }

        error!("Capture error in cycle {}: {}", self.session.cycle(), err);

        if let Some(mut active) = self.active.take() {
            active.cancel_tasks();
            if let Err(e) = self.capture.stop(&active.token).await {
                warn!("Failed to release capture after error: {}", e);
            }
        }

        if let Err(e) = self.session.capture_failed(err.to_string()) {
            warn!("{}", e);
        }
        self.publish();
    }

    /// Stop the capture for `cycle` and, once the clip is ready, start analysis
    ///
    /// Called for the timer, a manual stop and end of input; only the first
    /// call for a cycle does anything.
    async fn finish_capture(&mut self, cycle: u64) {
        if self.active.as_ref().map(|a| a.cycle) != Some(cycle) {
            return;
        }
        let Some(mut active) = self.active.take() else {
            return;
        };
        active.cancel_tasks();

        let clip = match self.capture.stop(&active.token).await {
            Ok(clip) => clip,
            Err(e) => {
                error!("Failed to finalize capture: {}", e);
                if let Err(transition) = self.session.capture_failed(e.to_string()) {
                    warn!("{}", transition);
                }
                self.publish();
                return;
            }
        };

        let mut to_analyze = None;
        match self.session.capture_ended() {
            Ok(clip) => to_analyze = to_analyze.or(clip),
            Err(e) => debug!("{}", e),
        }
        match self.session.buffer_ready(clip) {
            Ok(clip) => to_analyze = to_analyze.or(clip),
            Err(e) => debug!("{}", e),
        }

        if let Some(clip) = to_analyze {
            self.spawn_analysis(cycle, clip);
        }
        self.publish();
    }

    fn spawn_analysis(&self, cycle: u64, clip: AudioClip) {
        let recognizer = Arc::clone(&self.recognizer);
        let events = self.events_tx.clone();

        // Not tracked: once started, analysis always runs to completion
        tokio::spawn(async move {
            let outcome = recognizer.identify(&clip).await;
            let _ = events.send(SessionEvent::AnalysisFinished { cycle, outcome });
        });
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.session.snapshot());
    }
}

/// Cloneable front for a running [`SessionController`]
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<SessionSnapshot>,
    live: LiveFeed,
}

impl SessionHandle {
    /// Begin a new recording cycle (Idle only)
    pub async fn start(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(SessionCommand::Start).await
    }

    /// Stop recording early; no effect outside Recording
    pub async fn stop(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(SessionCommand::Stop).await
    }

    /// Return to Idle from Success or Error
    pub async fn reset(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(SessionCommand::Reset).await
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.borrow().status
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.clone()
    }

    /// Frames of the current recording, for display only
    pub fn live_stream(&self) -> LiveStream {
        self.live.subscribe()
    }

    /// Wait until the session is no longer in `status`
    pub async fn wait_to_leave(
        &self,
        status: SessionStatus,
    ) -> Result<SessionSnapshot, SessionError> {
        let mut rx = self.subscribe();
        let snapshot = rx
            .wait_for(|s| s.status != status)
            .await
            .map_err(|_| SessionError::ControllerGone)?;
        Ok(snapshot.clone())
    }

    /// Wait until the session reaches Success or Error
    pub async fn wait_for_terminal(&self) -> Result<SessionSnapshot, SessionError> {
        let mut rx = self.subscribe();
        let snapshot = rx
            .wait_for(|s| s.status.is_terminal())
            .await
            .map_err(|_| SessionError::ControllerGone)?;
        Ok(snapshot.clone())
    }

    async fn request(
        &self,
        make: impl FnOnce(Reply<SessionSnapshot>) -> SessionCommand,
    ) -> Result<SessionSnapshot, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| SessionError::ControllerGone)?;
        rx.await.map_err(|_| SessionError::ControllerGone)?
    }
}
