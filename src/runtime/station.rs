//! Task-per-instance runtime with live recording and paced replay.

use crate::engine::{AutomataInstance, EngineError, GuardActionHost, InstanceKey, RunState};
use crate::model::{Automata, TypedValue};
use crate::recording::{CaptureReport, RecorderError, RecordingOptions};
use crate::runtime::gateway::Gateway;
use crate::snapshot::{
    CaptureFrame, CommunicationEvent, ConnectionStatus, DeviceSnapshotState, EventKind,
    ExecutionSnapshot, NetworkEvent, NetworkSnapshot, Severity,
};
use crate::timetravel::{TimeTravel, TimeTravelError};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

enum Command {
    Pause,
    Resume,
    Shutdown,
}

struct Driver {
    commands: mpsc::UnboundedSender<Command>,
    handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct Pending {
    events: Vec<NetworkEvent>,
    communications: Vec<CommunicationEvent>,
}

/// Events and communications not yet captured, queued per recording session.
///
/// Every open session sees every event once, whichever session's timer fires
/// first.
#[derive(Debug, Default)]
struct Journal {
    pending: BTreeMap<Uuid, Pending>,
}

impl Journal {
    fn open(&mut self, id: Uuid) {
        self.pending.entry(id).or_default();
    }

    fn close(&mut self, id: Uuid) {
        self.pending.remove(&id);
    }

    fn record(&mut self, events: &[NetworkEvent]) {
        for pending in self.pending.values_mut() {
            pending.events.extend_from_slice(events);
        }
    }

    fn deliver(&mut self, communications: &[CommunicationEvent]) {
        for pending in self.pending.values_mut() {
            pending.communications.extend_from_slice(communications);
        }
    }

    fn take(&mut self, id: Uuid) -> Pending {
        std::mem::take(self.pending.entry(id).or_default())
    }
}

/// State shared between the station and its background tasks.
struct Shared {
    gateway: Arc<dyn Gateway>,
    feeds: Mutex<BTreeMap<InstanceKey, watch::Receiver<Arc<ExecutionSnapshot>>>>,
    journal: Mutex<Journal>,
    connections: Mutex<BTreeMap<String, ConnectionStatus>>,
    time_travel: Mutex<TimeTravel>,
    /// Capture task cancellation per recording session.
    captures: Mutex<BTreeMap<Uuid, CancellationToken>>,
}

impl Shared {
    async fn record(&self, events: &[NetworkEvent]) {
        self.journal.lock().await.record(events);
    }

    /// Latest published snapshot of every instance, with per-device summaries.
    async fn gather_state(&self) -> (Vec<Arc<ExecutionSnapshot>>, Vec<DeviceSnapshotState>) {
        let executions: Vec<Arc<ExecutionSnapshot>> = self
            .feeds
            .lock()
            .await
            .values()
            .map(|feed| Arc::clone(&feed.borrow()))
            .collect();

        let mut by_device: BTreeMap<&str, Vec<&ExecutionSnapshot>> = BTreeMap::new();
        for execution in &executions {
            by_device
                .entry(execution.instance.device_id.as_str())
                .or_default()
                .push(execution);
        }

        let mut devices = Vec::with_capacity(by_device.len());
        for (device_id, latest) in by_device {
            let status = self.connection(device_id).await;
            devices.push(DeviceSnapshotState::summarize(device_id, status, latest));
        }

        (executions, devices)
    }

    /// Move the gateway's observed communications into every open queue.
    async fn collect_communications(&self) {
        match self.gateway.drain_communications().await {
            Ok(communications) if !communications.is_empty() => {
                self.journal.lock().await.deliver(&communications);
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "failed to drain communications"),
        }
    }

    /// Current device status, recording an event when it changed.
    async fn connection(&self, device_id: &str) -> ConnectionStatus {
        let status = match self.gateway.device_status(device_id).await {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!(device = device_id, error = %err, "device status unavailable");
                ConnectionStatus::Disconnected
            }
        };

        let previous = self
            .connections
            .lock()
            .await
            .insert(device_id.to_string(), status);
        if previous.is_some_and(|p| p != status) {
            let severity = match status {
                ConnectionStatus::Connected => Severity::Info,
                ConnectionStatus::Disconnected => Severity::Warning,
            };
            tracing::info!(device = device_id, ?status, "device connection changed");
            self.record(&[NetworkEvent::new(
                severity,
                EventKind::ConnectionChanged,
                device_id,
                format!("device {device_id} is now {status:?}"),
            )])
            .await;
        }
        status
    }

    /// Capture one frame into `id`.
    ///
    /// Pending events stay queued unless the frame is actually appended.
    async fn capture(&self, id: Uuid) -> Result<CaptureReport, TimeTravelError> {
        let (executions, devices) = self.gather_state().await;
        self.collect_communications().await;

        let mut time_travel = self.time_travel.lock().await;
        let mut journal = self.journal.lock().await;
        journal
            .pending
            .retain(|session, _| time_travel.session(*session).is_some_and(|s| s.is_recording()));
        match time_travel.session(id) {
            None => return Err(RecorderError::UnknownSession(id).into()),
            Some(session) if !session.is_recording() => {
                return Err(RecorderError::NotRecording(id).into());
            }
            Some(_) => {}
        }

        let pending = journal.take(id);
        time_travel.capture(
            id,
            CaptureFrame {
                executions,
                devices,
                communications: pending.communications,
                events: pending.events,
            },
        )
    }
}

/// Async host for running instances with live recording and paced replay.
///
/// Each instance is driven by its own task: wait for the tick interval, ask
/// the gateway for device status and inputs, tick, hand outputs to the
/// gateway, publish the snapshot on a `watch` channel. Recording reads only
/// those published snapshots.
pub struct Station {
    host: Arc<dyn GuardActionHost>,
    shared: Arc<Shared>,
    tick_interval: Duration,
    drivers: BTreeMap<InstanceKey, Driver>,
    playback: Option<(Uuid, CancellationToken)>,
    replay_tx: watch::Sender<Option<Arc<NetworkSnapshot>>>,
}

impl Station {
    /// Create an empty station. Instances tick every `tick_interval`.
    pub fn new(
        host: Arc<dyn GuardActionHost>,
        gateway: Arc<dyn Gateway>,
        tick_interval: Duration,
    ) -> Self {
        let (replay_tx, _) = watch::channel(None);
        Self {
            host,
            shared: Arc::new(Shared {
                gateway,
                feeds: Mutex::new(BTreeMap::new()),
                journal: Mutex::new(Journal::default()),
                connections: Mutex::new(BTreeMap::new()),
                time_travel: Mutex::new(TimeTravel::new()),
                captures: Mutex::new(BTreeMap::new()),
            }),
            tick_interval,
            drivers: BTreeMap::new(),
            playback: None,
            replay_tx,
        }
    }

    /// Start an instance of `automata` on `device_id` in its own task.
    pub async fn spawn(
        &mut self,
        device_id: &str,
        automata: Arc<Automata>,
    ) -> Result<InstanceKey, EngineError> {
        let mut instance = AutomataInstance::new(device_id, automata);
        let key = instance.key().clone();
        if self.drivers.contains_key(&key) {
            return Err(EngineError::DuplicateInstance(key));
        }

        if let Err(err) = self
            .shared
            .gateway
            .register(&key, instance.automata().inputs())
            .await
        {
            tracing::warn!(instance = %key, error = %err, "gateway registration failed");
        }

        instance.start()?;
        let (snapshot_tx, snapshot_rx) = watch::channel(instance.latest());
        let (commands, command_rx) = mpsc::unbounded_channel();
        self.shared.feeds.lock().await.insert(key.clone(), snapshot_rx);
        self.lifecycle_event(&key, "started").await;

        let driver = InstanceDriver {
            instance,
            host: Arc::clone(&self.host),
            shared: Arc::clone(&self.shared),
            commands: command_rx,
            snapshots: snapshot_tx,
        };
        let handle = tokio::spawn(driver.run(self.tick_interval));
        tracing::info!(instance = %key, "instance spawned");

        self.drivers.insert(key.clone(), Driver { commands, handle });
        Ok(key)
    }

    /// Ask an instance's task to pause. Its last snapshot stays published.
    pub fn pause_instance(&self, key: &InstanceKey) -> Result<(), EngineError> {
        self.send(key, Command::Pause)
    }

    /// Resume a paused instance.
    pub fn resume_instance(&self, key: &InstanceKey) -> Result<(), EngineError> {
        self.send(key, Command::Resume)
    }

    fn send(&self, key: &InstanceKey, command: Command) -> Result<(), EngineError> {
        self.drivers
            .get(key)
            .and_then(|d| d.commands.send(command).ok())
            .ok_or_else(|| EngineError::UnknownInstance(key.clone()))
    }

    /// Subscribe to an instance's published snapshots.
    pub async fn watch(&self, key: &InstanceKey) -> Option<watch::Receiver<Arc<ExecutionSnapshot>>> {
        self.shared.feeds.lock().await.get(key).cloned()
    }

    /// The most recently published snapshot of an instance.
    pub async fn latest(&self, key: &InstanceKey) -> Option<Arc<ExecutionSnapshot>> {
        let feed = self.watch(key).await?;
        let latest = Arc::clone(&feed.borrow());
        Some(latest)
    }

    /// Exclusive access to recorded sessions and replay cursors.
    pub async fn time_travel(&self) -> MutexGuard<'_, TimeTravel> {
        self.shared.time_travel.lock().await
    }

    /// Open a session and capture into it every `capture_interval`.
    pub async fn start_recording(&self, options: RecordingOptions) -> Result<Uuid, TimeTravelError> {
        let id = {
            let mut time_travel = self.shared.time_travel.lock().await;
            let id = time_travel.start_recording(options)?;
            self.shared.journal.lock().await.open(id);
            id
        };
        let token = CancellationToken::new();
        self.shared
            .captures
            .lock()
            .await
            .insert(id, token.clone());

        let shared = Arc::clone(&self.shared);
        tokio::spawn(capture_loop(shared, id, options.capture_interval, token));
        Ok(id)
    }

    /// Capture one frame immediately, outside the timer.
    pub async fn capture_now(&self, id: Uuid) -> Result<CaptureReport, TimeTravelError> {
        self.shared.capture(id).await
    }

    /// Stop a session and its capture timer together.
    pub async fn stop_recording(&self, id: Uuid) -> Result<(), TimeTravelError> {
        let mut time_travel = self.shared.time_travel.lock().await;
        time_travel.stop_recording(id)?;
        if let Some(token) = self.shared.captures.lock().await.remove(&id) {
            token.cancel();
        }
        self.shared.journal.lock().await.close(id);
        Ok(())
    }

    /// Frames reached by paced playback.
    pub fn replay_feed(&self) -> watch::Receiver<Option<Arc<NetworkSnapshot>>> {
        self.replay_tx.subscribe()
    }

    /// Replay a session at `speed`, publishing each frame on the replay feed.
    pub async fn play(&mut self, id: Uuid, speed: f64) -> Result<Duration, TimeTravelError> {
        self.stop_playback().await;

        let pacing = {
            let mut time_travel = self.shared.time_travel.lock().await;
            let pacing = time_travel.play(id, speed)?;
            let current = time_travel.get_frame(id, time_travel.cursor(id)?)?;
            self.replay_tx.send_replace(Some(current));
            pacing
        };

        let token = CancellationToken::new();
        self.playback = Some((id, token.clone()));
        tokio::spawn(playback_loop(
            Arc::clone(&self.shared),
            id,
            pacing,
            token,
            self.replay_tx.clone(),
        ));
        Ok(pacing)
    }

    /// Stop paced playback, keeping the cursor where it is.
    pub async fn pause_playback(&mut self) {
        self.stop_playback().await;
    }

    async fn stop_playback(&mut self) {
        if let Some((id, token)) = self.playback.take() {
            token.cancel();
            if let Err(err) = self.shared.time_travel.lock().await.pause(id) {
                tracing::debug!(session = %id, error = %err, "pause after playback failed");
            }
        }
    }

    async fn lifecycle_event(&self, key: &InstanceKey, verb: &str) {
        self.shared
            .record(&[NetworkEvent::for_instance(
                Severity::Info,
                EventKind::Lifecycle,
                key,
                format!("instance {key} {verb}"),
            )])
            .await;
    }

    /// Stop every instance task, capture timer and playback.
    pub async fn shutdown(mut self) {
        self.stop_playback().await;
        for token in self.shared.captures.lock().await.values() {
            token.cancel();
        }

        for (key, driver) in std::mem::take(&mut self.drivers) {
            let _ = driver.commands.send(Command::Shutdown);
            if let Err(err) = driver.handle.await {
                tracing::error!(instance = %key, error = %err, "instance task panicked");
            }
            self.lifecycle_event(&key, "stopped").await;
        }
        tracing::info!("station shut down");
    }
}

struct InstanceDriver {
    instance: AutomataInstance,
    host: Arc<dyn GuardActionHost>,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<Command>,
    snapshots: watch::Sender<Arc<ExecutionSnapshot>>,
}

impl InstanceDriver {
    async fn run(mut self, tick_interval: Duration) {
        let mut interval = tokio::time::interval(tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let result = match command {
                        Some(Command::Pause) => self.instance.pause(),
                        Some(Command::Resume) => self.instance.resume(),
                        Some(Command::Shutdown) | None => {
                            if let Err(err) = self.instance.stop() {
                                tracing::debug!(error = %err, "instance already stopped");
                            }
                            self.snapshots.send_replace(self.instance.latest());
                            break;
                        }
                    };
                    if let Err(err) = result {
                        tracing::warn!(error = %err, "ignored lifecycle command");
                    }
                    self.snapshots.send_replace(self.instance.latest());
                }
                _ = interval.tick() => {
                    if self.instance.run_state() == RunState::Running {
                        self.drive_once().await;
                        self.snapshots.send_replace(self.instance.latest());
                    }
                }
            }
        }
    }

    async fn drive_once(&mut self) {
        let key = self.instance.key().clone();
        let gateway = Arc::clone(&self.shared.gateway);

        match gateway.device_status(&key.device_id).await {
            Ok(ConnectionStatus::Connected) => {}
            Ok(ConnectionStatus::Disconnected) => return,
            Err(err) => {
                tracing::warn!(instance = %key, error = %err, "device status unavailable");
                return;
            }
        }

        match gateway.fetch_inputs(&key).await {
            Ok(inputs) => {
                for (name, value) in inputs {
                    self.instance.set_input(name, value);
                }
            }
            Err(err) => tracing::warn!(instance = %key, error = %err, "failed to fetch inputs"),
        }

        let outcome = match self.instance.tick(self.host.as_ref()) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(instance = %key, error = %err, "tick failed");
                self.shared
                    .record(&[NetworkEvent::for_instance(
                        Severity::Error,
                        EventKind::ScriptFailure,
                        &key,
                        err.to_string(),
                    )])
                    .await;
                return;
            }
        };

        if !outcome.events.is_empty() {
            self.shared.record(&outcome.events).await;
        }

        let channels = self.instance.automata().outputs();
        let routed: BTreeMap<String, TypedValue> = outcome
            .emitted
            .into_iter()
            .filter(|(name, _)| channels.contains(name))
            .collect();
        if !routed.is_empty() {
            if let Err(err) = gateway.deliver_outputs(&key, &routed).await {
                tracing::warn!(instance = %key, error = %err, "failed to deliver outputs");
            }
        }
    }
}

async fn capture_loop(shared: Arc<Shared>, id: Uuid, every: Duration, token: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                match shared.capture(id).await {
                    Ok(report) => {
                        tracing::trace!(session = %id, frame = report.frame_number, "frame captured");
                    }
                    Err(TimeTravelError::Recorder(RecorderError::NotRecording(_))) => break,
                    Err(err) => {
                        tracing::warn!(session = %id, error = %err, "capture failed");
                        break;
                    }
                }
            }
        }
    }
    tracing::debug!(session = %id, "capture task finished");
}

async fn playback_loop(
    shared: Arc<Shared>,
    id: Uuid,
    pacing: Duration,
    token: CancellationToken,
    feed: watch::Sender<Option<Arc<NetworkSnapshot>>>,
) {
    let mut interval = tokio::time::interval(pacing);
    // The first tick completes immediately; the current frame is already published.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                match shared.time_travel.lock().await.advance_playback(id) {
                    Ok(Some(frame)) => {
                        feed.send_replace(Some(frame));
                    }
                    Ok(None) => break,
                    Err(err) => {
                        tracing::warn!(session = %id, error = %err, "playback stopped");
                        break;
                    }
                }
            }
        }
    }
    tracing::debug!(session = %id, "playback finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{AutomataBuilder, StateBuilder, TransitionBuilder};
    use crate::engine::{Effects, FnHost, ScriptError};
    use crate::runtime::gateway::LoopbackGateway;

    fn host() -> Arc<dyn GuardActionHost> {
        Arc::new(FnHost::new(
            |condition, ctx| Ok(ctx.input(condition).is_some_and(TypedValue::is_truthy)),
            |action, _| match action {
                "ping" => Ok(Effects::none().emit("ping", true)),
                "fail" => Err(ScriptError::new(action, "boom")),
                _ => Ok(Effects::none()),
            },
        ))
    }

    fn sender() -> Arc<Automata> {
        Arc::new(
            AutomataBuilder::new("sender")
                .initial("Send")
                .state(StateBuilder::new("Send").code("ping"))
                .output("ping")
                .build()
                .unwrap(),
        )
    }

    fn receiver() -> Arc<Automata> {
        Arc::new(
            AutomataBuilder::new("receiver")
                .initial("Wait")
                .plain_state("Wait")
                .plain_state("Got")
                .input("ping")
                .transition(TransitionBuilder::new("got").from("Wait").to("Got").when("ping"))
                .unwrap()
                .build()
                .unwrap(),
        )
    }

    fn station(gateway: Arc<LoopbackGateway>) -> Station {
        Station::new(host(), gateway, Duration::from_millis(10))
    }

    #[tokio::test(start_paused = true)]
    async fn outputs_reach_other_devices() {
        let mut station = station(Arc::new(LoopbackGateway::new()));
        station.spawn("a", sender()).await.unwrap();
        let to = station.spawn("b", receiver()).await.unwrap();

        let mut feed = station.watch(&to).await.unwrap();
        let reached = tokio::time::timeout(
            Duration::from_secs(5),
            feed.wait_for(|s| s.current_state == "Got"),
        )
        .await
        .is_ok_and(|r| r.is_ok());

        assert!(reached);
        station.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_spawn_is_rejected() {
        let mut station = station(Arc::new(LoopbackGateway::new()));
        station.spawn("a", sender()).await.unwrap();

        assert!(matches!(
            station.spawn("a", sender()).await,
            Err(EngineError::DuplicateInstance(_))
        ));
        station.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn paused_instance_stops_advancing() {
        let gateway = Arc::new(LoopbackGateway::new());
        let mut station = station(Arc::clone(&gateway));
        let key = station.spawn("b", receiver()).await.unwrap();

        station.pause_instance(&key).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        gateway.push_input(&key, "ping", true).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let latest = station.latest(&key).await.unwrap();
        assert_eq!(latest.run_state, RunState::Paused);
        assert_eq!(latest.current_state, "Wait");

        station.resume_instance(&key).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(station.latest(&key).await.unwrap().current_state, "Got");
        station.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn recording_stops_with_its_timer() {
        let mut station = station(Arc::new(LoopbackGateway::new()));
        station.spawn("a", sender()).await.unwrap();
        station.spawn("b", receiver()).await.unwrap();

        let id = station
            .start_recording(RecordingOptions {
                capture_interval: Duration::from_millis(20),
                max_snapshots: 100,
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        station.stop_recording(id).await.unwrap();
        let frames = station.time_travel().await.session(id).unwrap().len();

        tokio::time::sleep(Duration::from_millis(200)).await;
        let time_travel = station.time_travel().await;
        let session = time_travel.session(id).unwrap();

        assert!(frames > 0);
        assert_eq!(session.len(), frames);
        assert!(!session.is_recording());
        let last = session.frame(session.len() - 1).unwrap();
        assert_eq!(last.executions.len(), 2);
        assert_eq!(last.devices.len(), 2);
        drop(time_travel);
        station.shutdown().await;
    }

    async fn lifecycle_events(station: &Station, id: Uuid) -> usize {
        station
            .time_travel()
            .await
            .session(id)
            .unwrap()
            .frames()
            .flat_map(|frame| frame.events.iter())
            .filter(|event| event.kind == EventKind::Lifecycle)
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_sessions_each_record_every_event() {
        let mut station = station(Arc::new(LoopbackGateway::new()));
        let options = RecordingOptions {
            capture_interval: Duration::from_secs(60),
            max_snapshots: 10,
        };
        let first = station.start_recording(options).await.unwrap();
        let second = station.start_recording(options).await.unwrap();

        station.spawn("a", sender()).await.unwrap();
        station.capture_now(first).await.unwrap();
        station.capture_now(second).await.unwrap();

        assert_eq!(lifecycle_events(&station, first).await, 1);
        assert_eq!(lifecycle_events(&station, second).await, 1);

        station.stop_recording(first).await.unwrap();
        station.spawn("b", receiver()).await.unwrap();
        assert!(matches!(
            station.capture_now(first).await,
            Err(TimeTravelError::Recorder(RecorderError::NotRecording(_)))
        ));
        station.capture_now(second).await.unwrap();

        assert_eq!(lifecycle_events(&station, first).await, 1);
        assert_eq!(lifecycle_events(&station, second).await, 2);
        station.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn playback_publishes_frames_until_the_end() {
        let mut station = station(Arc::new(LoopbackGateway::new()));
        station.spawn("a", sender()).await.unwrap();

        // Opened without a capture timer; frames are captured by hand.
        let manual = station
            .time_travel()
            .await
            .start_recording(RecordingOptions {
                capture_interval: Duration::from_millis(40),
                max_snapshots: 10,
            })
            .unwrap();
        for _ in 0..3 {
            station.capture_now(manual).await.unwrap();
        }

        let mut feed = station.replay_feed();
        let pacing = station.play(manual, 2.0).await.unwrap();
        assert_eq!(pacing, Duration::from_millis(20));

        let reached = tokio::time::timeout(
            Duration::from_secs(5),
            feed.wait_for(|f| f.as_ref().is_some_and(|f| f.frame_number == 3)),
        )
        .await
        .is_ok_and(|r| r.is_ok());
        assert!(reached);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!station.time_travel().await.is_playing(manual).unwrap());
        station.shutdown().await;
    }
}
