#![forbid(unsafe_code)]

use crate::clock::{Clock, SystemClock};
use crate::domain::{ActivityInfo, PlanStep, PlanStructure, Profile, RecordingSession, RecordingState, SessionId};
use crate::error::{Action, Error};
use crate::events::{EventBus, RecorderEvent, Subscription};
use crate::handle::{ControlCommand, RecorderHandle};
use crate::ingest::{SampleConsumer, SampleProducer, SensorPresence, sample_channel};
use crate::lifecycle::{RecordingStateMachine, SessionGate, SessionLease, Transition};
use crate::persistence::{
    ChunkStore, ChunkWriter, MemoryChunkStore, SqliteChunkStore, StreamBuffer, StreamChunk,
    WritePolicy, aggregate_all_chunks, write_with_retry,
};
use crate::plan::{PlanExecutor, Position, StepState};
use crate::report::{MetricsSnapshot, SubmissionPayload};
use config::Config;
use metrics::{AggregatorSettings, Calibration, RollingAggregator, SensorSample};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

pub struct Services {
    pub clock: Arc<dyn Clock>,
    pub store: Arc<dyn ChunkStore>,
    pub gate: SessionGate,
}

impl Services {
    /// Production services: wall clock, a SQLite store when a path is
    /// configured (in-memory otherwise) and a private session gate.
    pub async fn from_config(config: &Config) -> Result<Self, Error> {
        let store: Arc<dyn ChunkStore> = match &config.persistence.store_path {
            Some(path) => Arc::new(SqliteChunkStore::new(path.clone()).await?),
            None => Arc::new(MemoryChunkStore::new()),
        };
        Ok(Self {
            clock: Arc::new(SystemClock::default()),
            store,
            gate: SessionGate::new(),
        })
    }
}

/// Per-session state, created by `start` and dropped by `cleanup`.
struct ActiveSession {
    lease: SessionLease,
    aggregator: RollingAggregator,
    buffer: StreamBuffer,
    writer: Option<ChunkWriter>,
    backlog: Vec<StreamChunk>,
    rejected: u64,
}

/// Owns a recording from `start` to `cleanup`.
///
/// Every method runs on the engine's own task: sensor callbacks only touch
/// the sample queue and hosts talk to a running engine through a
/// [`RecorderHandle`]. The methods are public so a host (or a replay) can
/// also drive the engine directly.
pub struct RecorderEngine {
    config: Config,
    services: Services,
    events: EventBus,
    producer: SampleProducer,
    consumer: SampleConsumer,
    lifecycle: RecordingStateMachine,
    plan: PlanExecutor,
    presence: SensorPresence,
    session: Option<ActiveSession>,
    latest: Option<Arc<MetricsSnapshot>>,
    submission: Option<SubmissionPayload>,
}

impl RecorderEngine {
    pub fn new(config: Config, services: Services) -> Result<Self, Error> {
        config.validate()?;
        let (producer, consumer) = sample_channel(config.recording.queue_capacity);
        let presence = SensorPresence::new(config.recording.stale_after.as_millis() as u64);
        Ok(Self {
            config,
            services,
            events: EventBus::new(),
            producer,
            consumer,
            lifecycle: RecordingStateMachine::new(),
            plan: PlanExecutor::default(),
            presence,
            session: None,
            latest: None,
            submission: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    /// A sender for sensor callbacks. Never blocks.
    pub fn producer(&self) -> SampleProducer {
        self.producer.clone()
    }

    pub fn state(&self) -> RecordingState {
        self.lifecycle.state()
    }

    pub fn session(&self) -> Option<&RecordingSession> {
        self.lifecycle.session()
    }

    pub fn plan(&self) -> &PlanExecutor {
        &self.plan
    }

    /// Live aggregates of the current session.
    pub fn aggregator(&self) -> Option<&RollingAggregator> {
        self.session.as_ref().map(|active| &active.aggregator)
    }

    /// The thresholds of the live session, if any.
    pub fn calibration(&self) -> Option<Calibration> {
        self.session
            .as_ref()
            .map(|active| *active.aggregator.calibration())
    }

    /// The most recently published snapshot.
    pub fn latest_snapshot(&self) -> Option<Arc<MetricsSnapshot>> {
        self.latest.clone()
    }

    pub async fn start(
        &mut self,
        profile: Profile,
        activity: ActivityInfo,
    ) -> Result<SessionId, Error> {
        if let Err(err) = self.lifecycle.ensure(RecordingState::Pending, Action::Start) {
            return self.fail(err);
        }
        let id = SessionId::new();
        let lease = match self.services.gate.try_acquire(id) {
            Ok(lease) => lease,
            Err(err) => return self.fail(err),
        };

        let discarded = self.discard_queued();
        if discarded > 0 {
            debug!(discarded, "dropped samples queued before start");
        }

        let now = self.services.clock.now_ms();
        let wall = self.services.clock.wall_time();
        self.lifecycle
            .start(id, profile.id.clone(), activity, now, wall)?;

        self.plan.set_calibration(profile.calibration);
        let writer = ChunkWriter::spawn(
            id,
            Arc::clone(&self.services.store),
            Arc::clone(&self.services.clock),
            self.events.clone(),
            WritePolicy::from_config(&self.config.persistence),
        );
        self.session = Some(ActiveSession {
            lease,
            aggregator: RollingAggregator::new(
                AggregatorSettings::from_config(&self.config),
                profile.calibration,
            ),
            buffer: StreamBuffer::new(self.config.persistence.flush_max_samples),
            writer: Some(writer),
            backlog: Vec::new(),
            rejected: 0,
        });
        self.presence.clear();
        self.latest = None;
        self.submission = None;

        info!(session = %id, profile = %profile.id, "recording started");
        self.events
            .publish(RecorderEvent::StateChanged(RecordingState::Recording));
        Ok(id)
    }

    pub fn pause(&mut self) -> Result<Transition, Error> {
        self.drain_samples();
        let now = self.services.clock.now_ms();
        match self.lifecycle.pause(now) {
            Ok(transition) => Ok(self.announce(transition)),
            Err(err) => self.fail(err),
        }
    }

    pub fn resume(&mut self) -> Result<Transition, Error> {
        self.drain_samples();
        let now = self.services.clock.now_ms();
        match self.lifecycle.resume(now) {
            Ok(transition) => Ok(self.announce(transition)),
            Err(err) => self.fail(err),
        }
    }

    /// Stops recording, flushes every buffered sample and waits for the
    /// writer. `recordingComplete` is published once per session.
    pub async fn finish(&mut self) -> Result<Transition, Error> {
        self.drain_samples();
        let now = self.services.clock.now_ms();
        let wall = self.services.clock.wall_time();
        let transition = match self.lifecycle.finish(now, wall) {
            Ok(transition) => transition,
            Err(err) => return self.fail(err),
        };
        if !transition.changed() {
            return Ok(transition);
        }

        self.flush();
        self.stop_writer().await;

        let session_id = self.lifecycle.session().map(|session| session.id);
        info!(
            session = ?session_id,
            moving_ms = self.lifecycle.moving_ms(now),
            "recording finished"
        );
        self.announce(transition);
        if let Some(session_id) = session_id {
            self.events
                .publish(RecorderEvent::RecordingComplete { session_id });
        }
        Ok(transition)
    }

    /// Re-aggregates the finished session from its durable chunks and builds
    /// the payload for the host. Repeated calls return the same payload.
    pub async fn submission(&mut self) -> Result<SubmissionPayload, Error> {
        if let Some(payload) = &self.submission {
            return Ok(payload.clone());
        }
        let state = self.lifecycle.state();
        if state != RecordingState::Finished {
            return self.fail(Error::InvalidTransition {
                from: state,
                action: Action::Submit,
            });
        }
        if let Err(err) = self.write_backlog().await {
            return self.fail(err);
        }

        let Some(active) = self.session.as_ref() else {
            return self.fail(Error::InvalidTransition {
                from: state,
                action: Action::Submit,
            });
        };
        let session_id = active.lease.session();
        let expected = active.buffer.next_sequence();
        let rebuilt = aggregate_all_chunks(
            self.services.store.as_ref(),
            session_id,
            Some(expected),
            active.aggregator.settings().clone(),
            *active.aggregator.calibration(),
        )
        .await;
        let rebuilt = match rebuilt {
            Ok(rebuilt) => rebuilt,
            Err(err) => return self.fail(err),
        };
        if rebuilt != active.aggregator {
            warn!(session = %session_id, "aggregates rebuilt from chunks differ from live aggregates");
        }

        let Some(session) = self.lifecycle.session() else {
            return self.fail(Error::InvalidTransition {
                from: state,
                action: Action::Submit,
            });
        };
        let moving_ms = self.lifecycle.moving_ms(self.services.clock.now_ms());
        let payload = SubmissionPayload::assemble(
            session,
            moving_ms,
            &rebuilt,
            self.plan.plan_id().map(str::to_owned),
            expected,
        );
        info!(session = %session_id, chunks = expected, "submission assembled");
        self.submission = Some(payload.clone());
        Ok(payload)
    }

    /// Deletes the session's chunks once its submission exists and returns
    /// the engine to `pending`.
    pub async fn cleanup(&mut self) -> Result<(), Error> {
        if self.submission.is_none() {
            return self.fail(Error::CleanupNotAllowed);
        }
        let Some(active) = self.session.take() else {
            return self.fail(Error::CleanupNotAllowed);
        };
        let session_id = active.lease.session();
        match self.services.store.delete_session(session_id).await {
            Ok(removed) => info!(session = %session_id, removed, "session chunks removed"),
            Err(err) => {
                self.session = Some(active);
                return self.fail(err);
            }
        }
        drop(active);

        if self.plan.clear().is_ok() {
            self.events.publish(RecorderEvent::PlanCleared);
        }
        self.lifecycle.reset();
        self.presence.clear();
        self.latest = None;
        self.submission = None;
        self.events
            .publish(RecorderEvent::StateChanged(RecordingState::Pending));
        Ok(())
    }

    pub fn select_plan(
        &mut self,
        plan_id: impl Into<String>,
        steps: Vec<PlanStep>,
    ) -> Result<StepState, Error> {
        let state = self.lifecycle.state();
        if state == RecordingState::Finished {
            return self.fail(Error::InvalidTransition {
                from: state,
                action: Action::SelectPlan,
            });
        }
        let position = self.position(self.services.clock.now_ms());
        match self.plan.select(plan_id, steps, position) {
            Ok(step) => {
                self.events.publish(RecorderEvent::StepChanged(step.clone()));
                Ok(step)
            }
            Err(err) => self.fail(err),
        }
    }

    pub fn select_structure(&mut self, plan: &PlanStructure) -> Result<StepState, Error> {
        self.select_plan(plan.id.clone(), plan.flatten())
    }

    pub fn clear_plan(&mut self) -> Result<(), Error> {
        match self.plan.clear() {
            Ok(()) => {
                self.events.publish(RecorderEvent::PlanCleared);
                Ok(())
            }
            Err(err) => self.fail(err),
        }
    }

    pub fn advance_step(&mut self) -> Result<Option<StepState>, Error> {
        let position = self.position(self.services.clock.now_ms());
        let outcome = self.plan.advance(position);
        self.publish_step(outcome)
    }

    pub fn record_repetitions(&mut self, count: u32) -> Result<Option<StepState>, Error> {
        let position = self.position(self.services.clock.now_ms());
        let outcome = self.plan.record_repetitions(count, position);
        self.publish_step(outcome)
    }

    /// Folds one sample into the live aggregates and the chunk buffer.
    /// Samples outside `recording` and `paused` are dropped; paused samples
    /// carry no moving time. Invalid samples are counted as rejected.
    pub fn ingest(&mut self, sample: SensorSample) -> bool {
        if !self.lifecycle.accepts_samples() {
            trace!(state = %self.lifecycle.state(), metric = %sample.metric, "sample dropped outside recording");
            return false;
        }
        let moving_ms = self.lifecycle.moving_at(sample.timestamp_ms);
        let now = self.services.clock.now_ms();
        let tolerance_ms = self.config.recording.future_tolerance.as_millis() as u64;
        let Some(active) = self.session.as_mut() else {
            return false;
        };
        let accepted = sample
            .check_not_ahead(now, tolerance_ms)
            .and_then(|()| active.aggregator.ingest(&sample, moving_ms));
        if let Err(err) = accepted {
            active.rejected += 1;
            debug!(source = %sample.source_id, %err, "sample rejected");
            return false;
        }
        let full = active.buffer.append(&sample, moving_ms);
        self.presence.observe(&sample);
        if full {
            self.flush();
        }
        true
    }

    /// Ingests everything currently queued.
    pub fn drain_samples(&mut self) -> usize {
        let mut drained = 0;
        while let Some(sample) = self.consumer.try_recv() {
            self.ingest(sample);
            drained += 1;
        }
        drained
    }

    /// One cadence step: plan progression, sensor presence and, while
    /// recording (or paused, if configured), a `metricsUpdate`.
    pub fn tick(&mut self) -> Option<Arc<MetricsSnapshot>> {
        let span = tracing::debug_span!("tick");
        let _enter = span.enter();
        self.drain_samples();
        self.session.as_ref()?;
        let now = self.services.clock.now_ms();
        let state = self.lifecycle.state();

        if let Some(connected) = self.presence.refresh(now) {
            info!(sensors = connected.len(), "connected sensors changed");
            self.events.publish(RecorderEvent::SensorsChanged(connected));
        }

        let position = self.position(now);
        if state == RecordingState::Recording
            && let Some(step) = self.plan.tick(position)
        {
            self.events.publish(RecorderEvent::StepChanged(step));
        }

        let emit = match state {
            RecordingState::Recording => true,
            RecordingState::Paused => self.config.recording.emit_while_paused,
            RecordingState::Pending | RecordingState::Finished => false,
        };
        if !emit {
            return None;
        }
        let snapshot = Arc::new(self.capture(now)?);
        self.latest = Some(Arc::clone(&snapshot));
        self.events
            .publish(RecorderEvent::MetricsUpdate(Arc::clone(&snapshot)));
        Some(snapshot)
    }

    /// A snapshot of the current moment, without publishing it.
    pub fn capture_now(&self) -> Option<MetricsSnapshot> {
        self.capture(self.services.clock.now_ms())
    }

    /// Cuts pending samples into chunks and hands them to the writer.
    pub fn flush(&mut self) -> usize {
        let span = tracing::debug_span!("flush");
        let _enter = span.enter();
        let Some(active) = self.session.as_mut() else {
            return 0;
        };
        let chunks = active.buffer.cut();
        let count = chunks.len();
        for chunk in chunks {
            match active.writer.as_ref() {
                Some(writer) => {
                    if let Err(flume::SendError(chunk)) = writer.submit(chunk) {
                        warn!(sequence = chunk.sequence, "chunk writer gone, chunk kept in backlog");
                        active.backlog.push(chunk);
                    }
                }
                None => active.backlog.push(chunk),
            }
        }
        if count > 0 {
            debug!(chunks = count, next_sequence = active.buffer.next_sequence(), "flushed stream buffer");
        }
        count
    }

    /// Flushes what is buffered and stops the writer without finishing the
    /// session.
    pub async fn shutdown(&mut self) {
        self.drain_samples();
        self.flush();
        self.stop_writer().await;
    }

    /// Runs the engine until `cancel` fires, serving control commands,
    /// queued samples and the tick and flush timers.
    pub async fn run_until(
        &mut self,
        cancel: CancellationToken,
        mut control_rx: mpsc::UnboundedReceiver<ControlCommand>,
    ) -> Result<(), Error> {
        let samples = self.consumer.receiver();
        let mut ticker = tokio::time::interval(self.config.recording.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut flusher = tokio::time::interval(self.config.persistence.flush_interval);
        flusher.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.shutdown().await;
                    info!("shutdown requested");
                    break;
                }
                Some(command) = control_rx.recv() => {
                    self.handle_command(command).await;
                }
                Ok(sample) = samples.recv_async() => {
                    self.ingest(sample);
                }
                _ = ticker.tick() => {
                    self.tick();
                }
                _ = flusher.tick() => {
                    self.flush();
                }
            }
        }

        Ok(())
    }

    /// Moves the engine onto its own task and returns a handle to it.
    pub fn spawn(
        mut self,
        cancel: CancellationToken,
    ) -> (RecorderHandle, JoinHandle<Result<(), Error>>) {
        let (control, control_rx) = mpsc::unbounded_channel();
        let handle = RecorderHandle::new(control, self.producer(), self.events.clone());
        let task = tokio::spawn(async move { self.run_until(cancel, control_rx).await });
        (handle, task)
    }

    async fn handle_command(&mut self, command: ControlCommand) {
        // A dropped reply receiver means the caller stopped waiting.
        match command {
            ControlCommand::Start {
                profile,
                activity,
                reply,
            } => {
                let _ = reply.send(self.start(profile, activity).await);
            }
            ControlCommand::Pause { reply } => {
                let _ = reply.send(self.pause());
            }
            ControlCommand::Resume { reply } => {
                let _ = reply.send(self.resume());
            }
            ControlCommand::Finish { reply } => {
                let _ = reply.send(self.finish().await);
            }
            ControlCommand::Submission { reply } => {
                let _ = reply.send(self.submission().await);
            }
            ControlCommand::Cleanup { reply } => {
                let _ = reply.send(self.cleanup().await);
            }
            ControlCommand::SelectPlan { plan, reply } => {
                let _ = reply.send(self.select_structure(&plan));
            }
            ControlCommand::ClearPlan { reply } => {
                let _ = reply.send(self.clear_plan());
            }
            ControlCommand::AdvanceStep { reply } => {
                let _ = reply.send(self.advance_step());
            }
            ControlCommand::RecordRepetitions { count, reply } => {
                let _ = reply.send(self.record_repetitions(count));
            }
            ControlCommand::Snapshot { reply } => {
                let _ = reply.send(self.capture_now());
            }
        }
    }

    fn capture(&self, now: u64) -> Option<MetricsSnapshot> {
        let active = self.session.as_ref()?;
        let session = self.lifecycle.session()?;
        let snapshot = MetricsSnapshot::capture(
            session.id,
            self.lifecycle.state(),
            now,
            self.lifecycle.elapsed_ms(now),
            self.lifecycle.moving_ms(now),
            &active.aggregator,
            self.presence.current(now),
            self.plan.step_state(self.position(now)),
        );
        Some(snapshot.with_sample_counts(self.consumer.dropped(), active.rejected))
    }

    fn position(&self, now: u64) -> Position {
        Position {
            moving_ms: self.lifecycle.moving_ms(now),
            distance_m: self
                .session
                .as_ref()
                .and_then(|active| active.aggregator.distance_m())
                .unwrap_or(0.0),
        }
    }

    async fn stop_writer(&mut self) {
        let Some(active) = self.session.as_mut() else {
            return;
        };
        let Some(writer) = active.writer.take() else {
            return;
        };
        match writer.finish().await {
            Ok(report) => {
                debug!(written = report.written, backlog = report.backlog.len(), "chunk writer drained");
                active.backlog.extend(report.backlog);
            }
            Err(err) => {
                error!(%err, "chunk writer failed");
                self.events.publish(RecorderEvent::from_error(&err));
            }
        }
    }

    async fn write_backlog(&mut self) -> Result<(), Error> {
        let Some(active) = self.session.as_mut() else {
            return Ok(());
        };
        let session_id = active.lease.session();
        let policy = WritePolicy::from_config(&self.config.persistence);
        while let Some(chunk) = active.backlog.first() {
            write_with_retry(
                self.services.store.as_ref(),
                self.services.clock.as_ref(),
                session_id,
                chunk,
                policy,
            )
            .await?;
            active.backlog.remove(0);
        }
        Ok(())
    }

    fn discard_queued(&self) -> usize {
        std::iter::from_fn(|| self.consumer.try_recv()).count()
    }

    fn announce(&self, transition: Transition) -> Transition {
        if let Transition::Changed(state) = transition {
            self.events.publish(RecorderEvent::StateChanged(state));
        }
        transition
    }

    fn publish_step(
        &self,
        outcome: Result<Option<StepState>, Error>,
    ) -> Result<Option<StepState>, Error> {
        match outcome {
            Ok(step) => {
                if let Some(step) = &step {
                    self.events.publish(RecorderEvent::StepChanged(step.clone()));
                }
                Ok(step)
            }
            Err(err) => self.fail(err),
        }
    }

    fn fail<T>(&self, err: Error) -> Result<T, Error> {
        warn!(%err, "recorder command failed");
        self.events.publish(RecorderEvent::from_error(&err));
        Err(err)
    }
}
