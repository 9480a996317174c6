use crate::error::Error;
use crate::signals::SignalEvent;
use config::Config;
use metrics::SensorSample;
use recorder::domain::{ActivityInfo, PlanStructure, Profile};
use recorder::{
    Clock, ManualClock, RecorderEngine, RecorderEvent, Services, SubmissionPayload, Subscription,
};
use std::{fs, path::Path, sync::Arc, time::SystemTime};
use tracing::{debug, info, warn};

/// Read a JSON-lines sample file. Blank lines and `#` comments are skipped.
pub fn read_samples(path: &Path) -> Result<Vec<SensorSample>, Error> {
    let contents = fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_owned(),
        source,
    })?;
    parse_samples(&contents)
}

/// Parse samples and order them by timestamp. Ties keep file order.
pub fn parse_samples(contents: &str) -> Result<Vec<SensorSample>, Error> {
    let mut samples = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let sample = serde_json::from_str(line).map_err(|source| Error::Sample {
            line: index + 1,
            source,
        })?;
        samples.push(sample);
    }
    samples.sort_by_key(|sample: &SensorSample| sample.timestamp_ms);
    Ok(samples)
}

pub fn read_plan(path: &Path) -> Result<PlanStructure, Error> {
    let contents = fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| Error::Plan {
        path: path.to_owned(),
        source,
    })
}

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub profile: Profile,
    pub activity: ActivityInfo,
    pub plan: Option<PlanStructure>,
    pub keep_chunks: bool,
}

#[derive(Debug)]
pub struct ReplayReport {
    pub submission: SubmissionPayload,
    pub snapshots: u64,
    /// Names of the plan steps entered, in order.
    pub steps: Vec<String>,
    pub interrupted: bool,
}

/// Drives a [`RecorderEngine`] from recorded samples on a simulated clock.
pub struct Replay {
    engine: RecorderEngine,
    clock: Arc<ManualClock>,
    events: Subscription,
}

impl Replay {
    pub async fn new(config: Config) -> Result<Self, Error> {
        let clock = Arc::new(ManualClock::new(SystemTime::now()));
        let mut services = Services::from_config(&config).await?;
        services.clock = clock.clone();
        let engine = RecorderEngine::new(config, services)?;
        let events = engine.subscribe();
        Ok(Self {
            engine,
            clock,
            events,
        })
    }

    pub async fn run(
        mut self,
        samples: Vec<SensorSample>,
        options: ReplayOptions,
        signals: flume::Receiver<SignalEvent>,
    ) -> Result<ReplayReport, Error> {
        let first = samples.first().ok_or(Error::EmptyReplay)?.timestamp_ms;
        let last = samples.last().map_or(first, |sample| sample.timestamp_ms);
        let tick_ms = (self.engine.config().recording.tick_interval.as_millis() as u64).max(1);
        let flush_ms =
            (self.engine.config().persistence.flush_interval.as_millis() as u64).max(1);

        self.clock.set_ms(first);
        let session = self
            .engine
            .start(options.profile, options.activity)
            .await?;
        info!(%session, first, last, "replay started");

        let mut steps = Vec::new();
        if let Some(plan) = &options.plan {
            let step = self.engine.select_structure(plan)?;
            steps.push(step.step.name);
            self.events.drain();
        }

        let mut snapshots = 0;
        let mut interrupted = false;
        let mut next_tick = first + tick_ms;
        let mut next_flush = first + flush_ms;

        'samples: for sample in samples {
            while sample.timestamp_ms >= next_tick {
                self.clock.set_ms(next_tick);
                if self.engine.tick().is_some() {
                    snapshots += 1;
                }
                while next_flush <= next_tick {
                    self.engine.flush();
                    next_flush += flush_ms;
                }
                next_tick += tick_ms;
                self.log_events(&mut steps);

                // Lets the chunk writer and signal listener make progress.
                tokio::task::yield_now().await;
                if self.handle_signals(&signals)? {
                    interrupted = true;
                    break 'samples;
                }
            }
            self.clock.set_ms(sample.timestamp_ms);
            self.engine.ingest(sample);
        }

        if interrupted {
            warn!(at = self.clock.now_ms(), "replay interrupted, finishing early");
        } else {
            self.clock.set_ms(last);
            if self.engine.tick().is_some() {
                snapshots += 1;
            }
        }
        self.engine.finish().await?;
        self.log_events(&mut steps);

        let submission = self.engine.submission().await?;
        if options.keep_chunks {
            debug!(%session, "keeping session chunks");
        } else {
            self.engine.cleanup().await?;
        }

        Ok(ReplayReport {
            submission,
            snapshots,
            steps,
            interrupted,
        })
    }

    /// Returns `true` when the replay should stop.
    fn handle_signals(&mut self, signals: &flume::Receiver<SignalEvent>) -> Result<bool, Error> {
        while let Ok(event) = signals.try_recv() {
            debug!(?event, "Received signal event");
            match event {
                SignalEvent::SigUSR1 => {
                    if let Some(snapshot) = self.engine.capture_now() {
                        info!(snapshot = %serde_json::to_string(&snapshot)?, "current metrics");
                    }
                }
                SignalEvent::SigUSR2 => {
                    if let Err(err) = self.engine.advance_step() {
                        warn!(%err, "cannot advance plan");
                    }
                }
                SignalEvent::Interrupt => return Ok(true),
            }
        }
        Ok(false)
    }

    fn log_events(&self, steps: &mut Vec<String>) {
        for event in self.events.drain() {
            match event {
                RecorderEvent::StepChanged(step) => {
                    info!(
                        step = %step.step.name,
                        index = step.step_index,
                        finished = step.is_finished,
                        "plan step changed"
                    );
                    if !step.is_finished {
                        steps.push(step.step.name);
                    }
                }
                RecorderEvent::SensorsChanged(sensors) => {
                    info!(?sensors, "sensors changed");
                }
                RecorderEvent::Error { kind, message } => {
                    warn!(?kind, %message, "recorder error");
                }
                RecorderEvent::StateChanged(state) => debug!(%state, "state changed"),
                RecorderEvent::MetricsUpdate(_)
                | RecorderEvent::PlanCleared
                | RecorderEvent::RecordingComplete { .. } => {}
            }
        }
    }
}
