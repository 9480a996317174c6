#![forbid(unsafe_code)]

use crate::domain::{ActivityInfo, PlanStructure, Profile, SessionId};
use crate::error::Error;
use crate::events::{EventBus, Subscription};
use crate::ingest::SampleProducer;
use crate::lifecycle::Transition;
use crate::plan::StepState;
use crate::report::{MetricsSnapshot, SubmissionPayload};
use metrics::SensorSample;
use tokio::sync::{mpsc, oneshot};

type Reply<T> = oneshot::Sender<Result<T, Error>>;

/// Requests served by a running [`crate::RecorderEngine`].
pub enum ControlCommand {
    Start {
        profile: Profile,
        activity: ActivityInfo,
        reply: Reply<SessionId>,
    },
    Pause {
        reply: Reply<Transition>,
    },
    Resume {
        reply: Reply<Transition>,
    },
    Finish {
        reply: Reply<Transition>,
    },
    Submission {
        reply: Reply<SubmissionPayload>,
    },
    Cleanup {
        reply: Reply<()>,
    },
    SelectPlan {
        plan: PlanStructure,
        reply: Reply<StepState>,
    },
    ClearPlan {
        reply: Reply<()>,
    },
    AdvanceStep {
        reply: Reply<Option<StepState>>,
    },
    RecordRepetitions {
        count: u32,
        reply: Reply<Option<StepState>>,
    },
    Snapshot {
        reply: oneshot::Sender<Option<MetricsSnapshot>>,
    },
}

/// Cloneable front end to a spawned engine.
#[derive(Debug, Clone)]
pub struct RecorderHandle {
    control: mpsc::UnboundedSender<ControlCommand>,
    samples: SampleProducer,
    events: EventBus,
}

impl RecorderHandle {
    pub(crate) fn new(
        control: mpsc::UnboundedSender<ControlCommand>,
        samples: SampleProducer,
        events: EventBus,
    ) -> Self {
        Self {
            control,
            samples,
            events,
        }
    }

    /// Queues a sensor sample. Never blocks.
    pub fn submit(&self, sample: SensorSample) -> Result<(), Error> {
        self.samples.submit(sample)
    }

    pub fn samples(&self) -> &SampleProducer {
        &self.samples
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub async fn start(&self, profile: Profile, activity: ActivityInfo) -> Result<SessionId, Error> {
        self.request(|reply| ControlCommand::Start {
            profile,
            activity,
            reply,
        })
        .await?
    }

    pub async fn pause(&self) -> Result<Transition, Error> {
        self.request(|reply| ControlCommand::Pause { reply }).await?
    }

    pub async fn resume(&self) -> Result<Transition, Error> {
        self.request(|reply| ControlCommand::Resume { reply }).await?
    }

    pub async fn finish(&self) -> Result<Transition, Error> {
        self.request(|reply| ControlCommand::Finish { reply }).await?
    }

    pub async fn submission(&self) -> Result<SubmissionPayload, Error> {
        self.request(|reply| ControlCommand::Submission { reply })
            .await?
    }

    pub async fn cleanup(&self) -> Result<(), Error> {
        self.request(|reply| ControlCommand::Cleanup { reply }).await?
    }

    pub async fn select_plan(&self, plan: PlanStructure) -> Result<StepState, Error> {
        self.request(|reply| ControlCommand::SelectPlan { plan, reply })
            .await?
    }

    pub async fn clear_plan(&self) -> Result<(), Error> {
        self.request(|reply| ControlCommand::ClearPlan { reply })
            .await?
    }

    pub async fn advance_step(&self) -> Result<Option<StepState>, Error> {
        self.request(|reply| ControlCommand::AdvanceStep { reply })
            .await?
    }

    pub async fn record_repetitions(&self, count: u32) -> Result<Option<StepState>, Error> {
        self.request(|reply| ControlCommand::RecordRepetitions { count, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<Option<MetricsSnapshot>, Error> {
        self.request(|reply| ControlCommand::Snapshot { reply })
            .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ControlCommand,
    ) -> Result<T, Error> {
        let (tx, rx) = oneshot::channel();
        self.control
            .send(build(tx))
            .map_err(|_| Error::EngineStopped)?;
        rx.await.map_err(|_| Error::EngineStopped)
    }
}
