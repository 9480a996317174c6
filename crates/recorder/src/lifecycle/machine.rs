#![forbid(unsafe_code)]

use crate::domain::{ActivityInfo, RecordingSession, RecordingState, SessionId};
use crate::error::{Action, Error};
use std::time::SystemTime;
use tracing::debug;

/// Outcome of a lifecycle command. Repeating a command that already holds is
/// not an error, it just reports `Unchanged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed(RecordingState),
    Unchanged(RecordingState),
}

impl Transition {
    pub fn state(&self) -> RecordingState {
        match self {
            Transition::Changed(state) | Transition::Unchanged(state) => *state,
        }
    }

    pub fn changed(&self) -> bool {
        matches!(self, Transition::Changed(_))
    }
}

/// Lifecycle of a single recording and the moving-time bookkeeping tied to it.
#[derive(Debug, Clone)]
pub struct RecordingStateMachine {
    state: RecordingState,
    session: Option<RecordingSession>,
    paused_total_ms: u64,
    paused_since_ms: Option<u64>,
}

impl Default for RecordingStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingStateMachine {
    pub fn new() -> Self {
        Self {
            state: RecordingState::Pending,
            session: None,
            paused_total_ms: 0,
            paused_since_ms: None,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn session(&self) -> Option<&RecordingSession> {
        self.session.as_ref()
    }

    pub fn start(
        &mut self,
        id: SessionId,
        profile_id: impl Into<String>,
        activity: ActivityInfo,
        now_ms: u64,
        wall: SystemTime,
    ) -> Result<(), Error> {
        self.ensure(RecordingState::Pending, Action::Start)?;
        self.session = Some(RecordingSession {
            id,
            profile_id: profile_id.into(),
            activity,
            started_at: wall,
            started_at_ms: now_ms,
            ended_at: None,
            ended_at_ms: None,
            state: RecordingState::Recording,
        });
        self.paused_total_ms = 0;
        self.paused_since_ms = None;
        self.set(RecordingState::Recording);
        Ok(())
    }

    pub fn pause(&mut self, now_ms: u64) -> Result<Transition, Error> {
        match self.state {
            RecordingState::Paused => Ok(Transition::Unchanged(self.state)),
            RecordingState::Recording => {
                self.paused_since_ms = Some(now_ms.max(self.started_at_ms()));
                Ok(self.set(RecordingState::Paused))
            }
            from => Err(Error::InvalidTransition {
                from,
                action: Action::Pause,
            }),
        }
    }

    pub fn resume(&mut self, now_ms: u64) -> Result<Transition, Error> {
        match self.state {
            RecordingState::Recording => Ok(Transition::Unchanged(self.state)),
            RecordingState::Paused => {
                self.close_pause(now_ms);
                Ok(self.set(RecordingState::Recording))
            }
            from => Err(Error::InvalidTransition {
                from,
                action: Action::Resume,
            }),
        }
    }

    pub fn finish(&mut self, now_ms: u64, wall: SystemTime) -> Result<Transition, Error> {
        match self.state {
            RecordingState::Finished => Ok(Transition::Unchanged(self.state)),
            RecordingState::Recording | RecordingState::Paused => {
                let ended_at_ms = now_ms.max(self.started_at_ms());
                self.close_pause(ended_at_ms);
                if let Some(session) = self.session.as_mut() {
                    session.ended_at_ms = Some(ended_at_ms);
                    session.ended_at = Some(wall.max(session.started_at));
                }
                Ok(self.set(RecordingState::Finished))
            }
            from => Err(Error::InvalidTransition {
                from,
                action: Action::Finish,
            }),
        }
    }

    /// Drops the finished session so a new one can start.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Samples are logged while recording and while paused.
    pub fn accepts_samples(&self) -> bool {
        matches!(self.state, RecordingState::Recording | RecordingState::Paused)
    }

    /// Moving time a sample taken at `timestamp_ms` falls on, or `None`
    /// unless the clock is running.
    pub fn moving_at(&self, timestamp_ms: u64) -> Option<u64> {
        if self.state != RecordingState::Recording {
            return None;
        }
        Some(
            timestamp_ms
                .saturating_sub(self.started_at_ms())
                .saturating_sub(self.paused_total_ms),
        )
    }

    /// Moving time up to `now_ms`, frozen while paused and after finishing.
    pub fn moving_ms(&self, now_ms: u64) -> u64 {
        let Some(session) = self.session.as_ref() else {
            return 0;
        };
        let until = session.ended_at_ms.unwrap_or(now_ms).max(session.started_at_ms);
        let open_pause = self
            .paused_since_ms
            .map_or(0, |since| until.saturating_sub(since));
        until
            .saturating_sub(session.started_at_ms)
            .saturating_sub(self.paused_total_ms)
            .saturating_sub(open_pause)
    }

    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        self.session.as_ref().map_or(0, |session| {
            session
                .ended_at_ms
                .unwrap_or(now_ms)
                .saturating_sub(session.started_at_ms)
        })
    }

    fn started_at_ms(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.started_at_ms)
    }

    fn close_pause(&mut self, now_ms: u64) {
        if let Some(since) = self.paused_since_ms.take() {
            self.paused_total_ms = self
                .paused_total_ms
                .saturating_add(now_ms.saturating_sub(since));
        }
    }

    pub fn ensure(&self, expected: RecordingState, action: Action) -> Result<(), Error> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                from: self.state,
                action,
            })
        }
    }

    fn set(&mut self, state: RecordingState) -> Transition {
        debug!(from = %self.state, to = %state, "recording state changed");
        self.state = state;
        if let Some(session) = self.session.as_mut() {
            session.state = state;
        }
        Transition::Changed(state)
    }
}
