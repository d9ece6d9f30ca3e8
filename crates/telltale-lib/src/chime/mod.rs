//! Chime scheduler: FIFO queue for the normal channel plus an unqueued
//! parallel channel for the privileged class.
//!
//! Each started request becomes a session driven by [`state::transition`].
//! Sessions are keyed by [`SessionId`] for their timers and by
//! [`PlaybackId`] for audio completions, so a late timer or completion for a
//! session that was already stopped finds nothing and is dropped.

pub mod state;

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;

use crate::audio::{AudioBackend, PlayRequest, PlaybackId};
use crate::context::Turn;
use crate::events::{Channel, Event, SessionId, TimerEvent};
use crate::registry::{ChimeDefinition, IndicatorId, Lifetime, RepeatMode};
use crate::timer::TimerHandle;

use state::{Action, Input, PlaybackState, Plan, Progress, transition};

/// Scheduler parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChimeTiming {
    pub retrigger_ms: u64,
    pub min_cooldown_ms: u64,
    /// Percentage applied to every chime volume.
    pub volume_scale: u8,
}

impl Default for ChimeTiming {
    fn default() -> Self {
        Self {
            retrigger_ms: 3_000,
            min_cooldown_ms: 1_000,
            volume_scale: 100,
        }
    }
}

/// A normal-channel request waiting for its turn.
#[derive(Debug, Clone)]
pub struct ChimeRequest {
    pub indicator: IndicatorId,
    pub chime: Arc<ChimeDefinition>,
    pub lifetime: Lifetime,
    pub enqueued_at: u64,
}

#[derive(Debug)]
struct Session {
    id: SessionId,
    indicator: IndicatorId,
    chime: Arc<ChimeDefinition>,
    channel: Channel,
    plan: Plan,
    progress: Progress,
    playback: Option<PlaybackId>,
    started_at: u64,
    timer: Option<TimerHandle>,
}

/// Read-only view of a live session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub indicator: IndicatorId,
    pub chime: String,
    pub channel: Channel,
    pub state: PlaybackState,
    pub plays: u32,
}

impl From<&Session> for SessionInfo {
    fn from(s: &Session) -> Self {
        SessionInfo {
            indicator: s.indicator,
            chime: s.chime.id.clone(),
            channel: s.channel,
            state: s.progress.state,
            plays: s.progress.completed,
        }
    }
}

/// Which sessions a stop applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopScope {
    All,
    /// Lifetime expiry: only repeating-until-stopped chimes.
    ContinuousOnly,
}

impl StopScope {
    fn covers(self, chime: &ChimeDefinition) -> bool {
        match self {
            StopScope::All => true,
            StopScope::ContinuousOnly => chime.repeat == RepeatMode::Continuous,
        }
    }
}

#[derive(Debug)]
pub struct ChimeScheduler {
    timing: ChimeTiming,
    queue: VecDeque<ChimeRequest>,
    normal: Option<Session>,
    parallel: Vec<Session>,
    next_session: u64,
}

impl ChimeScheduler {
    pub fn new(timing: ChimeTiming) -> Self {
        Self {
            timing,
            queue: VecDeque::new(),
            normal: None,
            parallel: Vec::new(),
            next_session: 0,
        }
    }

    /// Request the chime for `indicator`. Parallel chimes start at once;
    /// others join the FIFO queue. A request for an indicator that already
    /// has one queued or in progress is dropped.
    pub fn enqueue(
        &mut self,
        indicator: IndicatorId,
        chime: Arc<ChimeDefinition>,
        lifetime: Lifetime,
        turn: &mut Turn<'_>,
        audio: &mut dyn AudioBackend,
    ) {
        if self.has_request_for(indicator) {
            log::debug!("[chime] {} already requested for {indicator}", chime.id);
            return;
        }

        if chime.parallel {
            let mut session = self.open(indicator, chime, lifetime, Channel::Parallel);
            log::info!("[chime] {} starts on parallel channel for {indicator}", session.chime.id);
            if !self.drive(&mut session, Input::Start, turn, audio) {
                self.parallel.push(session);
            }
            return;
        }

        log::info!(
            "[chime] {} queued for {indicator} (position {})",
            chime.id,
            self.queue.len() + usize::from(self.normal.is_some())
        );
        self.queue.push_back(ChimeRequest {
            indicator,
            chime,
            lifetime,
            enqueued_at: turn.now(),
        });
        self.pump(turn, audio);
    }

    /// Cancel everything tied to `indicator`: queued requests vanish silently,
    /// live sessions are halted, and the queue advances.
    pub fn stop(&mut self, indicator: IndicatorId, turn: &mut Turn<'_>, audio: &mut dyn AudioBackend) {
        self.stop_scoped(indicator, StopScope::All, turn, audio);
    }

    /// Lifetime of `indicator` ran out: stop its continuous chime, let a
    /// once/twice chime play out.
    pub fn expire(&mut self, indicator: IndicatorId, turn: &mut Turn<'_>, audio: &mut dyn AudioBackend) {
        self.stop_scoped(indicator, StopScope::ContinuousOnly, turn, audio);
    }

    fn stop_scoped(
        &mut self,
        indicator: IndicatorId,
        scope: StopScope,
        turn: &mut Turn<'_>,
        audio: &mut dyn AudioBackend,
    ) {
        let before = self.queue.len();
        self.queue
            .retain(|r| r.indicator != indicator || !scope.covers(&r.chime));
        if self.queue.len() != before {
            log::info!("[chime] dequeued request for {indicator}");
        }

        if let Some(mut session) = self.normal.take() {
            if session.indicator == indicator && scope.covers(&session.chime) {
                log::info!("[chime] {} stopped for {indicator}", session.chime.id);
                self.drive(&mut session, Input::Stop, turn, audio);
            } else {
                self.normal = Some(session);
            }
        }

        let mut i = 0;
        while i < self.parallel.len() {
            if self.parallel[i].indicator == indicator && scope.covers(&self.parallel[i].chime) {
                let mut session = self.parallel.swap_remove(i);
                log::info!("[chime] {} stopped on parallel channel for {indicator}", session.chime.id);
                self.drive(&mut session, Input::Stop, turn, audio);
            } else {
                i += 1;
            }
        }

        self.pump(turn, audio);
    }

    /// A session timer fired.
    pub fn on_timer(
        &mut self,
        id: SessionId,
        handle: TimerHandle,
        turn: &mut Turn<'_>,
        audio: &mut dyn AudioBackend,
    ) {
        let matches = |s: &Session| s.id == id && s.timer == Some(handle);
        if let Some(mut session) = self.normal.take_if(|s| matches(&*s)) {
            session.timer = None;
            if !self.drive(&mut session, Input::TimerElapsed, turn, audio) {
                self.normal = Some(session);
            }
            self.pump(turn, audio);
        } else if let Some(i) = self.parallel.iter().position(matches) {
            let mut session = self.parallel.swap_remove(i);
            session.timer = None;
            if !self.drive(&mut session, Input::TimerElapsed, turn, audio) {
                self.parallel.push(session);
            }
        } else {
            log::debug!("[chime] stale timer for session {id}");
        }
    }

    /// The audio backend finished `playback`. Unknown ids are ignored.
    pub fn on_completed(&mut self, playback: PlaybackId, turn: &mut Turn<'_>, audio: &mut dyn AudioBackend) {
        let matches = |s: &Session| s.playback == Some(playback);
        if let Some(mut session) = self.normal.take_if(|s| matches(&*s)) {
            self.complete(&mut session, turn, audio);
            if !session.is_done() {
                self.normal = Some(session);
            }
            self.pump(turn, audio);
        } else if let Some(i) = self.parallel.iter().position(matches) {
            let mut session = self.parallel.swap_remove(i);
            self.complete(&mut session, turn, audio);
            if !session.is_done() {
                self.parallel.push(session);
            }
        } else {
            log::debug!("[chime] ignoring completion of playback {playback}");
        }
    }

    fn complete(&self, session: &mut Session, turn: &mut Turn<'_>, audio: &mut dyn AudioBackend) {
        let elapsed_ms = turn.now().saturating_sub(session.started_at);
        session.playback = None;
        self.drive(session, Input::Completed { elapsed_ms }, turn, audio);
    }

    /// Start queued requests while the normal channel is free.
    fn pump(&mut self, turn: &mut Turn<'_>, audio: &mut dyn AudioBackend) {
        while self.normal.is_none() {
            let Some(request) = self.queue.pop_front() else {
                return;
            };
            let mut session = self.open(request.indicator, request.chime, request.lifetime, Channel::Normal);
            log::info!(
                "[chime] {} starts for {} after {} ms in queue",
                session.chime.id,
                session.indicator,
                turn.now().saturating_sub(request.enqueued_at)
            );
            if !self.drive(&mut session, Input::Start, turn, audio) {
                self.normal = Some(session);
            }
        }
    }

    fn open(
        &mut self,
        indicator: IndicatorId,
        chime: Arc<ChimeDefinition>,
        lifetime: Lifetime,
        channel: Channel,
    ) -> Session {
        self.next_session += 1;
        let cooldown_ms = match channel {
            Channel::Normal => lifetime.cooldown_ms(self.timing.min_cooldown_ms),
            Channel::Parallel => 0,
        };
        Session {
            id: SessionId(self.next_session),
            indicator,
            plan: Plan {
                repeat: chime.repeat,
                gap_ms: chime.gap_ms,
                cooldown_ms,
                retrigger_ms: self.timing.retrigger_ms,
            },
            chime,
            channel,
            progress: Progress::default(),
            playback: None,
            started_at: 0,
            timer: None,
        }
    }

    /// Feed `input` to the session and carry out the resulting actions.
    /// Returns `true` once the session is done.
    fn drive(
        &self,
        session: &mut Session,
        input: Input,
        turn: &mut Turn<'_>,
        audio: &mut dyn AudioBackend,
    ) -> bool {
        let mut input = Some(input);
        while let Some(next) = input.take() {
            let (progress, action) = transition(session.progress, &session.plan, next);
            session.progress = progress;
            match action {
                Action::Play => {
                    if let Err(e) = self.play(session, turn, audio) {
                        log::warn!("[chime] {} skipped for {}: {e}", session.chime.id, session.indicator);
                        input = Some(Input::Skipped);
                    }
                }
                Action::Wait(ms) => {
                    match progress.state {
                        PlaybackState::Cooldown => {
                            log::info!("[chime] {} cooling down for {ms} ms", session.chime.id)
                        }
                        _ => log::debug!("[chime] {} next play in {ms} ms", session.chime.id),
                    }
                    turn.cancel(&mut session.timer);
                    session.timer = Some(turn.after(ms, TimerEvent::Chime(session.id)));
                }
                Action::HaltAndFinish => {
                    if let Some(playback) = session.playback.take() {
                        audio.stop(playback);
                        turn.emit(Event::StopAudio {
                            channel: session.channel,
                            session: playback,
                        });
                    }
                    turn.cancel(&mut session.timer);
                }
                Action::Finish => {
                    turn.cancel(&mut session.timer);
                    log::debug!("[chime] {} session {} done", session.chime.id, session.id);
                }
                Action::Ignore => {}
            }
        }
        session.is_done()
    }

    fn play(
        &self,
        session: &mut Session,
        turn: &mut Turn<'_>,
        audio: &mut dyn AudioBackend,
    ) -> crate::audio::Result<()> {
        let volume = scale_volume(session.chime.volume, self.timing.volume_scale);
        let playback = audio.play(PlayRequest {
            channel: session.channel,
            asset: &session.chime.asset,
            volume,
            at_ms: turn.now(),
        })?;
        session.playback = Some(playback);
        session.started_at = turn.now();
        if session.progress.completed > 0 {
            log::info!(
                "[chime] {} repeats (play {})",
                session.chime.id,
                session.progress.completed + 1
            );
        }
        turn.emit(Event::PlayAudio {
            channel: session.channel,
            session: playback,
            asset: session.chime.asset.clone(),
            volume,
        });
        Ok(())
    }

    /// Whether `indicator` has a queued request or a live session.
    pub fn has_request_for(&self, indicator: IndicatorId) -> bool {
        self.queue.iter().any(|r| r.indicator == indicator)
            || self.normal.as_ref().is_some_and(|s| s.indicator == indicator)
            || self.parallel.iter().any(|s| s.indicator == indicator)
    }

    /// Indicators waiting in the queue, front first.
    pub fn queued(&self) -> impl Iterator<Item = &ChimeRequest> {
        self.queue.iter()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// The session occupying the normal channel.
    pub fn normal(&self) -> Option<SessionInfo> {
        self.normal.as_ref().map(SessionInfo::from)
    }

    pub fn parallel(&self) -> Vec<SessionInfo> {
        self.parallel.iter().map(SessionInfo::from).collect()
    }

    /// Indicators with a queued request or live session, queue first.
    pub fn requesters(&self) -> Vec<IndicatorId> {
        let mut ids: Vec<IndicatorId> = Vec::new();
        let all = self
            .queue
            .iter()
            .map(|r| r.indicator)
            .chain(self.normal.iter().map(|s| s.indicator))
            .chain(self.parallel.iter().map(|s| s.indicator));
        for id in all {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// No queued request and no live session.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.normal.is_none() && self.parallel.is_empty()
    }
}

impl Session {
    fn is_done(&self) -> bool {
        self.progress.state == PlaybackState::Done
    }
}

fn scale_volume(volume: u8, scale: u8) -> u8 {
    (u32::from(volume) * u32::from(scale) / 100).min(100) as u8
}
