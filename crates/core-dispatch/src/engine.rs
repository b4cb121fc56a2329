//! The dispatch state machine.
//!
//! One engine instance owns the command registry, the resolvable keymap
//! view, and the macro recorder. `feed` accepts a single token, re-resolves
//! the held attempt buffer against the active mode's mapping, and reports
//! one of four outcomes:
//!
//! - `Dispatched`: a command ran to completion; buffer and count cleared.
//! - `Waiting`: the buffer is a valid but incomplete prefix (or a command
//!   body asked for more raw input); the buffer is held for the next token.
//! - `NoMatch`: nothing can complete from here; buffer and count cleared.
//! - `Cancelled`: escape cleared a pending buffer.
//!
//! Command bodies never re-enter the engine. Macro playback and replay are
//! handed back as effects and run after the body completes, so nested
//! playback is iteration, not recursion.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use core_commands::{
    Command, CommandKind, CommandRegistry, DispatchContext, DispatchEffect, DispatchError,
    EffectQueue, KeyQueue, MotionFn, ReplayPolicy,
};
use core_keymap::{KeymapView, KeymapWatcher, MappingTable, ModeMapping};
use core_keys::{KeyToken, NamedKey};
use core_session::{Mode, Session};

use crate::matcher::{match_buffer, split_count};
use crate::recorder::MacroRecorder;

const ESC: KeyToken = KeyToken::named(NamedKey::Esc);

/// Hard ceiling on tokens replayed per `feed`, so a macro that plays itself
/// ends instead of looping.
const REPLAY_TOKEN_CAP: usize = 10_000;

/// Per-token result reported back to the input source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatched,
    Waiting,
    NoMatch,
    Cancelled,
}

enum MotionResolution {
    Resolved { motion: MotionFn, consumed: usize },
    Waiting,
    NoMatch,
}

pub struct DispatchEngine {
    registry: CommandRegistry,
    keymap: KeymapView,
    /// Merged snapshot of `keymap`, re-taken only when a parent table
    /// signals a change through its watch channel.
    mapping_cache: MappingTable,
    keymap_watch: KeymapWatcher,
    recorder: MacroRecorder,
    /// Raw tokens of the in-progress command attempt, count digits included.
    attempt: SmallVec<[KeyToken; 8]>,
    last_command: Option<Vec<KeyToken>>,
    effects: EffectQueue,
    pending_effects: VecDeque<DispatchEffect>,
}

impl DispatchEngine {
    pub fn new(registry: CommandRegistry, keymap: impl Into<KeymapView>) -> Self {
        let keymap = keymap.into();
        let keymap_watch = keymap.subscribe();
        let mapping_cache = keymap.effective();
        Self {
            registry,
            keymap,
            mapping_cache,
            keymap_watch,
            recorder: MacroRecorder::new(),
            attempt: SmallVec::new(),
            last_command: None,
            effects: EffectQueue::default(),
            pending_effects: VecDeque::new(),
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Mutable registry access for plugin load/unload. Not to be called
    /// while a feed is in flight.
    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    pub fn keymap(&self) -> &KeymapView {
        &self.keymap
    }

    pub fn recorder(&self) -> &MacroRecorder {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut MacroRecorder {
        &mut self.recorder
    }

    /// Token sequence of the last `Keep`-policy command, as replayed by
    /// `replay-last`.
    pub fn last_command(&self) -> Option<&[KeyToken]> {
        self.last_command.as_deref()
    }

    /// Tokens held while the outcome is `Waiting`.
    pub fn pending(&self) -> &[KeyToken] {
        &self.attempt
    }

    /// Feed one token. The returned future completes only once the token is
    /// fully handled, including any action body and deferred macro playback;
    /// the host must not feed the next token before then.
    pub async fn feed(
        &mut self,
        session: &mut dyn Session,
        token: KeyToken,
    ) -> Result<DispatchOutcome> {
        let outcome = self.feed_token(session, token, true).await?;
        self.drain_effects(session).await?;
        Ok(outcome)
    }

    /// Feed a run of tokens, returning the outcome of the last one.
    pub async fn feed_all(
        &mut self,
        session: &mut dyn Session,
        tokens: impl IntoIterator<Item = KeyToken>,
    ) -> Result<DispatchOutcome> {
        let mut outcome = DispatchOutcome::Waiting;
        for token in tokens {
            outcome = self.feed(session, token).await?;
        }
        Ok(outcome)
    }

    /// Re-snapshot the merged table only when a parent reports a new version.
    fn refresh_keymap(&mut self) {
        if self.keymap_watch.poll_changed() {
            trace!(target: "dispatch.engine", "keymap_cache_refreshed");
            self.mapping_cache = self.keymap.effective();
        }
    }

    async fn feed_token(
        &mut self,
        session: &mut dyn Session,
        token: KeyToken,
        record: bool,
    ) -> Result<DispatchOutcome> {
        if token == ESC && !self.attempt.is_empty() {
            let mut cancelled: Vec<KeyToken> = self.attempt.drain(..).collect();
            cancelled.push(token);
            if record {
                self.recorder.append(&cancelled);
            }
            debug!(target: "dispatch.engine", "attempt_cancelled");
            return Ok(DispatchOutcome::Cancelled);
        }

        self.attempt.push(token);
        let mode = session.mode();
        self.refresh_keymap();
        let empty = ModeMapping::default();
        let mapping = self.mapping_cache.mode_mapping(mode).unwrap_or(&empty);
        let (repeat, digits) = split_count(&self.attempt);
        let buffer: Vec<KeyToken> = self.attempt[digits..].to_vec();
        if buffer.is_empty() {
            trace!(target: "dispatch.engine", repeat, "accumulating_count");
            return Ok(DispatchOutcome::Waiting);
        }

        let m = match_buffer(&self.registry, mapping, &buffer, CommandKind::Action);
        let plan = if let Some(name) = m.full {
            Some((name, self.attempt.len(), None))
        } else if let Some((name, literal_len)) = m.operator {
            let rest = buffer[literal_len..].to_vec();
            let resolution = match self.resolve_motion(session, mode, mapping, &rest).await {
                Ok(resolution) => resolution,
                Err(err) => return self.body_error(err),
            };
            match resolution {
                MotionResolution::Resolved { motion, consumed } => {
                    Some((name, digits + literal_len + consumed, Some(motion)))
                }
                MotionResolution::Waiting => return Ok(DispatchOutcome::Waiting),
                MotionResolution::NoMatch => {
                    if m.prefix {
                        return Ok(DispatchOutcome::Waiting);
                    }
                    m.contained.map(|(name, len)| (name, digits + len, None))
                }
            }
        } else if let Some((name, len)) = m.contained {
            Some((name, digits + len, None))
        } else if m.prefix {
            trace!(target: "dispatch.engine", buffer = %display_run(&buffer), "prefix_held");
            return Ok(DispatchOutcome::Waiting);
        } else {
            None
        };

        let Some((name, consumed, motion)) = plan else {
            let tokens: Vec<KeyToken> = self.attempt.drain(..).collect();
            if record {
                self.recorder.append(&tokens);
            }
            debug!(
                target: "dispatch.engine",
                mode = mode.as_str(),
                tokens = %display_run(&tokens),
                "no_match"
            );
            return Ok(DispatchOutcome::NoMatch);
        };

        let def = match self.registry.lookup(&name) {
            Some(Command::Action(def)) => def.clone(),
            _ => {
                warn!(target: "dispatch.engine", command = %name, "matched_name_not_an_action");
                self.attempt.clear();
                return Ok(DispatchOutcome::NoMatch);
            }
        };

        let queue = KeyQueue::new(self.attempt[consumed..].iter().copied());
        let mut ctx = DispatchContext::new(
            mode,
            repeat,
            self.recorder.current_register(),
            session,
            queue,
            self.effects.clone(),
        );
        if let Some(motion) = motion {
            ctx = ctx.with_motion(motion);
        }
        trace!(target: "dispatch.engine", command = %name, repeat, "dispatching");
        match (def.run)(ctx).await {
            Ok(()) => {}
            Err(err) if is_pending_input(&err) => {
                debug!(target: "dispatch.engine", command = %name, "awaiting_raw_input");
                return Ok(DispatchOutcome::Waiting);
            }
            Err(err) => {
                warn!(target: "dispatch.engine", command = %name, error = %err, "action_failed");
                return self.body_error(err);
            }
        }

        let tokens: Vec<KeyToken> = self.attempt.drain(..).collect();
        let cycle_effects = self.effects.drain();
        let toggles_recording = cycle_effects.iter().any(|e| {
            matches!(
                e,
                DispatchEffect::BeginRecording { .. } | DispatchEffect::FinishRecording
            )
        });
        if record && self.recorder.is_recording() && !toggles_recording {
            self.recorder.append(&tokens);
        }
        self.pending_effects.extend(cycle_effects);

        match def.replay {
            ReplayPolicy::Keep => {
                session.checkpoint().await?;
                self.last_command = Some(tokens);
            }
            ReplayPolicy::Drop => session.checkpoint().await?,
            ReplayPolicy::DropAll => {}
        }
        debug!(target: "dispatch.engine", command = %name, repeat, "dispatched");
        Ok(DispatchOutcome::Dispatched)
    }

    /// Resolve the trailing tokens of an operator attempt into a motion
    /// function, applying the motion's own leading count.
    async fn resolve_motion(
        &self,
        session: &mut dyn Session,
        mode: Mode,
        mapping: &ModeMapping,
        rest: &[KeyToken],
    ) -> Result<MotionResolution> {
        let (count, digits) = split_count(rest);
        let inner = &rest[digits..];
        if inner.is_empty() {
            return Ok(MotionResolution::Waiting);
        }
        let m = match_buffer(&self.registry, mapping, inner, CommandKind::Motion);
        let Some(name) = m.full else {
            return Ok(if m.prefix {
                MotionResolution::Waiting
            } else {
                MotionResolution::NoMatch
            });
        };
        let def = match self.registry.lookup(&name) {
            Some(Command::Motion(def)) => def.clone(),
            _ => return Ok(MotionResolution::NoMatch),
        };
        let ctx = DispatchContext::new(
            mode,
            1,
            self.recorder.current_register(),
            session,
            KeyQueue::default(),
            self.effects.clone(),
        );
        let base = (def.build)(ctx).await?;
        let motion: MotionFn = if count <= 1 {
            base
        } else {
            Arc::new(move |cursor, opts| {
                for _ in 0..count {
                    base(cursor, opts)?;
                }
                Ok(())
            })
        };
        trace!(target: "dispatch.engine", motion = %name, count, "motion_resolved");
        Ok(MotionResolution::Resolved {
            motion,
            consumed: rest.len(),
        })
    }

    /// Fail-safe reset: one failed command must not corrupt the next cycle.
    fn body_error(&mut self, err: anyhow::Error) -> Result<DispatchOutcome> {
        if is_pending_input(&err) {
            return Ok(DispatchOutcome::Waiting);
        }
        self.attempt.clear();
        self.recorder.abort();
        self.effects.drain();
        self.pending_effects.clear();
        Err(err)
    }

    async fn drain_effects(&mut self, session: &mut dyn Session) -> Result<()> {
        let mut replayed = 0usize;
        while let Some(effect) = self.pending_effects.pop_front() {
            match effect {
                DispatchEffect::BeginRecording { register } => {
                    self.recorder.begin(register)?;
                }
                DispatchEffect::FinishRecording => {
                    self.recorder.finish()?;
                }
                DispatchEffect::PlayMacro { register, times } => {
                    let Some(tokens) = self.recorder.get(register).map(<[KeyToken]>::to_vec)
                    else {
                        debug!(target: "dispatch.engine", register = %register, "empty_register");
                        continue;
                    };
                    self.replay(session, &tokens, times, &mut replayed).await?;
                }
                DispatchEffect::ReplayLast { times } => {
                    let Some(tokens) = self.last_command.clone() else {
                        continue;
                    };
                    self.replay(session, &tokens, times, &mut replayed).await?;
                }
            }
        }
        Ok(())
    }

    /// Re-feed stored tokens as if freshly typed. Replayed tokens are not
    /// appended to an open recording; the keystrokes that requested the
    /// playback already were.
    async fn replay(
        &mut self,
        session: &mut dyn Session,
        tokens: &[KeyToken],
        times: u32,
        replayed: &mut usize,
    ) -> Result<()> {
        for _ in 0..times {
            for &token in tokens {
                *replayed += 1;
                if *replayed > REPLAY_TOKEN_CAP {
                    warn!(target: "dispatch.engine", cap = REPLAY_TOKEN_CAP, "replay_cap_reached");
                    self.pending_effects.clear();
                    return Ok(());
                }
                self.feed_token(session, token, false).await?;
            }
        }
        Ok(())
    }
}

fn is_pending_input(err: &anyhow::Error) -> bool {
    err.downcast_ref::<DispatchError>() == Some(&DispatchError::PendingInput)
}

fn display_run(tokens: &[KeyToken]) -> String {
    let mut out = String::new();
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&token.to_string());
    }
    out
}
