use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use core_keys::KeyToken;
use core_session::{Mode, Session};

use crate::MotionFn;

/// Dispatch-time failures surfaced from command bodies.
///
/// `PendingInput` is special: it must be raised before the body performs any
/// side effect. The engine maps it to a WAITING outcome, holds the token
/// buffer, and restarts the body once more input arrives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("command requires a motion argument but none was resolved")]
    MotionMissing,
    #[error("more input is required to finish this command")]
    PendingInput,
    #[error("already recording a macro into register `{0}`")]
    AlreadyRecording(KeyToken),
    #[error("no macro recording in progress")]
    NotRecording,
}

/// Raw tokens trailing the matched key sequence, shared between the engine
/// and the running command body. Bodies consume from the front (macro
/// register designators); the engine inspects what remains afterwards.
#[derive(Clone, Default)]
pub struct KeyQueue {
    inner: Arc<Mutex<VecDeque<KeyToken>>>,
}

impl KeyQueue {
    pub fn new(tokens: impl IntoIterator<Item = KeyToken>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tokens.into_iter().collect())),
        }
    }

    pub fn pop(&self) -> Option<KeyToken> {
        self.inner.lock().expect("key queue poisoned").pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("key queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Requests a command body hands back to the engine for execution after the
/// body completes. Macro playback is deferred this way so the engine never
/// re-enters itself while a body is still running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEffect {
    /// Re-feed the named register's stored tokens as if freshly typed.
    PlayMacro { register: KeyToken, times: u32 },
    /// Replay the last `Keep` action's token sequence.
    ReplayLast { times: u32 },
    BeginRecording { register: KeyToken },
    FinishRecording,
}

#[derive(Clone, Default)]
pub struct EffectQueue {
    inner: Arc<Mutex<Vec<DispatchEffect>>>,
}

impl EffectQueue {
    pub fn push(&self, effect: DispatchEffect) {
        self.inner.lock().expect("effect queue poisoned").push(effect);
    }

    pub fn drain(&self) -> Vec<DispatchEffect> {
        std::mem::take(&mut *self.inner.lock().expect("effect queue poisoned"))
    }
}

/// Ephemeral value handed to every Action/Motion body; lives for one dispatch
/// cycle. Everything a body may touch arrives here explicitly; bodies
/// capture no ambient mutable state.
pub struct DispatchContext<'a> {
    pub mode: Mode,
    /// Accumulated repeat count, >= 1.
    pub repeat: u32,
    /// Register currently being recorded, if any.
    pub recording: Option<KeyToken>,
    pub session: &'a mut dyn Session,
    motion: Option<MotionFn>,
    keys: KeyQueue,
    effects: EffectQueue,
}

impl<'a> DispatchContext<'a> {
    pub fn new(
        mode: Mode,
        repeat: u32,
        recording: Option<KeyToken>,
        session: &'a mut dyn Session,
        keys: KeyQueue,
        effects: EffectQueue,
    ) -> Self {
        Self {
            mode,
            repeat,
            recording,
            session,
            motion: None,
            keys,
            effects,
        }
    }

    pub fn with_motion(mut self, motion: MotionFn) -> Self {
        self.motion = Some(motion);
        self
    }

    /// The resolved motion argument, for operators. Fails with
    /// [`DispatchError::MotionMissing`] when the action was invoked outside
    /// operator context.
    pub fn take_motion(&mut self) -> Result<MotionFn, DispatchError> {
        self.motion.take().ok_or(DispatchError::MotionMissing)
    }

    pub fn has_motion(&self) -> bool {
        self.motion.is_some()
    }

    /// Next raw token beyond the matched sequence.
    pub fn dequeue_key(&mut self) -> Result<KeyToken, DispatchError> {
        self.keys.pop().ok_or(DispatchError::PendingInput)
    }

    pub fn push_effect(&self, effect: DispatchEffect) {
        self.effects.push(effect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_session::{BlockPath, CursorOptions, LineHit, OutlineCursor, SessionFuture};
    use std::sync::Arc;

    struct NullCursor;

    impl OutlineCursor for NullCursor {
        fn clone_cursor(&self) -> Box<dyn OutlineCursor> {
            Box::new(NullCursor)
        }
        fn path(&self) -> BlockPath {
            vec![]
        }
        fn position(&self) -> usize {
            0
        }
        fn left(&mut self, _: &CursorOptions) {}
        fn right(&mut self, _: &CursorOptions) {}
        fn up(&mut self, _: &CursorOptions) {}
        fn down(&mut self, _: &CursorOptions) {}
        fn home(&mut self, _: &CursorOptions) {}
        fn end(&mut self, _: &CursorOptions) {}
        fn parent(&mut self, _: &CursorOptions) {}
        fn word_forward(&mut self, _: &CursorOptions) {}
        fn word_backward(&mut self, _: &CursorOptions) {}
        fn next_clone(&mut self, _: &CursorOptions) {}
        fn set_path(&mut self, _: BlockPath) {}
        fn set_position(&mut self, _: usize) {}
        fn toggle_property(&mut self, _: &str) {}
    }

    struct NullSession {
        cursor: NullCursor,
    }

    fn ready() -> SessionFuture<'static> {
        Box::pin(async { Ok(()) })
    }

    impl core_session::Session for NullSession {
        fn cursor(&mut self) -> &mut dyn OutlineCursor {
            &mut self.cursor
        }
        fn mode(&self) -> Mode {
            Mode::Normal
        }
        fn set_mode(&mut self, _: Mode) -> SessionFuture<'_> {
            ready()
        }
        fn delete_blocks(&mut self, _: u32) -> SessionFuture<'_> {
            ready()
        }
        fn delete_span(&mut self, _: BlockPath, _: usize, _: usize) -> SessionFuture<'_> {
            ready()
        }
        fn yank_blocks(&mut self, _: u32) -> SessionFuture<'_> {
            ready()
        }
        fn yank_span(&mut self, _: BlockPath, _: usize, _: usize) -> SessionFuture<'_> {
            ready()
        }
        fn paste(&mut self, _: bool) -> SessionFuture<'_> {
            ready()
        }
        fn indent(&mut self, _: u32) -> SessionFuture<'_> {
            ready()
        }
        fn outdent(&mut self, _: u32) -> SessionFuture<'_> {
            ready()
        }
        fn join(&mut self, _: u32) -> SessionFuture<'_> {
            ready()
        }
        fn split_line(&mut self) -> SessionFuture<'_> {
            ready()
        }
        fn undo(&mut self, _: u32) -> SessionFuture<'_> {
            ready()
        }
        fn redo(&mut self, _: u32) -> SessionFuture<'_> {
            ready()
        }
        fn checkpoint(&mut self) -> SessionFuture<'_> {
            ready()
        }
        fn search<'a>(&'a mut self, _: &'a str) -> SessionFuture<'a, Vec<LineHit>> {
            Box::pin(async { Ok(vec![]) })
        }
        fn get_line(&mut self, _: BlockPath) -> SessionFuture<'_, String> {
            Box::pin(async { Ok(String::new()) })
        }
        fn get_child_range(&mut self, _: BlockPath) -> SessionFuture<'_, Vec<BlockPath>> {
            Box::pin(async { Ok(vec![]) })
        }
    }

    fn ctx(session: &mut NullSession, keys: KeyQueue) -> DispatchContext<'_> {
        DispatchContext::new(
            Mode::Normal,
            1,
            None,
            session,
            keys,
            EffectQueue::default(),
        )
    }

    #[test]
    fn take_motion_outside_operator_context_fails() {
        let mut session = NullSession { cursor: NullCursor };
        let mut c = ctx(&mut session, KeyQueue::default());
        assert!(matches!(c.take_motion(), Err(DispatchError::MotionMissing)));
    }

    #[test]
    fn take_motion_consumes_the_injected_fn() {
        let mut session = NullSession { cursor: NullCursor };
        let motion: MotionFn = Arc::new(|_, _| Ok(()));
        let mut c = ctx(&mut session, KeyQueue::default()).with_motion(motion);
        assert!(c.has_motion());
        assert!(c.take_motion().is_ok());
        assert!(matches!(c.take_motion(), Err(DispatchError::MotionMissing)));
    }

    #[test]
    fn dequeue_key_reports_pending_input_when_exhausted() {
        let mut session = NullSession { cursor: NullCursor };
        let keys = KeyQueue::new([KeyToken::ch('a')]);
        let mut c = ctx(&mut session, keys);
        assert_eq!(c.dequeue_key().unwrap(), KeyToken::ch('a'));
        assert_eq!(c.dequeue_key().unwrap_err(), DispatchError::PendingInput);
    }

    #[test]
    fn effects_drain_in_push_order() {
        let effects = EffectQueue::default();
        effects.push(DispatchEffect::BeginRecording {
            register: KeyToken::ch('a'),
        });
        effects.push(DispatchEffect::FinishRecording);
        let drained = effects.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(
            drained[0],
            DispatchEffect::BeginRecording {
                register: KeyToken::ch('a')
            }
        );
        assert!(effects.drain().is_empty());
    }
}
