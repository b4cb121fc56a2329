//! Command definitions and the command registry.
//!
//! A [`Command`] is either an *Action* (a terminal command that mutates the
//! session) or a *Motion* (a command that yields a cursor-movement function
//! for an operator to consume). Both kinds share one namespace: the
//! [`CommandRegistry`] enforces global name uniqueness and publishes a
//! version number over a watch channel so keymap/help surfaces can re-render
//! when the command set changes at runtime (plugin load/unload).
//!
//! Runtime kind checks are avoided by construction: the registry stores the
//! sum type and dispatch pattern-matches on it, so an Action can never be
//! resolved where a Motion is required.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use core_session::{CursorOptions, OutlineCursor};

mod context;
mod registry;

pub use context::{DispatchContext, DispatchEffect, DispatchError, EffectQueue, KeyQueue};
pub use registry::{CommandRegistry, RegistryError};

/// Future returned by an action body.
pub type ActionFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + 'a>>;

/// Future returned by a motion definition while it builds its [`MotionFn`].
pub type MotionFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<MotionFn>> + 'a>>;

/// A resolved cursor-movement function. Moves the given cursor in place; it
/// never runs as a top-level command on its own.
pub type MotionFn =
    Arc<dyn Fn(&mut dyn OutlineCursor, &CursorOptions) -> anyhow::Result<()> + Send + Sync>;

/// Asynchronous action body. Receives the per-cycle [`DispatchContext`] by
/// value; the returned future must complete before the engine admits the
/// next key token.
pub type ActionFn = Arc<dyn for<'a> Fn(DispatchContext<'a>) -> ActionFuture<'a> + Send + Sync>;

/// Asynchronous motion builder: yields the [`MotionFn`] an operator will
/// apply.
pub type MotionBuildFn = Arc<dyn for<'a> Fn(DispatchContext<'a>) -> MotionFuture<'a> + Send + Sync>;

/// Visibility of a completed action in undo/replay bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplayPolicy {
    /// Commit as an undo checkpoint and as the replayable "last command".
    #[default]
    Keep,
    /// Commit for undo only; excluded from last-command replay (navigation
    /// and other read-only actions).
    Drop,
    /// Discard the whole in-progress recorded sequence (transient actions
    /// such as toggling an overlay).
    DropAll,
}

/// Discriminant used when deregistering and for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Action,
    Motion,
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandKind::Action => write!(f, "action"),
            CommandKind::Motion => write!(f, "motion"),
        }
    }
}

#[derive(Clone)]
pub struct ActionDef {
    pub name: String,
    pub description: String,
    pub replay: ReplayPolicy,
    pub run: ActionFn,
}

impl ActionDef {
    pub fn new<F>(name: &str, description: &str, replay: ReplayPolicy, run: F) -> Self
    where
        F: for<'a> Fn(DispatchContext<'a>) -> ActionFuture<'a> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            replay,
            run: Arc::new(run),
        }
    }
}

impl std::fmt::Debug for ActionDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDef")
            .field("name", &self.name)
            .field("replay", &self.replay)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct MotionDef {
    pub name: String,
    pub description: String,
    pub build: MotionBuildFn,
}

impl MotionDef {
    pub fn new<F>(name: &str, description: &str, build: F) -> Self
    where
        F: for<'a> Fn(DispatchContext<'a>) -> MotionFuture<'a> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            build: Arc::new(build),
        }
    }

    /// Motion over a plain synchronous cursor function, the common case.
    pub fn simple<F>(name: &str, description: &str, movement: F) -> Self
    where
        F: Fn(&mut dyn OutlineCursor, &CursorOptions) + Send + Sync + Copy + 'static,
    {
        Self::new(name, description, move |_ctx| {
            Box::pin(async move {
                let f: MotionFn = Arc::new(move |cursor, opts| {
                    movement(cursor, opts);
                    Ok(())
                });
                Ok(f)
            })
        })
    }
}

impl std::fmt::Debug for MotionDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionDef")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum Command {
    Action(ActionDef),
    Motion(MotionDef),
}

impl Command {
    pub fn name(&self) -> &str {
        match self {
            Command::Action(def) => &def.name,
            Command::Motion(def) => &def.name,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Command::Action(def) => &def.description,
            Command::Motion(def) => &def.description,
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Action(_) => CommandKind::Action,
            Command::Motion(_) => CommandKind::Motion,
        }
    }
}
