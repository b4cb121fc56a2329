//! Built-in Action and Motion definitions matching the default keymap.

use anyhow::Result;
use tracing::debug;

use core_commands::{
    ActionDef, ActionFuture, Command, CommandRegistry, DispatchContext, DispatchEffect, MotionDef,
    MotionFn, RegistryError, ReplayPolicy,
};
use core_search::SharedSearchMenu;
use core_session::{BlockPath, CursorOptions, Mode};

/// Span covered by running `motion` `repeat` times from the current cursor,
/// probed on a clone so the real cursor stays put until the session mutates.
fn motion_span(
    ctx: &mut DispatchContext<'_>,
    motion: &MotionFn,
    repeat: u32,
) -> Result<(BlockPath, usize, usize)> {
    let cursor = ctx.session.cursor();
    let origin = cursor.position();
    let mut probe = cursor.clone_cursor();
    let opts = CursorOptions::past_end();
    for _ in 0..repeat {
        motion(&mut *probe, &opts)?;
    }
    let end = probe.position();
    Ok((probe.path(), origin.min(end), origin.max(end)))
}

fn delete(mut ctx: DispatchContext<'_>) -> ActionFuture<'_> {
    Box::pin(async move {
        let repeat = ctx.repeat;
        match ctx.take_motion() {
            Ok(motion) => {
                let (path, start, end) = motion_span(&mut ctx, &motion, repeat)?;
                ctx.session.delete_span(path, start, end).await
            }
            Err(_) => ctx.session.delete_blocks(repeat).await,
        }
    })
}

fn change(mut ctx: DispatchContext<'_>) -> ActionFuture<'_> {
    Box::pin(async move {
        let repeat = ctx.repeat;
        match ctx.take_motion() {
            Ok(motion) => {
                let (path, start, end) = motion_span(&mut ctx, &motion, repeat)?;
                ctx.session.delete_span(path, start, end).await?;
            }
            Err(_) => ctx.session.delete_blocks(repeat).await?,
        }
        ctx.session.set_mode(Mode::Insert).await
    })
}

fn yank(mut ctx: DispatchContext<'_>) -> ActionFuture<'_> {
    Box::pin(async move {
        let repeat = ctx.repeat;
        match ctx.take_motion() {
            Ok(motion) => {
                let (path, start, end) = motion_span(&mut ctx, &motion, repeat)?;
                ctx.session.yank_span(path, start, end).await
            }
            Err(_) => ctx.session.yank_blocks(repeat).await,
        }
    })
}

fn paste_after(ctx: DispatchContext<'_>) -> ActionFuture<'_> {
    Box::pin(async move {
        for _ in 0..ctx.repeat {
            ctx.session.paste(true).await?;
        }
        Ok(())
    })
}

fn paste_before(ctx: DispatchContext<'_>) -> ActionFuture<'_> {
    Box::pin(async move {
        for _ in 0..ctx.repeat {
            ctx.session.paste(false).await?;
        }
        Ok(())
    })
}

fn undo(ctx: DispatchContext<'_>) -> ActionFuture<'_> {
    Box::pin(async move { ctx.session.undo(ctx.repeat).await })
}

fn redo(ctx: DispatchContext<'_>) -> ActionFuture<'_> {
    Box::pin(async move { ctx.session.redo(ctx.repeat).await })
}

fn indent(ctx: DispatchContext<'_>) -> ActionFuture<'_> {
    Box::pin(async move { ctx.session.indent(ctx.repeat).await })
}

fn outdent(ctx: DispatchContext<'_>) -> ActionFuture<'_> {
    Box::pin(async move { ctx.session.outdent(ctx.repeat).await })
}

fn join(ctx: DispatchContext<'_>) -> ActionFuture<'_> {
    Box::pin(async move { ctx.session.join(ctx.repeat).await })
}

fn split_line(ctx: DispatchContext<'_>) -> ActionFuture<'_> {
    Box::pin(async move { ctx.session.split_line().await })
}

fn enter_insert(ctx: DispatchContext<'_>) -> ActionFuture<'_> {
    Box::pin(async move { ctx.session.set_mode(Mode::Insert).await })
}

fn enter_visual(ctx: DispatchContext<'_>) -> ActionFuture<'_> {
    Box::pin(async move { ctx.session.set_mode(Mode::Visual).await })
}

fn enter_search(ctx: DispatchContext<'_>) -> ActionFuture<'_> {
    Box::pin(async move { ctx.session.set_mode(Mode::Search).await })
}

fn to_normal(ctx: DispatchContext<'_>) -> ActionFuture<'_> {
    Box::pin(async move { ctx.session.set_mode(Mode::Normal).await })
}

fn toggle_help(_ctx: DispatchContext<'_>) -> ActionFuture<'_> {
    Box::pin(async move {
        // The overlay itself belongs to the presentation layer; subscribers
        // of the keymap/registry channels render it.
        debug!(target: "dispatch.builtins", "toggle_help");
        Ok(())
    })
}

fn record_macro(mut ctx: DispatchContext<'_>) -> ActionFuture<'_> {
    Box::pin(async move {
        if ctx.recording.is_some() {
            ctx.push_effect(DispatchEffect::FinishRecording);
        } else {
            let register = ctx.dequeue_key()?;
            ctx.push_effect(DispatchEffect::BeginRecording { register });
        }
        Ok(())
    })
}

fn play_macro(mut ctx: DispatchContext<'_>) -> ActionFuture<'_> {
    Box::pin(async move {
        let register = ctx.dequeue_key()?;
        ctx.push_effect(DispatchEffect::PlayMacro {
            register,
            times: ctx.repeat,
        });
        Ok(())
    })
}

fn replay_last(ctx: DispatchContext<'_>) -> ActionFuture<'_> {
    Box::pin(async move {
        ctx.push_effect(DispatchEffect::ReplayLast { times: ctx.repeat });
        Ok(())
    })
}

macro_rules! movement {
    ($fn_name:ident, $method:ident) => {
        fn $fn_name(ctx: DispatchContext<'_>) -> ActionFuture<'_> {
            Box::pin(async move {
                let opts = CursorOptions::default();
                for _ in 0..ctx.repeat {
                    ctx.session.cursor().$method(&opts);
                }
                Ok(())
            })
        }
    };
}

movement!(move_left, left);
movement!(move_right, right);
movement!(move_up, up);
movement!(move_down, down);
movement!(move_home, home);
movement!(move_end, end);
movement!(move_word_forward, word_forward);
movement!(move_word_back, word_backward);
movement!(move_parent, parent);
movement!(move_next_clone, next_clone);

/// Register every built-in editing command. Fails only on a name collision
/// with something already registered.
pub fn register_builtin_commands(registry: &mut CommandRegistry) -> Result<(), RegistryError> {
    use ReplayPolicy::{Drop, DropAll, Keep};

    let actions = [
        ActionDef::new("delete", "Delete blocks, or the span of a motion", Keep, delete),
        ActionDef::new("change", "Delete, then enter insert mode", Keep, change),
        ActionDef::new("yank", "Copy blocks, or the span of a motion", Drop, yank),
        ActionDef::new("paste-after", "Paste after the cursor", Keep, paste_after),
        ActionDef::new("paste-before", "Paste before the cursor", Keep, paste_before),
        ActionDef::new("undo", "Undo the last checkpoint", Drop, undo),
        ActionDef::new("redo", "Redo the last undone checkpoint", Drop, redo),
        ActionDef::new("indent", "Indent the current block", Keep, indent),
        ActionDef::new("outdent", "Outdent the current block", Keep, outdent),
        ActionDef::new("join", "Join the next line onto this one", Keep, join),
        ActionDef::new("split-line", "Split the line at the cursor", Keep, split_line),
        ActionDef::new("enter-insert", "Switch to insert mode", Drop, enter_insert),
        ActionDef::new("enter-visual", "Switch to visual mode", Drop, enter_visual),
        ActionDef::new("enter-search", "Switch to search mode", Drop, enter_search),
        ActionDef::new("leave-insert", "Return to normal mode", Drop, to_normal),
        ActionDef::new("leave-visual", "Return to normal mode", Drop, to_normal),
        ActionDef::new("toggle-help", "Toggle the hotkey help overlay", DropAll, toggle_help),
        ActionDef::new("record-macro", "Start or stop recording a macro", DropAll, record_macro),
        ActionDef::new("play-macro", "Play the macro in a register", Drop, play_macro),
        ActionDef::new("replay-last", "Repeat the last editing command", Drop, replay_last),
        ActionDef::new("move-left", "Move the cursor left", Drop, move_left),
        ActionDef::new("move-right", "Move the cursor right", Drop, move_right),
        ActionDef::new("move-up", "Move the cursor up", Drop, move_up),
        ActionDef::new("move-down", "Move the cursor down", Drop, move_down),
        ActionDef::new("move-home", "Move to the start of the line", Drop, move_home),
        ActionDef::new("move-end", "Move to the end of the line", Drop, move_end),
        ActionDef::new("move-word-forward", "Move a word forward", Drop, move_word_forward),
        ActionDef::new("move-word-back", "Move a word back", Drop, move_word_back),
        ActionDef::new("move-parent", "Move to the parent block", Drop, move_parent),
        ActionDef::new("move-next-clone", "Jump to the next clone", Drop, move_next_clone),
    ];
    for def in actions {
        registry.register(Command::Action(def))?;
    }

    let motions = [
        MotionDef::simple("motion-left", "One cell left", |c, o| c.left(o)),
        MotionDef::simple("motion-right", "One cell right", |c, o| c.right(o)),
        MotionDef::simple("motion-up", "One line up", |c, o| c.up(o)),
        MotionDef::simple("motion-down", "One line down", |c, o| c.down(o)),
        MotionDef::simple("motion-home", "Start of line", |c, o| c.home(o)),
        MotionDef::simple("motion-end", "End of line", |c, o| c.end(o)),
        MotionDef::simple("motion-word-forward", "Next word", |c, o| c.word_forward(o)),
        MotionDef::simple("motion-word-back", "Previous word", |c, o| c.word_backward(o)),
        MotionDef::simple("motion-parent", "Parent block", |c, o| c.parent(o)),
        MotionDef::simple("motion-next-clone", "Next clone", |c, o| c.next_clone(o)),
    ];
    for def in motions {
        registry.register(Command::Motion(def))?;
    }
    Ok(())
}

/// Register the search-mode commands over a shared menu handle.
pub fn register_search_commands(
    registry: &mut CommandRegistry,
    menu: SharedSearchMenu,
) -> Result<(), RegistryError> {
    let up_menu = menu.clone();
    registry.register(Command::Action(ActionDef::new(
        "search-up",
        "Move the search selection up",
        ReplayPolicy::DropAll,
        move |_ctx| {
            let menu = up_menu.clone();
            Box::pin(async move {
                menu.lock().await.up();
                Ok(())
            })
        },
    )))?;

    let down_menu = menu.clone();
    registry.register(Command::Action(ActionDef::new(
        "search-down",
        "Move the search selection down",
        ReplayPolicy::DropAll,
        move |_ctx| {
            let menu = down_menu.clone();
            Box::pin(async move {
                menu.lock().await.down();
                Ok(())
            })
        },
    )))?;

    registry.register(Command::Action(ActionDef::new(
        "search-accept",
        "Jump to the selected result",
        ReplayPolicy::Drop,
        move |ctx| {
            let menu = menu.clone();
            Box::pin(async move {
                let hit = menu.lock().await.selected().cloned();
                if let Some(hit) = hit {
                    let cursor = ctx.session.cursor();
                    cursor.set_path(hit.path.clone());
                    cursor.set_position(hit.matches.first().copied().unwrap_or(0));
                }
                ctx.session.set_mode(Mode::Normal).await
            })
        },
    )))?;

    registry.register(Command::Action(ActionDef::new(
        "leave-search",
        "Return to normal mode",
        ReplayPolicy::Drop,
        to_normal,
    )))?;
    Ok(())
}
