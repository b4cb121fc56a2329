//! Scripted session double: records every mutation call for assertion and
//! moves a toy cursor with fixed strides.

use core_session::{BlockPath, CursorOptions, LineHit, Mode, OutlineCursor, Session, SessionFuture};

#[derive(Debug, Clone, Default)]
pub struct ScriptedCursor {
    pub path: BlockPath,
    pub position: usize,
}

impl OutlineCursor for ScriptedCursor {
    fn clone_cursor(&self) -> Box<dyn OutlineCursor> {
        Box::new(self.clone())
    }

    fn path(&self) -> BlockPath {
        self.path.clone()
    }

    fn position(&self) -> usize {
        self.position
    }

    fn left(&mut self, _opts: &CursorOptions) {
        self.position = self.position.saturating_sub(1);
    }

    fn right(&mut self, _opts: &CursorOptions) {
        self.position += 1;
    }

    fn up(&mut self, _opts: &CursorOptions) {
        if let Some(last) = self.path.last_mut() {
            *last = last.saturating_sub(1);
        }
    }

    fn down(&mut self, _opts: &CursorOptions) {
        if let Some(last) = self.path.last_mut() {
            *last += 1;
        }
    }

    fn home(&mut self, _opts: &CursorOptions) {
        self.position = 0;
    }

    fn end(&mut self, _opts: &CursorOptions) {
        self.position = 9;
    }

    fn parent(&mut self, _opts: &CursorOptions) {
        if self.path.len() > 1 {
            self.path.pop();
        }
    }

    fn word_forward(&mut self, _opts: &CursorOptions) {
        self.position += 4;
    }

    fn word_backward(&mut self, _opts: &CursorOptions) {
        self.position = self.position.saturating_sub(4);
    }

    fn next_clone(&mut self, _opts: &CursorOptions) {
        self.path = vec![7];
    }

    fn set_path(&mut self, path: BlockPath) {
        self.path = path;
    }

    fn set_position(&mut self, col: usize) {
        self.position = col;
    }

    fn toggle_property(&mut self, _property: &str) {}
}

#[derive(Debug)]
pub struct ScriptedSession {
    pub cursor: ScriptedCursor,
    pub mode: Mode,
    pub calls: Vec<String>,
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self {
            cursor: ScriptedCursor {
                path: vec![0],
                position: 0,
            },
            mode: Mode::Normal,
            calls: Vec::new(),
        }
    }
}

impl ScriptedSession {
    #[allow(dead_code)]
    pub fn count_of(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| c.as_str() == call).count()
    }
}

fn done() -> SessionFuture<'static> {
    Box::pin(async { Ok(()) })
}

impl Session for ScriptedSession {
    fn cursor(&mut self) -> &mut dyn OutlineCursor {
        &mut self.cursor
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn set_mode(&mut self, mode: Mode) -> SessionFuture<'_> {
        self.mode = mode;
        self.calls.push(format!("set_mode({})", mode.as_str()));
        done()
    }

    fn delete_blocks(&mut self, count: u32) -> SessionFuture<'_> {
        self.calls.push(format!("delete_blocks({count})"));
        done()
    }

    fn delete_span(&mut self, path: BlockPath, start: usize, end: usize) -> SessionFuture<'_> {
        self.calls
            .push(format!("delete_span({path:?}, {start}, {end})"));
        done()
    }

    fn yank_blocks(&mut self, count: u32) -> SessionFuture<'_> {
        self.calls.push(format!("yank_blocks({count})"));
        done()
    }

    fn yank_span(&mut self, path: BlockPath, start: usize, end: usize) -> SessionFuture<'_> {
        self.calls
            .push(format!("yank_span({path:?}, {start}, {end})"));
        done()
    }

    fn paste(&mut self, after: bool) -> SessionFuture<'_> {
        self.calls.push(format!("paste({after})"));
        done()
    }

    fn indent(&mut self, count: u32) -> SessionFuture<'_> {
        self.calls.push(format!("indent({count})"));
        done()
    }

    fn outdent(&mut self, count: u32) -> SessionFuture<'_> {
        self.calls.push(format!("outdent({count})"));
        done()
    }

    fn join(&mut self, count: u32) -> SessionFuture<'_> {
        self.calls.push(format!("join({count})"));
        done()
    }

    fn split_line(&mut self) -> SessionFuture<'_> {
        self.calls.push("split_line".to_string());
        done()
    }

    fn undo(&mut self, count: u32) -> SessionFuture<'_> {
        self.calls.push(format!("undo({count})"));
        done()
    }

    fn redo(&mut self, count: u32) -> SessionFuture<'_> {
        self.calls.push(format!("redo({count})"));
        done()
    }

    fn checkpoint(&mut self) -> SessionFuture<'_> {
        self.calls.push("checkpoint".to_string());
        done()
    }

    fn search<'a>(&'a mut self, text: &'a str) -> SessionFuture<'a, Vec<LineHit>> {
        self.calls.push(format!("search({text})"));
        Box::pin(async { Ok(Vec::new()) })
    }

    fn get_line(&mut self, path: BlockPath) -> SessionFuture<'_, String> {
        self.calls.push(format!("get_line({path:?})"));
        Box::pin(async { Ok(String::new()) })
    }

    fn get_child_range(&mut self, path: BlockPath) -> SessionFuture<'_, Vec<BlockPath>> {
        self.calls.push(format!("get_child_range({path:?})"));
        Box::pin(async { Ok(Vec::new()) })
    }
}
