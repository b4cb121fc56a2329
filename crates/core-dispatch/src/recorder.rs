//! Macro capture: raw token sequences stored under register keys.

use std::collections::HashMap;

use tracing::{debug, warn};

use core_commands::DispatchError;
use core_keys::KeyToken;

#[derive(Debug)]
struct Recording {
    register: KeyToken,
    buffer: Vec<KeyToken>,
}

/// Records raw tokens under a register key. The engine appends every token
/// it consumes while a recording is open, except the tokens that started or
/// stopped the recording itself.
#[derive(Debug, Default)]
pub struct MacroRecorder {
    macros: HashMap<KeyToken, Vec<KeyToken>>,
    recording: Option<Recording>,
}

impl MacroRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    pub fn current_register(&self) -> Option<KeyToken> {
        self.recording.as_ref().map(|r| r.register)
    }

    pub fn begin(&mut self, register: KeyToken) -> Result<(), DispatchError> {
        if let Some(open) = &self.recording {
            return Err(DispatchError::AlreadyRecording(open.register));
        }
        debug!(target: "dispatch.recorder", register = %register, "recording_started");
        self.recording = Some(Recording {
            register,
            buffer: Vec::new(),
        });
        Ok(())
    }

    /// Store the open recording under its register, overwriting any prior
    /// macro for that key.
    pub fn finish(&mut self) -> Result<KeyToken, DispatchError> {
        let open = self.recording.take().ok_or(DispatchError::NotRecording)?;
        debug!(
            target: "dispatch.recorder",
            register = %open.register,
            tokens = open.buffer.len(),
            "recording_finished"
        );
        self.macros.insert(open.register, open.buffer);
        Ok(open.register)
    }

    /// Discard an open recording without storing it (dispatch failure path).
    pub fn abort(&mut self) {
        if let Some(open) = self.recording.take() {
            warn!(target: "dispatch.recorder", register = %open.register, "recording_aborted");
        }
    }

    pub fn append(&mut self, tokens: &[KeyToken]) {
        if let Some(open) = &mut self.recording {
            open.buffer.extend_from_slice(tokens);
        }
    }

    pub fn get(&self, register: KeyToken) -> Option<&[KeyToken]> {
        self.macros.get(&register).map(Vec::as_slice)
    }

    /// The stored macro map, for persistence.
    pub fn macros(&self) -> &HashMap<KeyToken, Vec<KeyToken>> {
        &self.macros
    }

    /// Replace the stored macro map (startup restore). An open recording is
    /// unaffected.
    pub fn load(&mut self, macros: HashMap<KeyToken, Vec<KeyToken>>) {
        self.macros = macros;
    }
}
