use std::collections::HashMap;

use tokio::sync::watch;
use tracing::debug;

use crate::{Command, CommandKind};

/// Errors raised by registry mutation. These are programmer errors
/// (misconfiguration at startup or plugin load) and may abort initialization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("command `{0}` is already registered")]
    DuplicateName(String),
    #[error("command `{0}` is not registered")]
    NotRegistered(String),
    #[error("command `{name}` is registered as {actual}, not {expected}")]
    WrongKind {
        name: String,
        expected: CommandKind,
        actual: CommandKind,
    },
}

/// Holds every Action and Motion definition, keyed by unique name.
///
/// Mutations bump a version published over a watch channel; keymap tables and
/// help renderers subscribe to refresh themselves. The registry itself holds
/// no mode knowledge.
pub struct CommandRegistry {
    commands: HashMap<String, Command>,
    version: u64,
    notify: watch::Sender<u64>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            commands: HashMap::new(),
            version: 0,
            notify,
        }
    }

    pub fn register(&mut self, command: Command) -> Result<(), RegistryError> {
        let name = command.name().to_string();
        if self.commands.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        debug!(target: "registry", name = %name, kind = %command.kind(), "command_registered");
        self.commands.insert(name, command);
        self.bump();
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    /// Remove a command. The caller must name the stored kind; asking for the
    /// wrong kind fails without removing anything.
    pub fn deregister(
        &mut self,
        name: &str,
        expected: CommandKind,
    ) -> Result<Command, RegistryError> {
        let actual = self
            .commands
            .get(name)
            .map(Command::kind)
            .ok_or_else(|| RegistryError::NotRegistered(name.to_string()))?;
        if actual != expected {
            return Err(RegistryError::WrongKind {
                name: name.to_string(),
                expected,
                actual,
            });
        }
        let removed = self.commands.remove(name).expect("presence checked above");
        debug!(target: "registry", name = %name, kind = %expected, "command_deregistered");
        self.bump();
        Ok(removed)
    }

    /// Watch receiver observing the registry version; bumped on every
    /// successful register/deregister.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    fn bump(&mut self) {
        self.version += 1;
        // Send only fails when no receiver exists, which is fine: the next
        // subscriber still sees the latest version.
        let _ = self.notify.send(self.version);
    }
}
