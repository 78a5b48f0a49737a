//! Command registry
//!
//! Ordered, per-device collection of [`CommandDescriptor`]s. Descriptors are
//! addressable by the 0-based sequence index assigned at registration and by
//! protocol code.

use crate::error::{BusError, Result};

use super::CommandDescriptor;

/// Per-device command table
#[derive(Debug, Clone)]
pub struct CommandRegistry<H> {
    commands: Vec<CommandDescriptor<H>>,
}

impl<H> CommandRegistry<H> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Append a descriptor and return its sequence index
    ///
    /// Duplicate `(code, sub_parameter)` pairs are accepted; code lookup then
    /// resolves to the first one registered and the later one is reachable
    /// only by index.
    pub fn add_command(&mut self, command: CommandDescriptor<H>) -> usize {
        let index = self.commands.len();
        tracing::trace!(index, code = command.code, name = %command.name, "Registered command");
        self.commands.push(command);
        index
    }

    /// Append a descriptor, rejecting duplicate `(code, sub_parameter)` pairs
    pub fn try_add_command(&mut self, command: CommandDescriptor<H>) -> Result<usize> {
        let duplicate = self
            .commands
            .iter()
            .any(|c| c.code == command.code && c.sub_parameter == command.sub_parameter);

        if duplicate {
            return Err(BusError::DuplicateCommand {
                code: command.code,
                sub_parameter: command.sub_parameter,
            });
        }

        Ok(self.add_command(command))
    }

    /// Get a descriptor by sequence index
    pub fn get_command(&self, index: usize) -> Result<&CommandDescriptor<H>> {
        self.commands.get(index).ok_or_else(|| {
            BusError::CommandNotFound(format!(
                "index {} (registry holds {})",
                index,
                self.commands.len()
            ))
        })
    }

    /// Get the first descriptor registered for `code` (and `sub_parameter`, if given)
    pub fn get_command_by_code(
        &self,
        code: u8,
        sub_parameter: Option<[u8; 2]>,
    ) -> Result<&CommandDescriptor<H>> {
        self.commands
            .iter()
            .find(|c| c.matches(code, sub_parameter))
            .ok_or_else(|| match sub_parameter {
                Some([p0, p1]) => BusError::CommandNotFound(format!("code {} [{}, {}]", code, p0, p1)),
                None => BusError::CommandNotFound(format!("code {}", code)),
            })
    }

    /// Sequence index of the first descriptor matching `code` / `sub_parameter`
    pub fn index_of(&self, code: u8, sub_parameter: Option<[u8; 2]>) -> Option<usize> {
        self.commands.iter().position(|c| c.matches(code, sub_parameter))
    }

    /// Number of registered descriptors
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Iterate in registration order
    pub fn iter(&self) -> impl Iterator<Item = &CommandDescriptor<H>> {
        self.commands.iter()
    }
}

impl<H> Default for CommandRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}
