//! Command execution context

use crate::store::MemoryStore;

/// Context provided to commands during execution
///
/// Borrows the database the command targets; the caller picks it.
pub struct CommandContext<'a> {
    pub store: &'a mut MemoryStore,
}

impl<'a> CommandContext<'a> {
    pub fn new(store: &'a mut MemoryStore) -> Self {
        CommandContext { store }
    }
}
