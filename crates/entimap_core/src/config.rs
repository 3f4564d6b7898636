//! Unit-of-work and journal configuration.

use crate::tracker::EntryState;

/// Configuration for a unit of work.
#[derive(Debug, Clone, Copy)]
pub struct UnitOfWorkConfig {
    /// Either [`EntryState::Dirty`] or [`EntryState::Clean`]; set through
    /// [`UnitOfWorkConfig::clean_after_commit`].
    committed_state: EntryState,

    /// Whether rollback reloads dirty and deleted entities from the mapper.
    ///
    /// When off, rollback stops tracking them and leaves their in-memory
    /// state untouched.
    pub reload_on_rollback: bool,
}

impl Default for UnitOfWorkConfig {
    fn default() -> Self {
        Self {
            committed_state: EntryState::Dirty,
            reload_on_rollback: true,
        }
    }
}

impl UnitOfWorkConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-files committed entries as clean instead of dirty.
    #[must_use]
    pub const fn clean_after_commit(mut self, value: bool) -> Self {
        self.committed_state = if value {
            EntryState::Clean
        } else {
            EntryState::Dirty
        };
        self
    }

    /// State committed dirty and new entries are re-filed under.
    #[must_use]
    pub const fn committed_state(&self) -> EntryState {
        self.committed_state
    }

    /// Sets whether rollback reloads from the mapper.
    #[must_use]
    pub const fn reload_on_rollback(mut self, value: bool) -> Self {
        self.reload_on_rollback = value;
        self
    }
}

/// Configuration for a [`crate::JournalMapper`].
#[derive(Debug, Clone, Copy)]
pub struct JournalConfig {
    /// Whether to flush the backend after every record (safer but slower).
    pub sync_on_write: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            sync_on_write: true,
        }
    }
}

impl JournalConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to flush after every record.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = UnitOfWorkConfig::default();
        assert_eq!(config.committed_state(), EntryState::Dirty);
        assert!(config.reload_on_rollback);
        assert!(JournalConfig::default().sync_on_write);
    }

    #[test]
    fn builder_pattern() {
        let config = UnitOfWorkConfig::new()
            .clean_after_commit(true)
            .reload_on_rollback(false);
        assert_eq!(config.committed_state(), EntryState::Clean);
        let config = config.clean_after_commit(false);
        assert_eq!(config.committed_state(), EntryState::Dirty);
        assert!(!config.reload_on_rollback);

        let journal = JournalConfig::new().sync_on_write(false);
        assert!(!journal.sync_on_write);
    }
}
