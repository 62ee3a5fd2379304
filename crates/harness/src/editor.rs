use condfmt_core::{ColumnType, ManualClock, Rule};
use condfmt_engine::{
    AutoResolveOutcome, EngineConfig, EngineError, FixSuggestion, HistoryConfig, ResolutionLog,
    RuleEditor,
};
use condfmt_storage::{MemoryStore, SlotStore, SqliteStore, StorageError};

use crate::fixtures::EPOCH_MS;

/// A resolution log on a hand-driven clock.
pub struct TestLog<S: SlotStore = MemoryStore> {
    pub clock: ManualClock,
    pub log: ResolutionLog<S>,
}

impl TestLog<MemoryStore> {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new(), HistoryConfig::default())
    }
}

impl Default for TestLog<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl TestLog<SqliteStore> {
    pub fn in_memory_sqlite() -> Result<Self, StorageError> {
        Ok(Self::with_store(
            SqliteStore::open_in_memory()?,
            HistoryConfig::default(),
        ))
    }
}

impl<S: SlotStore> TestLog<S> {
    pub fn with_store(store: S, config: HistoryConfig) -> Self {
        let clock = ManualClock::starting_at(EPOCH_MS);
        Self {
            log: ResolutionLog::with_clock(store, config, clock.clone()),
            clock,
        }
    }

    /// Seal an empty session `advance_ms` after the previous one.
    pub fn empty_session(&mut self, advance_ms: u64) -> Result<(), EngineError> {
        self.clock.advance(advance_ms);
        let id = self.log.start_session();
        self.log.complete_session(id)?;
        Ok(())
    }
}

/// A rule editor and a resolution log sharing one clock.
pub struct TestEditor<S: SlotStore = MemoryStore> {
    pub editor: RuleEditor,
    pub history: TestLog<S>,
}

impl TestEditor<MemoryStore> {
    pub fn new(rules: Vec<Rule>, column_type: ColumnType) -> Self {
        Self::with_log(rules, column_type, TestLog::new())
    }
}

impl<S: SlotStore> TestEditor<S> {
    pub fn with_log(rules: Vec<Rule>, column_type: ColumnType, history: TestLog<S>) -> Self {
        let editor = RuleEditor::with_clock(
            rules,
            column_type,
            &EngineConfig::default(),
            history.clock.clone(),
        );
        Self { editor, history }
    }

    pub fn rules(&self) -> &[Rule] {
        self.editor.rules()
    }

    /// Every current suggestion through auto-resolution.
    pub fn resolve_all(&mut self) -> Result<AutoResolveOutcome, EngineError> {
        let fixes: Vec<FixSuggestion> = self.editor.suggestions();
        self.history.clock.advance(25);
        self.editor.auto_resolve(&fixes, &mut self.history.log)
    }
}
