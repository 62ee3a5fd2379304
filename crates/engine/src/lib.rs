pub mod batch;
pub mod config;
pub mod conflict;
pub mod error;
pub mod export;
pub mod history;
pub mod resolve;
pub mod suggest;
pub mod undo;
pub mod validate;

pub use batch::{BatchFixResult, BatchSummary, analyze_batch, rank_fixes};
pub use config::{EngineConfig, HistoryConfig};
pub use conflict::{
    ConflictKind, ConflictResolution, ConflictSeverity, FixConflict, ResolutionAction, detect_conflicts,
};
pub use error::EngineError;
pub use export::{ExportDocument, ExportFormat, ExportedHistory, decompress};
pub use history::{
    PatternAnalysis, ResolutionLog, ResolutionSession, ResolutionStep, SessionSummary, StepRecord,
};
pub use resolve::{
    AutoResolver, ResolutionResult, ResolutionStrategy, ResolutionSummary, StrategyApplication,
    auto_resolve,
};
pub use suggest::{FixAction, FixKind, FixSuggestion, generate_fixes};
pub use undo::{HistoryState, UndoManager};
pub use validate::{Severity, ValidationWarning, WarningKind, validate_rules};

use condfmt_core::{Clock, ColumnType, Rule, SystemClock};
use condfmt_storage::SlotStore;

/// What an auto-resolution run produced. `session` is `None` when there was
/// nothing to resolve and no session was recorded.
#[derive(Debug, Clone)]
pub struct AutoResolveOutcome {
    pub result: ResolutionResult,
    pub session: Option<ResolutionSession>,
}

/// One editing surface over a rule list: validation, fixes, conflict
/// resolution and a local undo/redo stack. Every change to the list goes
/// through the stack, so `rules()` is always the state at the cursor.
pub struct RuleEditor {
    column_type: ColumnType,
    undo_manager: UndoManager,
    resolver: AutoResolver,
}

impl RuleEditor {
    pub fn new(rules: Vec<Rule>, column_type: ColumnType, config: &EngineConfig) -> Self {
        Self::with_clock(rules, column_type, config, SystemClock)
    }

    pub fn with_clock(
        rules: Vec<Rule>,
        column_type: ColumnType,
        config: &EngineConfig,
        clock: impl Clock + 'static,
    ) -> Self {
        Self {
            column_type,
            undo_manager: UndoManager::with_clock(&rules, config.undo_depth, clock),
            resolver: AutoResolver::new(config.max_resolution_passes),
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.undo_manager.current().rules
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn history(&self) -> &UndoManager {
        &self.undo_manager
    }

    pub fn warnings(&self) -> Vec<ValidationWarning> {
        validate_rules(self.rules(), self.column_type)
    }

    /// Fixes for every current warning, without duplicates.
    pub fn suggestions(&self) -> Vec<FixSuggestion> {
        let rules = self.rules();
        let mut fixes: Vec<FixSuggestion> = Vec::new();
        for warning in self.warnings() {
            for fix in generate_fixes(&warning, rules) {
                if !fixes.iter().any(|f| f.id == fix.id) {
                    fixes.push(fix);
                }
            }
        }
        fixes
    }

    pub fn detect_conflicts(&self, fixes: &[FixSuggestion]) -> Vec<FixConflict> {
        detect_conflicts(fixes, self.rules())
    }

    /// Returns whether the rule list changed.
    pub fn apply_fix(&mut self, fix: &FixSuggestion) -> bool {
        let next = fix.apply(self.rules());
        self.commit(next, format!("Applied fix: {}", fix.description))
    }

    /// Rank and analyse `fixes` against the current list without applying them.
    pub fn plan_batch(&self, fixes: &[FixSuggestion]) -> BatchFixResult {
        let warnings = self.warnings();
        let ranked = rank_fixes(fixes, self.rules(), &warnings);
        analyze_batch(&ranked, self.rules(), &warnings)
    }

    pub fn apply_batch(&mut self, fixes: &[FixSuggestion]) -> BatchFixResult {
        let plan = self.plan_batch(fixes);
        let description = format!("Applied {} fixes", plan.applied_fixes.len());
        self.commit(plan.rules.clone(), description);
        plan
    }

    /// Detect conflicts among `fixes`, auto-resolve them, record one step per
    /// strategy application in a sealed session of `log`, and push the
    /// resolved list onto the undo stack.
    pub fn auto_resolve<S: SlotStore>(
        &mut self,
        fixes: &[FixSuggestion],
        log: &mut ResolutionLog<S>,
    ) -> Result<AutoResolveOutcome, EngineError> {
        let conflicts = self.detect_conflicts(fixes);
        let result = self.resolver.resolve(self.rules(), fixes, &conflicts);
        if conflicts.is_empty() {
            return Ok(AutoResolveOutcome {
                result,
                session: None,
            });
        }

        let session_id = log.start_session();
        for application in &result.applications {
            log.record_step(session_id, StepRecord::from(application))?;
        }
        let session = log.complete_session(session_id)?;

        let description = format!(
            "Auto-resolved {} conflicts",
            result.summary.conflicts_resolved
        );
        self.commit(result.resolved_rules.clone(), description);
        Ok(AutoResolveOutcome {
            result,
            session: Some(session),
        })
    }

    pub fn undo(&mut self) -> bool {
        self.undo_manager.undo().is_some()
    }

    pub fn redo(&mut self) -> bool {
        self.undo_manager.redo().is_some()
    }

    pub fn can_undo(&self) -> bool {
        self.undo_manager.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo_manager.can_redo()
    }

    fn commit(&mut self, rules: Vec<Rule>, description: String) -> bool {
        if rules.as_slice() == self.rules() {
            return false;
        }
        self.undo_manager.push(&rules, description);
        true
    }
}
