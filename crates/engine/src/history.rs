//! Durable, multi-session record of auto-resolution runs.
//!
//! A session is open (in memory) from `start_session` until
//! `complete_session`, which seals it and writes it to the log slot. The slot
//! holds a JSON array of sealed sessions, oldest first, capped at
//! `HistoryConfig::max_sessions`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use condfmt_core::{Clock, CoreError, Rule, RuleDiff, SessionId, StepId, SystemClock};
use condfmt_storage::SlotStore;

use crate::config::HistoryConfig;
use crate::conflict::{ConflictKind, FixConflict};
use crate::error::EngineError;
use crate::export::{self, ExportDocument, ExportFormat, ExportedHistory};
use crate::resolve::{ResolutionStrategy, StrategyApplication};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepMetadata {
    pub rules_modified: usize,
    pub rules_added: usize,
    pub rules_removed: usize,
    /// Milliseconds since the previous step, or since the session started.
    pub duration: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionStep {
    pub id: StepId,
    pub timestamp: u64,
    pub strategy: ResolutionStrategy,
    pub before_state: Vec<Rule>,
    pub after_state: Vec<Rule>,
    pub resolved_conflicts: Vec<FixConflict>,
    pub remaining_conflicts: Vec<FixConflict>,
    pub confidence: f64,
    pub metadata: StepMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub total_conflicts_resolved: usize,
    pub total_rules_modified: usize,
    pub average_confidence: f64,
    /// resolved / (resolved + still remaining after the last step).
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionSession {
    pub id: SessionId,
    pub start_time: u64,
    #[serde(default)]
    pub end_time: Option<u64>,
    pub steps: Vec<ResolutionStep>,
    #[serde(default)]
    pub final_state: Vec<Rule>,
    pub summary: SessionSummary,
}

impl ResolutionSession {
    fn open(id: SessionId, start_time: u64) -> Self {
        Self {
            id,
            start_time,
            end_time: None,
            steps: Vec::new(),
            final_state: Vec::new(),
            summary: SessionSummary::default(),
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn duration(&self) -> Option<u64> {
        self.end_time.map(|end| end.saturating_sub(self.start_time))
    }

    pub fn step(&self, step_id: StepId) -> Option<&ResolutionStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Every recorded rule list, step snapshots and final state, is well formed.
    pub fn check_rules(&self) -> Result<(), CoreError> {
        self.steps
            .iter()
            .flat_map(|s| s.before_state.iter().chain(&s.after_state))
            .chain(&self.final_state)
            .try_for_each(Rule::check_shape)
    }

    fn refresh_summary(&mut self) {
        let resolved: usize = self.steps.iter().map(|s| s.resolved_conflicts.len()).sum();
        let remaining = self.steps.last().map_or(0, |s| s.remaining_conflicts.len());
        let denominator = resolved + remaining;
        self.summary = SessionSummary {
            total_conflicts_resolved: resolved,
            total_rules_modified: self.steps.iter().map(|s| s.metadata.rules_modified).sum(),
            average_confidence: if self.steps.is_empty() {
                0.0
            } else {
                self.steps.iter().map(|s| s.confidence).sum::<f64>() / self.steps.len() as f64
            },
            success_rate: if denominator == 0 {
                0.0
            } else {
                resolved as f64 / denominator as f64
            },
        };
    }
}

/// Input for [`ResolutionLog::record_step`]; id, timestamp and metadata are
/// filled in by the log.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub strategy: ResolutionStrategy,
    pub before: Vec<Rule>,
    pub after: Vec<Rule>,
    pub resolved_conflicts: Vec<FixConflict>,
    pub remaining_conflicts: Vec<FixConflict>,
    pub confidence: f64,
}

impl From<&StrategyApplication> for StepRecord {
    fn from(application: &StrategyApplication) -> Self {
        Self {
            strategy: application.strategy,
            before: application.before.clone(),
            after: application.after.clone(),
            resolved_conflicts: application.resolved_conflicts(),
            remaining_conflicts: application.conflicts_after.clone(),
            confidence: application.strategy.confidence(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategySuccess {
    pub strategy: ResolutionStrategy,
    pub uses: usize,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictKindCount {
    pub kind: ConflictKind,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternAnalysis {
    /// Best success rate first.
    pub most_successful_strategies: Vec<StrategySuccess>,
    /// Mean of `end_time - start_time` over sealed sessions, in milliseconds.
    pub average_resolution_time: f64,
    /// Kinds of resolved conflicts, most frequent first.
    pub common_conflict_kinds: Vec<ConflictKindCount>,
}

pub struct ResolutionLog<S: SlotStore> {
    store: S,
    config: HistoryConfig,
    clock: Box<dyn Clock>,
    open: BTreeMap<SessionId, ResolutionSession>,
}

impl<S: SlotStore> ResolutionLog<S> {
    pub fn new(store: S, config: HistoryConfig) -> Self {
        Self::with_clock(store, config, SystemClock)
    }

    pub fn with_clock(store: S, config: HistoryConfig, clock: impl Clock + 'static) -> Self {
        Self {
            store,
            config,
            clock: Box::new(clock),
            open: BTreeMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn start_session(&mut self) -> SessionId {
        let id = SessionId::new();
        self.open
            .insert(id, ResolutionSession::open(id, self.clock.now_ms()));
        id
    }

    pub fn is_recording(&self, session_id: SessionId) -> bool {
        self.open.contains_key(&session_id)
    }

    pub fn record_step(
        &mut self,
        session_id: SessionId,
        record: StepRecord,
    ) -> Result<ResolutionStep, EngineError> {
        if !self.open.contains_key(&session_id) {
            return Err(self.not_recording(session_id)?);
        }
        let now = self.clock.now_ms();
        let Some(session) = self.open.get_mut(&session_id) else {
            return Err(EngineError::SessionNotFound(session_id));
        };
        let since = session
            .steps
            .last()
            .map_or(session.start_time, |s| s.timestamp);
        let diff = RuleDiff::between(&record.before, &record.after);

        let step = ResolutionStep {
            id: StepId::new(),
            timestamp: now,
            strategy: record.strategy,
            before_state: record.before,
            after_state: record.after,
            resolved_conflicts: record.resolved_conflicts,
            remaining_conflicts: record.remaining_conflicts,
            confidence: record.confidence,
            metadata: StepMetadata {
                rules_modified: diff.modified.len(),
                rules_added: diff.added.len(),
                rules_removed: diff.removed.len(),
                duration: now.saturating_sub(since),
            },
        };
        session.final_state = step.after_state.clone();
        session.steps.push(step.clone());
        session.refresh_summary();
        Ok(step)
    }

    /// Seal the session and persist it, replacing any logged session with the
    /// same id.
    pub fn complete_session(&mut self, session_id: SessionId) -> Result<ResolutionSession, EngineError> {
        let Some(mut session) = self.open.remove(&session_id) else {
            return Err(self.not_recording(session_id)?);
        };
        session.end_time = Some(self.clock.now_ms());
        session.refresh_summary();

        let mut sessions = self.load()?;
        sessions.retain(|s| s.id != session.id);
        sessions.push(session.clone());
        if let Err(e) = self.save(sessions) {
            self.open.insert(session_id, session);
            return Err(e);
        }
        info!(
            session = %session.id,
            steps = session.steps.len(),
            resolved = session.summary.total_conflicts_resolved,
            "resolution session sealed"
        );
        Ok(session)
    }

    /// Error for a session id that is not open: sealed if it is in the log,
    /// unknown otherwise.
    fn not_recording(&self, session_id: SessionId) -> Result<EngineError, EngineError> {
        if self.load()?.iter().any(|s| s.id == session_id) {
            Ok(EngineError::SessionSealed(session_id))
        } else {
            Ok(EngineError::SessionNotFound(session_id))
        }
    }

    /// Sealed sessions, oldest first.
    pub fn sessions(&self) -> Result<Vec<ResolutionSession>, EngineError> {
        self.load()
    }

    /// An open or sealed session.
    pub fn session(&self, session_id: SessionId) -> Result<Option<ResolutionSession>, EngineError> {
        if let Some(open) = self.open.get(&session_id) {
            return Ok(Some(open.clone()));
        }
        Ok(self.load()?.into_iter().find(|s| s.id == session_id))
    }

    pub fn step_details(
        &self,
        session_id: SessionId,
        step_id: StepId,
    ) -> Result<Option<ResolutionStep>, EngineError> {
        Ok(self
            .session(session_id)?
            .and_then(|s| s.step(step_id).cloned()))
    }

    pub fn analyze_patterns(&self) -> Result<PatternAnalysis, EngineError> {
        let sessions = self.load()?;

        let mut strategies: BTreeMap<ResolutionStrategy, (usize, usize)> = BTreeMap::new();
        let mut kinds: BTreeMap<ConflictKind, usize> = BTreeMap::new();
        for step in sessions.iter().flat_map(|s| &s.steps) {
            let entry = strategies.entry(step.strategy).or_default();
            entry.0 += 1;
            if !step.resolved_conflicts.is_empty() {
                entry.1 += 1;
            }
            for conflict in &step.resolved_conflicts {
                *kinds.entry(conflict.kind).or_default() += 1;
            }
        }

        let mut most_successful_strategies: Vec<_> = strategies
            .into_iter()
            .map(|(strategy, (uses, successes))| StrategySuccess {
                strategy,
                uses,
                success_rate: successes as f64 / uses as f64,
            })
            .collect();
        most_successful_strategies.sort_by(|a, b| {
            b.success_rate
                .total_cmp(&a.success_rate)
                .then_with(|| b.uses.cmp(&a.uses))
        });

        let mut common_conflict_kinds: Vec<_> = kinds
            .into_iter()
            .map(|(kind, count)| ConflictKindCount { kind, count })
            .collect();
        common_conflict_kinds.sort_by(|a, b| b.count.cmp(&a.count));

        let durations: Vec<u64> = sessions.iter().filter_map(ResolutionSession::duration).collect();
        let average_resolution_time = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<u64>() as f64 / durations.len() as f64
        };

        Ok(PatternAnalysis {
            most_successful_strategies,
            average_resolution_time,
            common_conflict_kinds,
        })
    }

    pub fn export(&self, format: ExportFormat) -> Result<ExportedHistory, EngineError> {
        let document = ExportDocument::new(self.load()?, self.clock.now_ms());
        export::encode(&document, format)
    }

    /// Merge a structured-text export into the log. Sessions present on both
    /// sides keep whichever copy has more steps; the most recent
    /// `max_sessions` by start time survive. Returns the number of sessions
    /// now logged. Nothing is written when the document is rejected.
    pub fn import(&mut self, data: &str) -> Result<usize, EngineError> {
        let parsed = export::parse_document(data).and_then(|doc| {
            for session in &doc.sessions {
                session.check_rules()?;
            }
            Ok(doc)
        });
        let document = match parsed {
            Ok(doc) => doc,
            Err(e) => {
                warn!(error = %e, "rejected history import");
                return Err(e);
            }
        };
        let incoming = document.sessions.len();

        let mut merged: BTreeMap<SessionId, ResolutionSession> =
            self.load()?.into_iter().map(|s| (s.id, s)).collect();
        for session in document.sessions {
            match merged.get(&session.id) {
                Some(existing) if existing.steps.len() >= session.steps.len() => {}
                _ => {
                    merged.insert(session.id, session);
                }
            }
        }

        let mut sessions: Vec<_> = merged.into_values().collect();
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        sessions.truncate(self.config.max_sessions);
        sessions.reverse();

        let total = sessions.len();
        self.save(sessions)?;
        info!(incoming, total, "imported resolution history");
        Ok(total)
    }

    fn load(&self) -> Result<Vec<ResolutionSession>, EngineError> {
        match self.store.read_slot(&self.config.slot_key)? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| EngineError::Decode(e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    /// Order oldest first, evict beyond the cap, write the slot.
    fn save(&mut self, mut sessions: Vec<ResolutionSession>) -> Result<(), EngineError> {
        sessions.sort_by_key(|s| s.start_time);
        let excess = sessions.len().saturating_sub(self.config.max_sessions);
        for evicted in sessions.drain(..excess) {
            warn!(session = %evicted.id, "evicted resolution session from history");
        }
        let bytes = serde_json::to_vec(&sessions)?;
        self.store.write_slot(&self.config.slot_key, &bytes)?;
        Ok(())
    }
}
