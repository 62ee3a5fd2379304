use condfmt_core::{Clock, ColumnType, Operator, Rule, RuleValue};
use condfmt_engine::{
    EngineError, ExportDocument, ExportFormat, HistoryConfig, ResolutionLog, ResolutionStrategy,
    decompress,
};
use condfmt_harness::fixtures::*;
use condfmt_harness::{TestEditor, TestLog};
use condfmt_storage::{SlotStore, SqliteStore};

/// A log holding `n` resolution sessions over the mergeable fixture.
fn populated(n: usize) -> Result<TestEditor, EngineError> {
    let mut t = TestEditor::new(mergeable_ranges(), ColumnType::Number);
    for _ in 0..n {
        t.resolve_all()?;
        t.editor.undo();
        t.history.clock.advance(1_000);
    }
    Ok(t)
}

// ============================================================================
// Export / import
// ============================================================================

#[test]
fn json_export_round_trips() -> Result<(), Box<dyn std::error::Error>> {
    let source = populated(3)?;
    let sessions = source.history.log.sessions()?;
    assert_eq!(sessions.len(), 3);

    let exported = source.history.log.export(ExportFormat::Json)?;
    assert_eq!(exported.mime_type(), "application/json");

    let mut target = TestLog::new();
    assert_eq!(target.log.import(&exported.data)?, 3);
    assert_eq!(target.log.sessions()?, sessions);
    Ok(())
}

#[test]
fn compressed_export_round_trips() -> Result<(), Box<dyn std::error::Error>> {
    let source = populated(2)?;
    let exported = source.history.log.export(ExportFormat::Compressed)?;
    assert!(exported.data.starts_with("data:application/gzip;base64,"));

    let mut target = TestLog::new();
    target.log.import(&decompress(&exported.data)?)?;
    assert_eq!(target.log.sessions()?, source.history.log.sessions()?);
    Ok(())
}

#[test]
fn export_metadata_summarises_the_log() -> Result<(), Box<dyn std::error::Error>> {
    let source = populated(2)?;
    let exported = source.history.log.export(ExportFormat::Json)?;
    let document: ExportDocument = serde_json::from_str(&exported.data)?;

    assert_eq!(document.version, "1.0");
    assert_eq!(document.timestamp, source.history.clock.now_ms());
    assert_eq!(document.metadata.total_sessions, 2);
    let usage = &document.metadata.most_used_strategies;
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].strategy_id, ResolutionStrategy::MergeOverlapping);
    assert_eq!(usage[0].count, 2);
    assert_eq!(usage[0].success_rate, 1.0);

    let json: serde_json::Value = serde_json::from_str(&exported.data)?;
    assert!(json["sessions"][0]["steps"][0]["beforeState"].is_array());
    assert_eq!(json["metadata"]["mostUsedStrategies"][0]["strategyId"], "merge-overlapping");
    Ok(())
}

#[test]
fn csv_export_has_one_row_per_session() -> Result<(), Box<dyn std::error::Error>> {
    let source = populated(2)?;
    let csv = source.history.log.export(ExportFormat::Csv)?.data;
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("Session ID,Start Time,End Time"));
    let row: Vec<&str> = lines[1].split(',').collect();
    assert_eq!(row.len(), 8);
    assert_eq!(row[1], "2023-11-14T22:13:20.025Z");
    assert_eq!(row[3], "1");
    assert_eq!(row[6], "\"merge-overlapping\"");
    assert_eq!(row[7], "0.90");
    Ok(())
}

#[test]
fn rejected_import_changes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = populated(1)?;
    let before = t.history.log.sessions()?;

    let no_summary = r#"{"version":"1.0","timestamp":0,"sessions":[{"id":"0190b4a0-0000-7000-8000-000000000000","startTime":0,"steps":[]}]}"#;
    assert!(matches!(
        t.history.log.import(no_summary),
        Err(EngineError::InvalidImport(_))
    ));
    assert!(matches!(
        t.history.log.import("not json"),
        Err(EngineError::Decode(_))
    ));
    assert_eq!(t.history.log.sessions()?, before);
    Ok(())
}

#[test]
fn import_keeps_the_most_recent_sessions() -> Result<(), Box<dyn std::error::Error>> {
    let mut older = TestLog::new();
    for _ in 0..6 {
        older.empty_session(10)?;
    }
    let mut newer = TestLog::new();
    newer.clock.advance(1_000_000);
    for _ in 0..6 {
        newer.empty_session(10)?;
    }
    let newest: Vec<_> = newer.log.sessions()?.iter().map(|s| s.id).collect();

    let exported = older.log.export(ExportFormat::Json)?;
    assert_eq!(newer.log.import(&exported.data)?, 10);

    let kept = newer.log.sessions()?;
    assert!(kept.windows(2).all(|w| w[0].start_time <= w[1].start_time));
    assert!(newest.iter().all(|id| kept.iter().any(|s| s.id == *id)));
    Ok(())
}

#[test]
fn import_rejects_malformed_rules() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = populated(1)?;
    let before = t.history.log.sessions()?;

    let exported = t.history.log.export(ExportFormat::Json)?;
    let mut json: serde_json::Value = serde_json::from_str(&exported.data)?;
    json["sessions"][0]["finalState"][0]
        .as_object_mut()
        .ok_or("final state rule is not an object")?
        .remove("value2");

    let mut target = TestLog::new();
    assert!(matches!(
        target.log.import(&json.to_string()),
        Err(EngineError::Core(_))
    ));
    assert!(target.log.sessions()?.is_empty());
    assert!(matches!(
        t.history.log.import(&json.to_string()),
        Err(EngineError::Core(_))
    ));
    assert_eq!(t.history.log.sessions()?, before);
    Ok(())
}

// ============================================================================
// Durable storage
// ============================================================================

#[test]
fn non_finite_operands_do_not_poison_the_log() -> Result<(), Box<dyn std::error::Error>> {
    let mut rules = mergeable_ranges();
    rules.push(Rule::new("unbounded", Operator::GreaterThan, f64::INFINITY)?);
    rules.push(Rule::new("undefined", Operator::LessThan, f64::NAN)?);
    let mut t = TestEditor::with_log(rules.clone(), ColumnType::Number, TestLog::in_memory_sqlite()?);

    let session = t.resolve_all()?.session.ok_or("session not recorded")?;
    let recorded = &session.steps.first().ok_or("no step recorded")?.before_state;
    assert_eq!(recorded, &rules);
    assert!(
        recorded
            .iter()
            .any(|r| r.value1 == RuleValue::Number(f64::INFINITY))
    );

    assert_eq!(t.history.log.sessions()?, vec![session]);
    t.history.empty_session(10)?;
    assert_eq!(t.history.log.sessions()?.len(), 2);

    let exported = t.history.log.export(ExportFormat::Json)?;
    let mut target = TestLog::new();
    assert_eq!(target.log.import(&exported.data)?, 2);
    assert_eq!(target.log.sessions()?, t.history.log.sessions()?);
    Ok(())
}


#[test]
fn retention_evicts_oldest_sessions() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestLog::new();
    for _ in 0..12 {
        t.empty_session(5)?;
    }
    let sessions = t.log.sessions()?;
    assert_eq!(sessions.len(), 10);
    assert_eq!(sessions[0].start_time, EPOCH_MS + 15);
    Ok(())
}

#[test]
fn sqlite_log_survives_reopen() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("history.db");

    let expected = {
        let store = SqliteStore::open(&path)?;
        let history = TestLog::with_store(store, HistoryConfig::default());
        let mut t = TestEditor::with_log(mergeable_ranges(), ColumnType::Number, history);
        t.resolve_all()?;
        t.history.log.sessions()?
    };
    assert_eq!(expected.len(), 1);

    let reopened = ResolutionLog::new(SqliteStore::open(&path)?, HistoryConfig::default());
    assert_eq!(reopened.sessions()?, expected);
    assert_eq!(reopened.store().slot_keys()?, vec!["resolution_history"]);
    Ok(())
}

#[test]
fn custom_slot_key_is_respected() -> Result<(), Box<dyn std::error::Error>> {
    let config = HistoryConfig {
        slot_key: "sheet-42/history".to_string(),
        max_sessions: 2,
    };
    let mut t = TestLog::with_store(SqliteStore::open_in_memory()?, config);
    for _ in 0..3 {
        t.empty_session(1)?;
    }
    assert_eq!(t.log.sessions()?.len(), 2);
    assert!(t.log.store().read_slot("resolution_history")?.is_none());
    assert!(t.log.store().read_slot("sheet-42/history")?.is_some());
    Ok(())
}
