use std::collections::{BTreeMap, BTreeSet};

use chrono::{TimeZone, Utc};
use settlement_sync_core::contract::{LedgerEntry, LedgerStatus};
use settlement_sync_core::reconcile::{
    decide, reconcile, Action, DesyncReport, RemoteInventory, ARCHIVED_WITHOUT_SUCCESS,
    LEDGER_ORPHAN, SUCCESS_NOT_ARCHIVED,
};

fn remote(names: &[&str]) -> RemoteInventory {
    RemoteInventory::Available(names.iter().map(|n| n.to_string()).collect())
}

fn archive(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn ledger(entries: &[(&str, LedgerStatus)]) -> BTreeMap<String, LedgerEntry> {
    entries
        .iter()
        .map(|(name, status)| {
            (
                name.to_string(),
                LedgerEntry {
                    file_name: name.to_string(),
                    status: *status,
                    last_attempt_at: Utc.with_ymd_and_hms(2024, 11, 2, 3, 15, 0).unwrap(),
                    error_detail: None,
                    attempts: 1,
                },
            )
        })
        .collect()
}

fn report(file: &str, message: &str) -> DesyncReport {
    DesyncReport {
        file: file.to_string(),
        message: message.to_string(),
    }
}

fn action_of(result: &settlement_sync_core::reconcile::Reconciliation, file: &str) -> Action {
    result
        .decisions
        .iter()
        .find(|d| d.file == file)
        .map(|d| d.action)
        .expect("file should have a decision")
}

#[test]
fn scenario_a_new_remote_file_is_processed() {
    let result = reconcile(&remote(&["F1"]), &archive(&[]), &ledger(&[]));
    assert_eq!(result.to_process, vec!["F1".to_string()]);
    assert!(result.reports.is_empty());
    assert_eq!(action_of(&result, "F1"), Action::Process);
}

#[test]
fn pending_ledger_entry_is_processed() {
    let result = reconcile(
        &remote(&["F1"]),
        &archive(&[]),
        &ledger(&[("F1", LedgerStatus::Pending)]),
    );
    assert_eq!(result.to_process, vec!["F1".to_string()]);
    assert!(result.reports.is_empty());
}

#[test]
fn failed_ledger_entry_is_retried() {
    let result = reconcile(
        &remote(&["F1"]),
        &archive(&[]),
        &ledger(&[("F1", LedgerStatus::Failed)]),
    );
    assert_eq!(result.to_process, vec!["F1".to_string()]);
    assert!(result.reports.is_empty());
    assert_eq!(action_of(&result, "F1"), Action::Process);
}

#[test]
fn scenario_c_success_missing_from_archive_is_reported_not_reprocessed() {
    let result = reconcile(
        &remote(&["F1"]),
        &archive(&[]),
        &ledger(&[("F1", LedgerStatus::Success)]),
    );
    assert!(result.to_process.is_empty());
    assert_eq!(result.reports, vec![report("F1", SUCCESS_NOT_ARCHIVED)]);
    assert_eq!(action_of(&result, "F1"), Action::Report);
}

#[test]
fn scenario_b_archived_with_success_is_skipped_silently() {
    let result = reconcile(
        &remote(&["F1"]),
        &archive(&["F1"]),
        &ledger(&[("F1", LedgerStatus::Success)]),
    );
    assert!(result.to_process.is_empty());
    assert!(result.reports.is_empty());
    assert_eq!(action_of(&result, "F1"), Action::SkipArchived);
}

#[test]
fn archived_without_success_entry_is_reported() {
    for status in [None, Some(LedgerStatus::Pending), Some(LedgerStatus::Failed)] {
        let entries: Vec<(&str, LedgerStatus)> = status.map(|s| ("F1", s)).into_iter().collect();
        let result = reconcile(&remote(&["F1"]), &archive(&["F1"]), &ledger(&entries));
        assert!(result.to_process.is_empty(), "status {status:?}");
        assert_eq!(
            result.reports,
            vec![report("F1", ARCHIVED_WITHOUT_SUCCESS)],
            "status {status:?}"
        );
        assert_eq!(action_of(&result, "F1"), Action::Report);
    }
}

#[test]
fn archived_and_gone_from_remote_is_steady_state() {
    for status in [
        None,
        Some(LedgerStatus::Pending),
        Some(LedgerStatus::Failed),
        Some(LedgerStatus::Success),
    ] {
        let entries: Vec<(&str, LedgerStatus)> = status.map(|s| ("F1", s)).into_iter().collect();
        let result = reconcile(&remote(&[]), &archive(&["F1"]), &ledger(&entries));
        assert!(result.to_process.is_empty(), "status {status:?}");
        assert!(result.reports.is_empty(), "status {status:?}");
        assert_eq!(action_of(&result, "F1"), Action::SkipArchived);
    }
}

#[test]
fn ledger_entry_for_vanished_file_is_reported() {
    for status in [
        LedgerStatus::Pending,
        LedgerStatus::Failed,
        LedgerStatus::Success,
    ] {
        let result = reconcile(&remote(&[]), &archive(&[]), &ledger(&[("F1", status)]));
        assert!(result.to_process.is_empty());
        assert_eq!(result.reports, vec![report("F1", LEDGER_ORPHAN)], "status {status}");
    }
}

#[test]
fn success_is_never_scheduled() {
    for in_remote in [Some(true), Some(false), None] {
        for in_archive in [true, false] {
            let decision = decide(in_remote, in_archive, Some(LedgerStatus::Success));
            assert!(
                !matches!(decision, Some((Action::Process, _))),
                "remote={in_remote:?} archive={in_archive}"
            );
        }
    }
}

#[test]
fn to_process_follows_remote_listing_order_without_duplicates() {
    let result = reconcile(
        &remote(&["EXTRATO_3", "EXTRATO_1", "EXTRATO_3", "EXTRATO_2"]),
        &archive(&["EXTRATO_1"]),
        &ledger(&[("EXTRATO_1", LedgerStatus::Success)]),
    );
    assert_eq!(
        result.to_process,
        vec!["EXTRATO_3".to_string(), "EXTRATO_2".to_string()]
    );
    assert_eq!(result.decisions.len(), 3);
}

#[test]
fn reports_list_remote_names_first_then_the_rest_sorted() {
    let result = reconcile(
        &remote(&["Z_REMOTE"]),
        &archive(&[]),
        &ledger(&[
            ("Z_REMOTE", LedgerStatus::Success),
            ("B_GONE", LedgerStatus::Failed),
            ("A_GONE", LedgerStatus::Pending),
        ]),
    );
    assert_eq!(
        result.reports,
        vec![
            report("Z_REMOTE", SUCCESS_NOT_ARCHIVED),
            report("A_GONE", LEDGER_ORPHAN),
            report("B_GONE", LEDGER_ORPHAN),
        ]
    );
}

#[test]
fn unavailable_remote_processes_nothing_and_reports_only_what_it_can_tell() {
    let result = reconcile(
        &RemoteInventory::Unavailable,
        &archive(&["ARCHIVED"]),
        &ledger(&[
            ("ARCHIVED", LedgerStatus::Failed),
            ("LOST", LedgerStatus::Success),
            ("RETRY", LedgerStatus::Failed),
        ]),
    );
    assert!(result.to_process.is_empty());
    assert_eq!(result.reports, vec![report("LOST", SUCCESS_NOT_ARCHIVED)]);
    assert_eq!(action_of(&result, "ARCHIVED"), Action::SkipArchived);
    assert!(result.decisions.iter().all(|d| d.file != "RETRY"));
}
