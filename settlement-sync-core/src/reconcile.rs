//! Three-way reconciliation of the remote listing, the archive and the ledger.
//!
//! The engine decides, per file name, whether it must be processed, is already done, or
//! needs an operator's attention. It never schedules a file whose ledger entry says
//! `success`: a duplicate load costs more than a manual review.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;

use crate::contract::{LedgerEntry, LedgerStatus};

pub const SUCCESS_NOT_ARCHIVED: &str = "ledger success but missing from archive";
pub const ARCHIVED_WITHOUT_SUCCESS: &str = "archived without matching success ledger entry";
pub const LEDGER_ORPHAN: &str =
    "ledger entry references file missing from both remote and archive";

/// What the drop directory listing produced for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteInventory {
    /// Names in listing order.
    Available(Vec<String>),
    /// The transport failed; remote presence is unknown.
    Unavailable,
}

impl RemoteInventory {
    pub fn is_available(&self) -> bool {
        matches!(self, RemoteInventory::Available(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Action {
    Process,
    SkipArchived,
    Report,
}

/// A disagreement between the inventories that the policy does not resolve on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesyncReport {
    pub file: String,
    pub message: String,
}

impl DesyncReport {
    fn new(file: &str, message: &str) -> Self {
        Self {
            file: file.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDecision {
    pub file: String,
    pub action: Action,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    /// Files to run through the pipeline, in remote listing order.
    pub to_process: Vec<String>,
    pub reports: Vec<DesyncReport>,
    /// Every file that received an action, in evaluation order.
    pub decisions: Vec<FileDecision>,
}

/// The decision table for a single file name.
///
/// `in_remote` is `None` when the remote listing is unavailable. Returns the action and,
/// for [`Action::Report`], the anomaly message; `None` means nothing can be decided
/// this run.
pub fn decide(
    in_remote: Option<bool>,
    in_archive: bool,
    status: Option<LedgerStatus>,
) -> Option<(Action, Option<&'static str>)> {
    use LedgerStatus::*;

    let decision = match (in_remote, in_archive, status) {
        (_, true, Some(Success)) => (Action::SkipArchived, None),
        (Some(true), true, _) => (Action::Report, Some(ARCHIVED_WITHOUT_SUCCESS)),
        (Some(false) | None, true, _) => (Action::SkipArchived, None),
        (Some(true), false, None | Some(Pending) | Some(Failed)) => (Action::Process, None),
        (Some(true) | None, false, Some(Success)) => (Action::Report, Some(SUCCESS_NOT_ARCHIVED)),
        (Some(false), false, Some(_)) => (Action::Report, Some(LEDGER_ORPHAN)),
        (Some(false), false, None) | (None, false, _) => return None,
    };
    Some(decision)
}

/// Evaluates every name in `remote ∪ archive ∪ ledger`.
///
/// Remote names are evaluated first in listing order (duplicates collapse to their first
/// occurrence), then the remaining names in lexicographic order.
pub fn reconcile(
    remote: &RemoteInventory,
    archive: &BTreeSet<String>,
    ledger: &BTreeMap<String, LedgerEntry>,
) -> Reconciliation {
    let listed: &[String] = match remote {
        RemoteInventory::Available(names) => names,
        RemoteInventory::Unavailable => &[],
    };

    let mut seen: HashSet<&str> = HashSet::new();
    let remote_names: Vec<&str> = listed
        .iter()
        .map(String::as_str)
        .filter(|name| seen.insert(*name))
        .collect();

    let others: BTreeSet<&str> = archive
        .iter()
        .chain(ledger.keys())
        .map(String::as_str)
        .filter(|name| !seen.contains(name))
        .collect();

    let mut result = Reconciliation::default();
    for name in remote_names.into_iter().chain(others) {
        let in_remote = match remote {
            RemoteInventory::Available(_) => Some(seen.contains(name)),
            RemoteInventory::Unavailable => None,
        };
        let status = ledger.get(name).map(|entry| entry.status);

        let Some((action, message)) = decide(in_remote, archive.contains(name), status) else {
            continue;
        };
        if action == Action::Process {
            result.to_process.push(name.to_string());
        }
        if let Some(message) = message {
            result.reports.push(DesyncReport::new(name, message));
        }
        result.decisions.push(FileDecision {
            file: name.to_string(),
            action,
        });
    }
    result
}
