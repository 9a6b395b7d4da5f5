//! Per-record locate-and-advance logic, run once per tick for every tracked
//! hash while the state store's write lock is held for that one record.

use transferarr_endpoint::{EndpointState, TorrentSummary};
use transferarr_executor::CopyJob;
use transferarr_record::{ErrorKind, TorrentRecord, TorrentState};
use transferarr_transport::first_component;

use crate::{ConnectionRegistration, EndpointListing, OrchestratorConfig};

/// What the caller should do after a record's closure returns.
pub(crate) enum Outcome {
    /// No follow-up action needed; the mutation (if any) is already
    /// persisted by the time `mutate` returns.
    Settled,
    /// The record has been unclaimed for too long and should be deleted.
    DropUnclaimed,
    /// A copy job failed and was resubmitted within its retry budget.
    Retried,
}

/// Locates `record` across the configured endpoints and applies at most one
/// state transition, mutating it in place.
pub(crate) fn reconcile(
    record: &mut TorrentRecord,
    endpoint_order: &[String],
    listings: &std::collections::HashMap<String, EndpointListing>,
    connections: &[ConnectionRegistration],
    config: &OrchestratorConfig,
) -> Outcome {
    let located_home = locate_home(record.hash.as_str(), endpoint_order, listings);
    let located_target = locate_target(
        record.hash.as_str(),
        endpoint_order,
        listings,
        connections,
        located_home.as_ref().map(|(name, _)| *name),
    );
    let located_anywhere = located_home.is_some() || located_target.is_some();

    if !located_anywhere {
        return handle_not_located(record, listings, config);
    }

    if record.state == TorrentState::Unclaimed {
        let restored = record.state_before_unclaimed.take().unwrap_or_else(|| {
            located_home
                .as_ref()
                .map(|(_, summary)| TorrentState::Home(summary.state))
                .unwrap_or(TorrentState::ManagerQueued)
        });
        record.transition(restored);
        record.unclaimed_count = 0;
    }

    update_bindings(record, located_home.as_ref(), located_target.as_ref(), listings);
    advance(record, located_home.as_ref(), located_target.as_ref(), connections, config)
}

/// A record that could not be found on any endpoint this tick either starts
/// (or continues) its unclaimed countdown, unless the only endpoint that
/// could confirm its absence failed to answer this tick (transient failure:
/// leave the record exactly as it was and retry on the next tick).
fn handle_not_located(
    record: &mut TorrentRecord,
    listings: &std::collections::HashMap<String, EndpointListing>,
    config: &OrchestratorConfig,
) -> Outcome {
    let previous_home_uncertain = record
        .home_client
        .as_ref()
        .and_then(|name| listings.get(name))
        .is_some_and(|listing| !listing.available);
    if previous_home_uncertain {
        return Outcome::Settled;
    }

    if record.state != TorrentState::Unclaimed {
        record.state_before_unclaimed = Some(record.state);
        record.transition(TorrentState::Unclaimed);
    }
    record.unclaimed_count += 1;
    if record.unclaimed_count >= config.k_unclaimed {
        Outcome::DropUnclaimed
    } else {
        Outcome::Settled
    }
}

fn update_bindings(
    record: &mut TorrentRecord,
    located_home: Option<&(&str, TorrentSummary)>,
    located_target: Option<&(&str, TorrentSummary)>,
    listings: &std::collections::HashMap<String, EndpointListing>,
) {
    if let Some((name, _)) = located_home {
        record.home_client = Some((*name).to_string());
    } else if let Some(previous) = record.home_client.clone() {
        if listings.get(&previous).is_some_and(|listing| listing.available) {
            record.home_client = None;
        }
    }

    if let Some((name, _)) = located_target {
        record.target_client = Some((*name).to_string());
    }
}

fn advance(
    record: &mut TorrentRecord,
    located_home: Option<&(&str, TorrentSummary)>,
    located_target: Option<&(&str, TorrentSummary)>,
    connections: &[ConnectionRegistration],
    config: &OrchestratorConfig,
) -> Outcome {
    match record.state {
        TorrentState::ManagerQueued => {
            if let Some((_, summary)) = located_home {
                record.transition(TorrentState::Home(summary.state));
            }
            Outcome::Settled
        }
        TorrentState::Home(current) if current != EndpointState::Seeding => {
            if let Some((_, summary)) = located_home {
                if summary.state != current {
                    record.transition(TorrentState::Home(summary.state));
                }
            }
            Outcome::Settled
        }
        TorrentState::Home(_seeding) => {
            try_start_copy(record, located_home, connections);
            Outcome::Settled
        }
        TorrentState::Copying => retry_or_fail(record, located_home, connections, config),
        TorrentState::Copied => {
            if let Some((_, summary)) = located_target {
                record.transition(TorrentState::Target(summary.state));
            }
            Outcome::Settled
        }
        TorrentState::Target(current) => {
            if let Some((_, summary)) = located_target {
                if summary.state != current {
                    record.transition(TorrentState::Target(summary.state));
                }
            }
            Outcome::Settled
        }
        TorrentState::Unclaimed | TorrentState::Error => Outcome::Settled,
    }
}

/// `HOME_SEEDING -> COPYING`: resolves the connection whose `from` matches
/// the record's current home, submits the job, and only advances the state
/// once the executor accepted it. Leaves the record at `HOME_SEEDING` when
/// no matching connection exists or the executor's queue is saturated, so
/// the next tick simply tries again.
fn try_start_copy(
    record: &mut TorrentRecord,
    located_home: Option<&(&str, TorrentSummary)>,
    connections: &[ConnectionRegistration],
) {
    if record.target_client.is_some() {
        return;
    }
    let Some(connection) = connections
        .iter()
        .find(|connection| Some(connection.from.as_str()) == record.home_client.as_deref())
    else {
        return;
    };

    let job = CopyJob {
        hash: record.hash.clone(),
        name: record.name.clone(),
        top_level_entry: top_level_entry(record, located_home),
    };
    if connection.executor.try_enqueue(job).is_ok() {
        record.target_client = Some(connection.to.clone());
        record.transition(TorrentState::Copying);
    }
}

/// `COPYING -> ERROR` or a same-tick retry, depending on the retry budget.
/// A record with no error yet is still in flight and is left untouched;
/// `COPYING -> COPIED` is set directly by the worker through
/// `TorrentStore::report_job_outcome`, not by this driver.
fn retry_or_fail(
    record: &mut TorrentRecord,
    located_home: Option<&(&str, TorrentSummary)>,
    connections: &[ConnectionRegistration],
    config: &OrchestratorConfig,
) -> Outcome {
    let Some(error) = record.error.clone() else {
        return Outcome::Settled;
    };

    if error.kind == ErrorKind::MetainfoMissing {
        record.transition(TorrentState::Error);
        return Outcome::Settled;
    }

    if record.copy_retry_count + 1 >= config.k_copy_retry {
        record.transition(TorrentState::Error);
        return Outcome::Settled;
    }

    let target = record.target_client.clone();
    let Some(connection) = connections
        .iter()
        .find(|connection| Some(connection.to.as_str()) == target.as_deref())
    else {
        return Outcome::Settled;
    };

    let job = CopyJob {
        hash: record.hash.clone(),
        name: record.name.clone(),
        top_level_entry: top_level_entry(record, located_home),
    };
    if connection.executor.try_enqueue(job).is_err() {
        return Outcome::Settled;
    }

    record.copy_retry_count += 1;
    record.error = None;
    Outcome::Retried
}

/// The payload's single top-level entry, read from this tick's home listing
/// when available and falling back to the record's display name otherwise
/// (home listing unavailable this tick, or the client reported no files).
fn top_level_entry(record: &TorrentRecord, located_home: Option<&(&str, TorrentSummary)>) -> String {
    located_home
        .and_then(|(_, summary)| summary.files.first())
        .map(|file| first_component(&file.path).to_string())
        .unwrap_or_else(|| record.name.clone())
}

fn locate_home<'a>(
    hash: &str,
    endpoint_order: &'a [String],
    listings: &'a std::collections::HashMap<String, EndpointListing>,
) -> Option<(&'a str, TorrentSummary)> {
    for name in endpoint_order {
        let Some(listing) = listings.get(name) else { continue };
        if !listing.available {
            continue;
        }
        if let Some(summary) = listing.summaries.get(hash) {
            return Some((name.as_str(), summary.clone()));
        }
    }
    None
}

/// A target candidate must be a different endpoint from `home_name`, and
/// some registered connection must actually route to it — otherwise seeing
/// the hash there is incidental, not a migration target.
fn locate_target<'a>(
    hash: &str,
    endpoint_order: &'a [String],
    listings: &'a std::collections::HashMap<String, EndpointListing>,
    connections: &[ConnectionRegistration],
    home_name: Option<&str>,
) -> Option<(&'a str, TorrentSummary)> {
    for name in endpoint_order {
        if Some(name.as_str()) == home_name {
            continue;
        }
        let Some(listing) = listings.get(name) else { continue };
        if !listing.available {
            continue;
        }
        if !connections.iter().any(|connection| connection.to == *name) {
            continue;
        }
        if let Some(summary) = listing.summaries.get(hash) {
            return Some((name.as_str(), summary.clone()));
        }
    }
    None
}
