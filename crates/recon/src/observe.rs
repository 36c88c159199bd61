//! Run observation hooks.
//!
//! The engine never logs through a global directly; it reports to the
//! [`RunObserver`] it was given. [`LogObserver`] forwards to the `log`
//! facade, [`NullObserver`] discards everything.

use crate::locate::StoreError;
use crate::model::{ComparisonRow, OutcomeKind, RunSummary};
use crate::query::ParameterizedQuery;

pub trait RunObserver {
    fn run_started(&self, _config_name: &str, _mappings: usize) {}

    /// `index` is 0-based.
    fn document_started(&self, _name: &str, _index: usize) {}

    fn document_failed(&self, _name: &str, _error: &str) {}

    fn field_compared(&self, _row: &ComparisonRow) {}

    /// `retrying` is true when the locator is about to reset and retry.
    fn query_failed(&self, _query: &ParameterizedQuery, _error: &StoreError, _retrying: bool) {}

    fn connection_reset(&self, _reconnected: bool) {}

    fn run_finished(&self, _summary: &RunSummary) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl RunObserver for NullObserver {}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl RunObserver for LogObserver {
    fn run_started(&self, config_name: &str, mappings: usize) {
        log::info!("audit '{config_name}': {mappings} field mapping(s)");
    }

    fn document_started(&self, name: &str, index: usize) {
        log::debug!("document #{}: {name}", index + 1);
    }

    fn document_failed(&self, name: &str, error: &str) {
        log::warn!("document {name}: {error}");
    }

    fn field_compared(&self, row: &ComparisonRow) {
        match row.outcome_kind {
            OutcomeKind::Match | OutcomeKind::BothNull => log::trace!(
                "{} {}.{}: {}",
                row.document_name,
                row.entity,
                row.column,
                row.outcome_kind
            ),
            _ => log::debug!(
                "{} {}.{}: {} (xml={:?}, db={:?})",
                row.document_name,
                row.entity,
                row.column,
                row.outcome_kind,
                row.xml_value,
                row.db_value
            ),
        }
    }

    fn query_failed(&self, query: &ParameterizedQuery, error: &StoreError, retrying: bool) {
        if retrying {
            log::warn!("query failed, resetting cursor and retrying: {error} ({query})");
        } else {
            log::warn!("query failed: {error} ({query})");
        }
    }

    fn connection_reset(&self, reconnected: bool) {
        if reconnected {
            log::warn!("cursor reset failed; reconnected to store");
        } else {
            log::debug!("store cursor reset");
        }
    }

    fn run_finished(&self, summary: &RunSummary) {
        log::info!(
            "{} comparisons: {} matched, {} mismatched, {} errors, {} ignored",
            summary.total,
            summary.matches,
            summary.mismatches,
            summary.errors,
            summary.ignored
        );
    }
}
