//! Field-merge policy: apply decoded messages to tracks in the table.
//!
//! Each ingestion source owns one merger. The merger keeps per-stream
//! decode state (known addresses, CPR frames, AIS fragments) and writes
//! into the shared [`TrackTable`](crate::table::TrackTable) through
//! `upsert`.
//!
//! Fields are last-merged-wins: no timestamp comparison happens before a
//! value is overwritten.

pub mod ais;
pub mod modes;

pub use ais::AisMerger;
pub use modes::ModeSMerger;

/// What a single merge did to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Created(String),
    Updated(String),
    /// The message decoded but carries nothing the table uses.
    NoOp,
    /// A fragment or half of a pair was buffered; nothing to merge yet.
    Pending,
}

impl MergeOutcome {
    pub fn id(&self) -> Option<&str> {
        match self {
            MergeOutcome::Created(id) | MergeOutcome::Updated(id) => Some(id),
            MergeOutcome::NoOp | MergeOutcome::Pending => None,
        }
    }

    pub(crate) fn touched(id: String, created: bool) -> Self {
        if created {
            MergeOutcome::Created(id)
        } else {
            MergeOutcome::Updated(id)
        }
    }
}

/// Normalize a free-text AIS field: `_` and `@` padding become spaces and
/// the result is trimmed. `None` if nothing is left.
pub fn normalize_text(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .map(|c| if c == '_' || c == '@' { ' ' } else { c })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// True for a usable WGS84 position.
pub fn valid_position(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0 && lon.abs() <= 180.0
}
