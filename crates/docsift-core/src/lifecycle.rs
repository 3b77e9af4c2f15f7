//! Document lifecycle rules.
//!
//! The only legal transitions are:
//!
//! ```text
//! PENDING ──► PROCESSING ──► COMPLETE
//!    ▲             │
//!    │             ▼
//!    └──────────  FAILED        (resubmit only)
//! ```
//!
//! Everything else, including `COMPLETE → *` and `PENDING → COMPLETE`, is
//! rejected with [`Error::InvalidTransition`].

use chrono::Utc;

use crate::error::{Error, Result};
use crate::types::{DocumentRecord, DocumentStatus};

/// Whether `from → to` is part of the lifecycle.
#[must_use]
pub const fn can_transition(from: DocumentStatus, to: DocumentStatus) -> bool {
    use DocumentStatus::{Complete, Failed, Pending, Processing};
    matches!(
        (from, to),
        (Pending, Processing) | (Processing, Complete) | (Processing, Failed) | (Failed, Pending)
    )
}

/// Compute the record that results from moving `record` to `to`.
///
/// `detail` is stored only when `to` is `FAILED` and must then be non-empty.
/// `updated_at` never moves backwards. A `FAILED → PENDING` transition counts
/// as a new attempt.
pub fn apply(
    record: &DocumentRecord,
    to: DocumentStatus,
    detail: Option<&str>,
) -> Result<DocumentRecord> {
    if !can_transition(record.status, to) {
        return Err(Error::InvalidTransition {
            id: record.id,
            from: record.status,
            to,
        });
    }

    let mut next = record.clone();
    next.status = to;
    next.updated_at = Utc::now().max(record.updated_at);

    match to {
        DocumentStatus::Failed => {
            let detail = detail
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .unwrap_or("unknown failure");
            next.error_detail = Some(detail.to_string());
        }
        DocumentStatus::Pending => {
            next.error_detail = None;
            next.attempts = record.attempts.saturating_add(1);
        }
        DocumentStatus::Processing | DocumentStatus::Complete => {
            next.error_detail = None;
        }
    }

    Ok(next)
}
