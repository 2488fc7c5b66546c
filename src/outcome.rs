//! Per-reaction result object.

use serde::{Serialize, Serializer};
use std::time::Duration;

use crate::error::ReactorError;
use crate::event::IoEvent;

/// Result of one reaction, success or failure.
///
/// Produced once per `react()` call and handed back to the host unchanged.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionOutcome {
    pub success: bool,
    pub plugin_id: String,
    pub reactor_id: String,
    /// Time-sortable id, also recorded on the reaction's tracing span.
    pub reaction_id: String,
    pub event: IoEvent,
    pub message: String,
    #[serde(serialize_with = "serialize_cause")]
    pub cause: Option<ReactorError>,
    /// Statements derived from the event (zero when production failed).
    pub statement_count: usize,
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl ReactionOutcome {
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// `Ok` for success, `Err` carrying the same outcome otherwise.
    pub fn into_result(self) -> Result<ReactionOutcome, ReactionOutcome> {
        if self.success {
            Ok(self)
        } else {
            Err(self)
        }
    }
}

fn serialize_cause<S: Serializer>(
    cause: &Option<ReactorError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match cause {
        Some(err) => serializer.serialize_some(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

fn serialize_millis<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}
