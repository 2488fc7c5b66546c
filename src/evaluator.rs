//! Upstream event filter.
//!
//! Hosts gate which events reach a reactor. `EventFilter` covers the
//! common rule: an allowed set of event types plus a path regex.

use regex::{Regex, RegexBuilder};

use crate::event::{IoEvent, IoEventType};

/// Accepts events whose type is allowed and whose path matches.
#[derive(Debug, Clone)]
pub struct EventFilter {
    event_types: Vec<IoEventType>,
    path_pattern: Option<Regex>,
}

impl EventFilter {
    /// Accept every event.
    pub fn accept_all() -> Self {
        Self {
            event_types: Vec::new(),
            path_pattern: None,
        }
    }

    /// Accept only `event_types` (an empty list allows any type) whose
    /// `fullPath` contains a match for `pattern`.
    pub fn new(
        event_types: impl IntoIterator<Item = IoEventType>,
        pattern: Option<&str>,
        case_insensitive: bool,
    ) -> Result<Self, regex::Error> {
        let path_pattern = pattern
            .map(|p| RegexBuilder::new(p).case_insensitive(case_insensitive).build())
            .transpose()?;

        Ok(Self {
            event_types: event_types.into_iter().collect(),
            path_pattern,
        })
    }

    pub fn accepts(&self, event: &IoEvent) -> bool {
        let type_ok = self.event_types.is_empty() || self.event_types.contains(&event.event_type);
        type_ok
            && self
                .path_pattern
                .as_ref()
                .map_or(true, |re| re.is_match(&event.full_path))
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::accept_all()
    }
}
