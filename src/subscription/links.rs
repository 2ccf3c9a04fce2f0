//! Resolution of ack/nack targets from an event's links

use super::types::{AckKind, Link};

/// Find the target address for an outcome among an event's links
///
/// Relation names are matched case-insensitively. Returns `None` when the
/// backend did not attach a link for the outcome.
pub fn resolve(links: &[Link], kind: AckKind) -> Option<&str> {
    links
        .iter()
        .find(|link| link.relation.eq_ignore_ascii_case(kind.relation()))
        .map(|link| link.uri.as_str())
}
