//! Channel identifiers.
//!
//! Channels are plain strings and are never stored as entities. The group
//! channel is a well-known constant; direct-message channels are derived from
//! the two participants so every client computes the same id on its own.

use crate::error::{ChatError, Result};

/// The room every intern shares.
pub const DEFAULT_GROUP_CHANNEL: &str = "allStudents";

/// Prefix of every direct-message channel id.
pub const DM_PREFIX: &str = "dm";

/// Joins the prefix and the two sorted participants.
///
/// Identities must not contain this character, otherwise two different pairs
/// could map to the same channel.
pub const DM_SEPARATOR: char = '_';

/// Resolve the direct-message channel for a pair of participants.
///
/// The result is `dm_<first>_<second>` with the participants sorted
/// lexicographically, so `resolve_direct(a, b) == resolve_direct(b, a)`.
/// A participant talking to themselves gets `dm_<name>_<name>`. Surrounding
/// whitespace is not part of an identity.
pub fn resolve_direct(participant_a: &str, participant_b: &str) -> Result<String> {
    let (participant_a, participant_b) = (participant_a.trim(), participant_b.trim());
    if participant_a.is_empty() || participant_b.is_empty() {
        return Err(ChatError::InvalidParticipant(
            "participant identity must not be empty".into(),
        ));
    }

    let (first, second) = if participant_a <= participant_b {
        (participant_a, participant_b)
    } else {
        (participant_b, participant_a)
    };

    Ok(format!("{DM_PREFIX}{DM_SEPARATOR}{first}{DM_SEPARATOR}{second}"))
}

/// Whether a channel id looks like a direct-message channel.
pub fn is_direct(channel: &str) -> bool {
    channel
        .strip_prefix(DM_PREFIX)
        .is_some_and(|rest| rest.starts_with(DM_SEPARATOR))
}
