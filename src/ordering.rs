//! Total ordering of the resolution log.
//!
//! Resolutions are ordered by `(date, sequence, id)`. The insertion sequence
//! assigned by the resolution store breaks date ties, and the id makes the
//! order total even for hand-built logs without sequence numbers.

use crate::types::{Resolution, ResolutionId};

/// Error when the requested replay point is not in the log.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Resolution not found: {0}")]
pub struct ResolutionNotFound(pub ResolutionId);

/// Sort a resolution log oldest first.
pub fn sort_resolutions(resolutions: &[Resolution]) -> Vec<&Resolution> {
    let mut ordered: Vec<&Resolution> = resolutions.iter().collect();
    ordered.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
    ordered
}

/// The chronological prefix of the log ending at `from_resolution`, inclusive.
///
/// With no `from_resolution`, the whole log is returned sorted.
pub fn prior_resolutions<'a>(
    resolutions: &'a [Resolution],
    from_resolution: Option<&ResolutionId>,
) -> Result<Vec<&'a Resolution>, ResolutionNotFound> {
    let mut ordered = sort_resolutions(resolutions);

    let Some(target) = from_resolution else {
        return Ok(ordered);
    };

    let position = ordered
        .iter()
        .position(|r| &r.id == target)
        .ok_or_else(|| ResolutionNotFound(target.clone()))?;

    ordered.truncate(position + 1);
    Ok(ordered)
}
