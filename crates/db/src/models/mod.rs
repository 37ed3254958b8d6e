pub mod job;
pub mod scene;

use vidchain_core::outcome::{FailureDetail, FailureKind};

/// Rebuild a [`FailureDetail`] from its two stored columns.
///
/// An unrecognized kind string is kept as a generation failure so the
/// message is never lost.
pub(crate) fn failure_from_columns(
    kind: Option<&str>,
    message: Option<&str>,
) -> Option<FailureDetail> {
    match (kind, message) {
        (None, None) => None,
        (kind, message) => Some(FailureDetail::new(
            kind.and_then(FailureKind::parse)
                .unwrap_or(FailureKind::GenerationFailed),
            message.unwrap_or_default(),
        )),
    }
}
