//! Selection between the local and remote text candidates.

use serde::Serialize;
use tracing::debug;

use super::{ExtractionResult, ExtractionSource};

/// The text chosen for structuring and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub source: ExtractionSource,
    pub text: String,
}

/// Pick the remote text only when it is strictly longer than the local
/// text; ties, including two empty candidates, keep the local text.
pub fn arbitrate(local: ExtractionResult, remote: ExtractionResult) -> Selection {
    let local_len = local.char_count();
    let remote_len = remote.char_count();

    let winner = if remote_len > local_len { remote } else { local };

    debug!(
        "Arbiter: local={} chars, remote={} chars, selected {}",
        local_len, remote_len, winner.source
    );

    Selection {
        source: winner.source,
        text: winner.text,
    }
}
