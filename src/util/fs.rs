//! Text reads that classify failures.

use std::path::Path;

use crate::error::{SurgeonError, SurgeonResult};

/// Read `path` as UTF-8. Undecodable bytes surface as an `encoding_error`.
pub fn read_text(path: &Path) -> SurgeonResult<String> {
    let bytes = std::fs::read(path).map_err(|e| SurgeonError::fs(path, e))?;
    String::from_utf8(bytes).map_err(|e| {
        SurgeonError::fs(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.utf8_error()),
        )
    })
}
