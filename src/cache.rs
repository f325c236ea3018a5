use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{BenchError, Result};

/// Empty the application's cache directory so the first requests of the run
/// are measured cold. The directory itself is kept. Returns the number of
/// entries removed; a missing directory counts as already clear.
pub fn clear_cache(dir: &Path) -> Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "no cache directory");
            return Ok(0);
        }
        Err(e) => return Err(BenchError::io(dir, e)),
    };

    let mut removed = 0;
    for entry in entries {
        let path = entry.map_err(|e| BenchError::io(dir, e))?.path();
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.map_err(|e| BenchError::io(&path, e))?;
        removed += 1;
    }

    info!(dir = %dir.display(), removed, "cache cleared");
    Ok(removed)
}
