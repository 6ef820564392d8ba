use crate::error::{Result, SrkfError};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Open a recording and map it into memory (read-only).
///
/// Zero-length files cannot be mapped on every platform, so they are reported
/// as a validation failure before mapping.
pub fn mmap_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path).map_err(SrkfError::IoError)?;
    if file.metadata().map_err(SrkfError::IoError)?.len() == 0 {
        return Err(SrkfError::Validation(format!(
            "File is empty: {}",
            path.display()
        )));
    }
    // The mapping is read-only and dropped before the caller returns.
    let mmap = unsafe { Mmap::map(&file).map_err(SrkfError::IoError)? };
    Ok(mmap)
}
