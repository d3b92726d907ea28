use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Stages `text` in an unnamed file beside `path`, syncs it, then renames it
/// over `path`. A failed write leaves the previous file intact.
pub(crate) fn write_text_atomic(path: &Path, text: &str) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(text.as_bytes())?;
    staged.as_file().sync_all()?;
    staged
        .persist(path)
        .map(drop)
        .map_err(|error| error.error)
}
