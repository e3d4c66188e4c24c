use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use super::ServerFilesError;

/// Replaces `path` with `contents` in one rename.
///
/// The bytes are staged in a temporary file next to the destination, synced,
/// then renamed over it. Readers see either the previous file or the new one.
pub fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), ServerFilesError> {
    write_atomically_with(path, |file| file.write_all(contents))
}

/// Same as [`write_atomically`], with the body produced by `fill`.
///
/// If `fill` fails the staged file is discarded and `path` is left untouched.
pub(crate) fn write_atomically_with<F>(path: &Path, fill: F) -> Result<(), ServerFilesError>
where
    F: FnOnce(&mut std::fs::File) -> std::io::Result<()>,
{
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        Some(_) => Path::new("."),
        None => {
            return Err(ServerFilesError::InvalidPath {
                path: path.to_path_buf(),
            })
        }
    };

    std::fs::create_dir_all(parent).map_err(|e| ServerFilesError::io(parent, e))?;

    let mut staged = NamedTempFile::new_in(parent).map_err(|e| ServerFilesError::io(parent, e))?;
    fill(staged.as_file_mut()).map_err(|e| ServerFilesError::io(path, e))?;
    staged
        .as_file()
        .sync_all()
        .map_err(|e| ServerFilesError::io(path, e))?;
    staged
        .persist(path)
        .map_err(|e| ServerFilesError::io(path, e.error))?;

    Ok(())
}
