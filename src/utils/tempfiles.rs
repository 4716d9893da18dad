use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Sibling temp path for `final_path`: same directory, `.tmp` appended to the file name.
pub fn temp_path_for(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    final_path
        .parent()
        .unwrap_or(Path::new("."))
        .join(format!("{name}.tmp"))
}

pub fn rename_temp_to_final(temp_path: &Path, final_path: &Path) -> Result<()> {
    fs::rename(temp_path, final_path).with_context(|| {
        format!(
            "atomic rename temp file to final path ({} -> {})",
            temp_path.display(),
            final_path.display()
        )
    })
}

/// Write `bytes` to a temp file next to `final_path`, flush to disk, then rename over `final_path`.
/// A crash at any point leaves either the old file or the new one, never a truncated file.
pub fn write_atomic(final_path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = temp_path_for(final_path);
    {
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("create temp file {}", temp_path.display()))?;
        file.write_all(bytes)
            .with_context(|| format!("write temp file {}", temp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("sync temp file {}", temp_path.display()))?;
    }
    if let Err(e) = rename_temp_to_final(&temp_path, final_path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    Ok(())
}
