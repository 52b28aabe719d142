use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::Result;
use crate::repo::to_slash;

/// Write every regular file under `src` into a deflate ZIP at `dest`.
///
/// Entry names are paths relative to `src` with `/` separators. Returns the
/// number of entries written. Blocking; call from `spawn_blocking`.
pub fn zip_dir(src: &Path, dest: &Path) -> Result<usize> {
    let file = File::create(dest)?;
    let mut writer = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let mut count = 0;
    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        writer.start_file(to_slash(rel), options)?;
        let bytes = std::fs::read(entry.path())?;
        writer.write_all(&bytes)?;
        count += 1;
    }

    writer.finish()?.flush()?;
    Ok(count)
}
