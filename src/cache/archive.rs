use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io;
use std::path::Path;
use tar::{Archive, Builder};

/// Write the contents of `source_dir` into a gzip-compressed tarball.
pub fn pack_dir(source_dir: &Path, archive_path: &Path) -> io::Result<()> {
    tracing::debug!(
        "Packing {} into {}",
        source_dir.display(),
        archive_path.display()
    );

    let file = fs::File::create(archive_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(".", source_dir)?;
    builder.into_inner()?.finish()?;
    Ok(())
}

pub fn unpack_into(archive_path: &Path, extract_dir: &Path) -> io::Result<()> {
    tracing::debug!(
        "Extracting {} into {}",
        archive_path.display(),
        extract_dir.display()
    );

    fs::create_dir_all(extract_dir)?;
    let file = fs::File::open(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);
    archive.unpack(extract_dir)?;
    Ok(())
}
