use crate::store::StoredImage;
use std::io::{Cursor, Write};
use thiserror::Error;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("zip write failed: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("zip write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Bundles the session's images into a deflate-compressed zip, one
/// `{filename}.jpg` entry per image.
pub fn bundle_images(images: &[StoredImage]) -> Result<Vec<u8>, ArchiveError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for image in images {
        writer.start_file(format!("{}.jpg", image.filename), options)?;
        writer.write_all(&image.data)?;
    }

    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::io::Read;

    fn image(filename: &str, data: &[u8]) -> StoredImage {
        StoredImage {
            filename: filename.to_string(),
            data: data.to_vec(),
            mime_type: "image/jpeg".to_string(),
            product_name: "Jacket".to_string(),
            color_name: "Black".to_string(),
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn bundle_round_trips_entries() {
        let images = vec![image("CNCP001MBLK", b"aaa"), image("CNCP001MNVY", b"bbb")];
        let bytes = bundle_images(&images).expect("bundle");

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("open");
        assert_eq!(archive.len(), 2);

        let mut entry = archive.by_name("CNCP001MBLK.jpg").expect("entry");
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"aaa");
    }

    #[test]
    fn empty_session_yields_empty_archive() {
        let bytes = bundle_images(&[]).expect("bundle");
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("open");
        assert_eq!(archive.len(), 0);
    }
}
