//! Zip upload decoding.

use std::collections::HashSet;
use std::io::{Cursor, Read};

use quire_shared::validation::normalize_path;
use quire_shared::ValidationError;
use quire_store::NewFile;
use zip::ZipArchive;

/// Entries macOS adds to archives; never part of a submission.
const MACOS_METADATA_PREFIX: &str = "__MACOSX/";

/// Unpack an archive into submission files. Directory entries are skipped;
/// every other entry name must be a valid submission path.
pub fn unpack(bytes: &[u8], max_file_size: usize) -> Result<Vec<NewFile>, ValidationError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| ValidationError::Archive(e.to_string()))?;

    let mut files = Vec::with_capacity(archive.len());
    let mut seen = HashSet::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|e| ValidationError::Archive(e.to_string()))?;
        if entry.is_dir() || entry.name().starts_with(MACOS_METADATA_PREFIX) {
            continue;
        }

        let path = normalize_path(entry.name())?;
        if entry.size() > max_file_size as u64 {
            return Err(ValidationError::TooLong {
                field: "file",
                max: max_file_size,
            });
        }
        if !seen.insert(path.clone()) {
            return Err(ValidationError::Archive(format!("duplicate entry {path}")));
        }

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        // The declared size can lie; cap what is actually read.
        entry
            .take(max_file_size as u64 + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| ValidationError::Archive(e.to_string()))?;
        if bytes.len() > max_file_size {
            return Err(ValidationError::TooLong {
                field: "file",
                max: max_file_size,
            });
        }
        files.push(NewFile { path, bytes });
    }

    if files.is_empty() {
        return Err(ValidationError::Archive("archive contains no files".to_string()));
    }
    Ok(files)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    pub(crate) fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, bytes) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, FileOptions::default()).unwrap();
            } else {
                writer.start_file(*name, FileOptions::default()).unwrap();
                writer.write_all(bytes).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_unpack_skips_directories() {
        let zip = build_zip(&[
            ("src/", b""),
            ("src/main.c", b"int main(){}"),
            ("README", b"hi"),
            ("__MACOSX/._README", b"junk"),
        ]);
        let files = unpack(&zip, 1024).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/main.c", "README"]);
        assert_eq!(files[0].bytes, b"int main(){}");
    }

    #[test]
    fn test_unpack_rejects_garbage_and_traversal() {
        assert!(matches!(unpack(b"not a zip", 1024), Err(ValidationError::Archive(_))));

        let zip = build_zip(&[("../evil.c", b"x")]);
        assert!(matches!(unpack(&zip, 1024), Err(ValidationError::Path(_))));

        let empty = build_zip(&[("docs/", b"")]);
        assert!(matches!(unpack(&empty, 1024), Err(ValidationError::Archive(_))));
    }

    #[test]
    fn test_unpack_enforces_size_limit() {
        let zip = build_zip(&[("big.bin", &[0u8; 64])]);
        assert!(matches!(unpack(&zip, 16), Err(ValidationError::TooLong { .. })));
    }
}
