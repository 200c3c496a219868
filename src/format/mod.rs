pub mod legacy;
pub mod xls97;

pub use legacy::{LegacyConverter, Soffice};

use std::io::Cursor;
use std::path::Path;

use cfb::CompoundFile;

use crate::util::{is_compound_file, is_valid_zip};

/// What kind of container a spreadsheet file is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// ZIP-based package (xlsx, xlsm, ods...).
    Package,
    /// OLE compound file holding an encrypted OOXML package.
    EncryptedPackage,
    /// OLE compound file holding a BIFF `Workbook`/`Book` stream.
    LegacyWorkbook,
    /// Anything else, including other OLE documents.
    Unknown,
}

/// Sniff the container kind from the file contents.
pub fn detect_container(data: &[u8]) -> ContainerKind {
    if is_valid_zip(data) {
        return ContainerKind::Package;
    }
    if !is_compound_file(data) {
        return ContainerKind::Unknown;
    }
    let Ok(cfb) = CompoundFile::open(Cursor::new(data)) else {
        return ContainerKind::Unknown;
    };
    if cfb.is_stream("/EncryptionInfo") {
        ContainerKind::EncryptedPackage
    } else if cfb.is_stream("/Workbook") || cfb.is_stream("/Book") {
        ContainerKind::LegacyWorkbook
    } else {
        ContainerKind::Unknown
    }
}

/// Whether the file name says legacy binary workbook.
pub fn has_legacy_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xls"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn compound_file(streams: &[&str]) -> Vec<u8> {
        let mut cfb = CompoundFile::create(Cursor::new(Vec::new())).unwrap();
        for name in streams {
            let mut stream = cfb.create_stream(name).unwrap();
            stream.write_all(b"payload").unwrap();
        }
        cfb.flush().unwrap();
        cfb.into_inner().into_inner()
    }

    #[test]
    fn legacy_extension_is_case_insensitive() {
        assert!(has_legacy_extension(Path::new("orders.xls")));
        assert!(has_legacy_extension(Path::new("/tmp/ORDERS.XLS")));
        assert!(!has_legacy_extension(Path::new("orders.xlsx")));
        assert!(!has_legacy_extension(Path::new("xls")));
    }

    #[test]
    fn detects_containers() {
        assert_eq!(detect_container(b"PK\x03\x04...."), ContainerKind::Package);
        assert_eq!(detect_container(b"plain text"), ContainerKind::Unknown);
        assert_eq!(
            detect_container(&compound_file(&["/EncryptionInfo", "/EncryptedPackage"])),
            ContainerKind::EncryptedPackage
        );
        assert_eq!(
            detect_container(&compound_file(&["/Workbook"])),
            ContainerKind::LegacyWorkbook
        );
        assert_eq!(
            detect_container(&compound_file(&["/WordDocument"])),
            ContainerKind::Unknown
        );
    }
}
