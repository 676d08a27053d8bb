use std::future::Future;
use std::path::{Path, PathBuf};

use crate::loader::LoadError;

/// Byte transport for the files of a scan.
pub trait FileTransport {
    /// File names of the scan in stack order
    fn list_files(&self, scan_id: &str) -> impl Future<Output = Result<Vec<String>, LoadError>>;

    fn fetch_file(
        &self,
        scan_id: &str,
        name: &str,
    ) -> impl Future<Output = Result<Vec<u8>, LoadError>>;
}

/// Serves `<root>/<scan_id>/*.dcm`, ordered by file name.
#[derive(Debug, Clone)]
pub struct DirectoryTransport {
    root: PathBuf,
}

impl DirectoryTransport {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn scan_dir(&self, scan_id: &str) -> PathBuf {
        self.root.join(scan_id)
    }
}

impl FileTransport for DirectoryTransport {
    async fn list_files(&self, scan_id: &str) -> Result<Vec<String>, LoadError> {
        let mut entries = tokio::fs::read_dir(self.scan_dir(scan_id)).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_dicom = path
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"));
            if !is_dicom {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        log::debug!("Scan {scan_id} lists {} files", names.len());
        Ok(names)
    }

    async fn fetch_file(&self, scan_id: &str, name: &str) -> Result<Vec<u8>, LoadError> {
        let path = self.scan_dir(scan_id).join(name);
        tokio::fs::read(&path)
            .await
            .map_err(|err| LoadError::NetworkFailure(format!("{}: {err}", path.display())))
    }
}
