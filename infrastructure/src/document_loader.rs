use domain::errors::{RagError, RagResult};
use domain::models::Document;
use domain::ports::DocumentSource;
use memmap2::Mmap;
use rayon::prelude::*;
use shared::utils::is_plaintext_file;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const NIST_FILE: &str = "nist_800-53_summary.txt";
pub const CIS_FILE: &str = "cis_rhel_benchmark.txt";

const NIST_DEFAULT: &str = "
NIST 800-53 AC-2: Manage IAM users/roles and enforce least privilege using AWS IAM policies.
Use AWS Config rules for periodic review of permissions and access keys.
CM-2: Maintain baseline configurations using Systems Manager and AWS Config Conformance Packs.
";

const CIS_DEFAULT: &str = "
CIS Linux hardening: Disable root SSH, enforce password complexity, enable auditd,
restrict firewall rules, and regularly patch instances with AWS Systems Manager.
";

/// Loads every `*.txt` file directly under a source directory.
pub struct DocumentLoader {
    root_path: PathBuf,
}

impl DocumentLoader {
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Write the built-in documents that are missing. Existing files are
    /// never touched. Returns the paths that were written.
    pub fn bootstrap_defaults(&self) -> RagResult<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.root_path)?;
        let mut written = Vec::new();
        for (name, content) in [(NIST_FILE, NIST_DEFAULT), (CIS_FILE, CIS_DEFAULT)] {
            let path = self.root_path.join(name);
            if path.exists() {
                continue;
            }
            std::fs::write(&path, content)?;
            info!("Wrote default document {}", path.display());
            written.push(path);
        }
        Ok(written)
    }

    /// Plaintext files in sorted path order.
    pub fn collect_files(&self) -> RagResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.root_path)? {
            let path = entry?.path();
            if path.is_file() && is_plaintext_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn load_documents(&self) -> RagResult<Vec<Document>> {
        let files = self.collect_files()?;
        debug!("Reading {} documents from {}", files.len(), self.root_path.display());
        let documents = files
            .par_iter()
            .map(|path| load_file(path))
            .collect::<RagResult<Vec<_>>>()?;
        info!("Loaded {} documents from {}", documents.len(), self.root_path.display());
        Ok(documents)
    }
}

/// Every plaintext file is indexed in full, whatever its size.
fn load_file(path: &Path) -> RagResult<Document> {
    let len = path.metadata()?.len();
    let text = if len == 0 {
        String::new()
    } else {
        let file = File::open(path)?;
        // SAFETY: the mapping is read once and copied into an owned String.
        let mmap = unsafe { Mmap::map(&file)? };
        // Lossy conversion keeps a stray non-UTF-8 byte from failing the build.
        String::from_utf8_lossy(&mmap).into_owned()
    };
    debug!("Read {} ({} bytes)", path.display(), len);
    Ok(Document::new(path.to_string_lossy(), text))
}

impl DocumentSource for DocumentLoader {
    fn documents(&self) -> RagResult<Vec<Document>> {
        self.load_documents().map_err(|e| match e {
            RagError::Io(io) => RagError::Io(std::io::Error::new(
                io.kind(),
                format!("{}: {}", self.root_path.display(), io),
            )),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_writes_missing_defaults_only() {
        let tmp = tempfile::tempdir().unwrap();
        let data = tmp.path().join("data");
        let loader = DocumentLoader::new(&data);

        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join(NIST_FILE), "custom NIST notes").unwrap();

        let written = loader.bootstrap_defaults().unwrap();
        assert_eq!(written, vec![data.join(CIS_FILE)]);
        assert_eq!(
            std::fs::read_to_string(data.join(NIST_FILE)).unwrap(),
            "custom NIST notes"
        );
        assert!(loader.bootstrap_defaults().unwrap().is_empty());
    }

    #[test]
    fn loads_only_txt_files_in_sorted_order() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::write(root.join("b.txt"), "second").unwrap();
        std::fs::write(root.join("a.txt"), "first").unwrap();
        std::fs::write(root.join("notes.md"), "ignored").unwrap();
        std::fs::write(root.join("empty.txt"), "").unwrap();
        std::fs::create_dir(root.join("nested.txt")).unwrap();

        let docs = DocumentLoader::new(root).documents().unwrap();
        let texts: Vec<&str> = docs.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", ""]);
        assert!(docs[0].source.ends_with("a.txt"));
    }

    #[test]
    fn bootstrapped_defaults_are_loadable() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = DocumentLoader::new(tmp.path().join("data"));
        loader.bootstrap_defaults().unwrap();
        let docs = loader.documents().unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().any(|d| d.text.contains("AC-2")));
        assert!(docs.iter().any(|d| d.text.contains("auditd")));
    }

    #[test]
    fn missing_directory_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = DocumentLoader::new(tmp.path().join("absent")).documents().unwrap_err();
        assert!(matches!(err, RagError::Io(_)));
    }

    #[test]
    fn large_files_are_loaded_in_full() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let big = "AC-2 least privilege. ".repeat(120_000);
        std::fs::write(root.join("big.txt"), &big).unwrap();
        std::fs::write(root.join("small.txt"), "CM-2 baselines").unwrap();

        let docs = DocumentLoader::new(root).documents().unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].source.ends_with("big.txt"));
        assert_eq!(docs[0].text.len(), big.len());
        assert!(docs[0].text.len() > 2 * 1024 * 1024);
    }
}
