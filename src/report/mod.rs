//! Customer report: every record sorted by name, paginated, rendered to
//! PDF and handed to the OS document viewer.

pub mod layout;
pub mod pdf;

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;

pub use layout::{PageLayout, ReportDocument, paginate};

use crate::error::ReportError;
use crate::repository::CustomerRepository;
use crate::store::DocumentStore;

/// Opens a generated document for the user.
pub trait DocumentViewer {
    /// Open `path` without waiting for the viewer to exit.
    ///
    /// # Errors
    ///
    /// [`ReportError::Viewer`] if the viewer cannot be launched.
    fn open(&self, path: &Path) -> Result<(), ReportError>;
}

/// The platform's default opener (`xdg-open`, `open`, `start`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemViewer;

impl DocumentViewer for SystemViewer {
    fn open(&self, path: &Path) -> Result<(), ReportError> {
        let mut command = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", "start", ""]);
            c
        } else if cfg!(target_os = "macos") {
            Command::new("open")
        } else {
            Command::new("xdg-open")
        };
        command
            .arg(path)
            .spawn()
            .map_err(|e| ReportError::Viewer(format!("{}: {e}", path.display())))?;
        Ok(())
    }
}

/// Builds customer reports from the repository.
pub struct ReportService<S: DocumentStore> {
    repository: CustomerRepository<S>,
    layout: PageLayout,
    output_dir: Option<PathBuf>,
}

impl<S: DocumentStore> ReportService<S> {
    /// # Arguments
    ///
    /// * `output_dir` - Where report files go; `None` means the OS temp dir.
    pub fn new(
        repository: CustomerRepository<S>,
        layout: PageLayout,
        output_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            repository,
            layout,
            output_dir,
        }
    }

    /// Load every record sorted by name and lay it out.
    pub async fn build(&self) -> Result<ReportDocument, ReportError> {
        let records = self.repository.list_sorted_by_name().await?;
        let doc = paginate(&records, &self.layout);
        tracing::info!(
            customers = records.len(),
            pages = doc.pages.len(),
            "report laid out"
        );
        Ok(doc)
    }

    /// Render `doc` into a new `clientes-*.pdf` file that outlives the
    /// process. File I/O runs on the blocking pool.
    pub async fn write(&self, doc: &ReportDocument) -> Result<PathBuf, ReportError> {
        let bytes = pdf::render(doc);
        let dir = self
            .output_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let path = tokio::task::spawn_blocking(move || keep_pdf(&bytes, &dir))
            .await
            .map_err(std::io::Error::other)??;

        tracing::info!(path = %path.display(), "report written");
        Ok(path)
    }

    /// Build, write, and return the report path.
    pub async fn generate(&self) -> Result<PathBuf, ReportError> {
        let doc = self.build().await?;
        self.write(&doc).await
    }

    /// Build and write the report, then open it with `viewer`.
    ///
    /// # Errors
    ///
    /// Fails if the records cannot be loaded, the file cannot be written,
    /// or the viewer cannot be launched. In the last case the file is left
    /// in place.
    pub async fn generate_and_open(
        &self,
        viewer: &impl DocumentViewer,
    ) -> Result<PathBuf, ReportError> {
        let path = self.generate().await?;
        viewer.open(&path)?;
        Ok(path)
    }
}

fn keep_pdf(bytes: &[u8], dir: &Path) -> Result<PathBuf, ReportError> {
    std::fs::create_dir_all(dir)?;
    let mut file = tempfile::Builder::new()
        .prefix("clientes-")
        .suffix(".pdf")
        .tempfile_in(dir)?;
    file.write_all(bytes)?;
    file.flush()?;
    let (_file, path) = file.keep().map_err(std::io::Error::from)?;
    Ok(path)
}
