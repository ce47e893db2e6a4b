//! Export of a project's image list
//!
//! Pages through every image of a project with a cursor, writes one CSV
//! row per image and, when asked, downloads the images the server has
//! marked `Ready`. A download answered with a non-2xx status is logged and
//! skipped; anything else that fails stops the export.

use crate::cancel::CancelToken;
use crate::config::ExportConfig;
use crate::error::{ExportError, RemoteError};
use crate::remote::{ProjectImage, RemoteService, UploadKind};
use crate::upload::check;
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Images requested per page
pub const PAGE_SIZE: usize = 10;

/// Header row of the exported CSV
pub const CSV_HEADER: [&str; 4] = ["Filename", "Hashed Name", "State", "URL"];

/// Counters of one export run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportSummary {
    /// Images the server reports for the project
    pub total: usize,
    /// Rows written to the CSV
    pub exported: usize,
    pub downloaded: usize,
    /// Ready images whose download was refused
    pub download_failed: usize,
    /// Images left out of the download because they are not ready
    pub not_ready: usize,
    /// CSV path; `None` when the project has no image
    pub out: Option<PathBuf>,
    pub elapsed: Duration,
}

/// Lists a project's images into a CSV and optionally downloads them
pub struct ImageExporter {
    remote: Arc<dyn RemoteService>,
    client: Client,
    page_size: usize,
}

impl ImageExporter {
    pub fn new(remote: Arc<dyn RemoteService>) -> Result<Self, ExportError> {
        // no request timeout: original images may be large
        let client = Client::builder()
            .timeout(None)
            .build()
            .map_err(RemoteError::from)?;
        Ok(Self {
            remote,
            client,
            page_size: PAGE_SIZE,
        })
    }

    /// Override the number of images fetched per request
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Run the export. `on_page` sees the running totals after each page.
    pub fn run<F>(
        &self,
        config: &ExportConfig,
        cancel: &CancelToken,
        mut on_page: F,
    ) -> Result<ExportSummary, ExportError>
    where
        F: FnMut(&ExportSummary),
    {
        let start = Instant::now();
        let remote = &*self.remote;
        let pid = config.project_id.as_str();

        check::check(
            &check::warn_log,
            vec![
                check::api_server(remote),
                check::project(remote, UploadKind::Image, pid),
            ],
        )?;
        ensure_active(cancel)?;

        let mut page = remote.project_images(pid, self.page_size, None)?;
        let mut summary = ExportSummary {
            total: page.total,
            ..Default::default()
        };
        if page.total == 0 {
            info!(project = %pid, "No image found");
            summary.elapsed = start.elapsed();
            return Ok(summary);
        }

        if let Some(dir) = &config.download {
            fs::create_dir_all(dir).map_err(|source| ExportError::Io {
                path: dir.clone(),
                source,
            })?;
            info!("Downloading to {}", dir.display());
        }

        let mut writer = csv::Writer::from_path(&config.out)?;
        writer.write_record(CSV_HEADER)?;
        summary.out = Some(config.out.clone());
        info!(total = page.total, out = %config.out.display(), "Exporting images");

        loop {
            for image in &page.images {
                debug!(name = %image.name, filename = %image.filename, state = %image.state, "Image");
                writer.write_record([&image.name, &image.filename, &image.state, &image.url])?;
            }
            writer.flush().map_err(|source| ExportError::Io {
                path: config.out.clone(),
                source,
            })?;
            summary.exported += page.images.len();

            if let Some(dir) = &config.download {
                for image in &page.images {
                    ensure_active(cancel)?;
                    if !image.is_ready() {
                        summary.not_ready += 1;
                        continue;
                    }
                    if self.download(image, dir)? {
                        summary.downloaded += 1;
                    } else {
                        summary.download_failed += 1;
                    }
                }
            }

            summary.elapsed = start.elapsed();
            on_page(&summary);

            if !page.page_info.has_next_page {
                break;
            }
            ensure_active(cancel)?;
            let cursor = page
                .page_info
                .end_cursor
                .clone()
                .ok_or_else(|| RemoteError::Malformed("next page without a cursor".into()))?;
            page = remote.project_images(pid, self.page_size, Some(&cursor))?;
        }

        summary.elapsed = start.elapsed();
        Ok(summary)
    }

    /// Save one image into `dir`. Returns false if the server refused it.
    fn download(&self, image: &ProjectImage, dir: &Path) -> Result<bool, ExportError> {
        let Some(name) = Path::new(&image.name).file_name() else {
            warn!("Skipping image with unusable name {:?}", image.name);
            return Ok(false);
        };
        if image.url.is_empty() {
            warn!("Skipping {:?}: no download URL", image.name);
            return Ok(false);
        }

        let mut res = self.client.get(&image.url).send().map_err(RemoteError::from)?;
        if !res.status().is_success() {
            warn!("{} failed with status code: {}", image.url, res.status().as_u16());
            return Ok(false);
        }

        let dest = dir.join(name);
        let mut file = File::create(&dest).map_err(|source| ExportError::Io {
            path: dest.clone(),
            source,
        })?;
        let bytes = res.copy_to(&mut file).map_err(RemoteError::from)?;
        debug!(path = %dest.display(), bytes, "Downloaded");
        Ok(true)
    }
}

fn ensure_active(cancel: &CancelToken) -> Result<(), ExportError> {
    if cancel.is_cancelled() {
        return Err(ExportError::Cancelled);
    }
    Ok(())
}
