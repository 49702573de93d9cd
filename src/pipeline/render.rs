//! PDF rasterisation: every page of a staged PDF to a `DynamicImage`.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is not safe to drive from async code. Rendering runs on the
//! blocking pool so Tokio workers never stall on CPU-heavy rasterisation.
//!
//! ## Why render everything?
//!
//! An invocation may resume mid-document, but the classifier needs the
//! predecessor's image to recompute its trailing-table answer. Rendering the
//! whole document each invocation keeps the checkpoint free of image state.

use crate::error::IngestError;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Turns a local PDF into one image per page, in page order.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, pdf_path: &Path) -> Result<Vec<DynamicImage>, IngestError>;
}

/// pdfium-backed renderer.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    max_pixels: u32,
    password: Option<String>,
    library_dir: Option<PathBuf>,
}

impl PdfiumRenderer {
    pub fn new(max_pixels: u32) -> Self {
        Self {
            max_pixels,
            password: None,
            library_dir: None,
        }
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    /// Directory holding the pdfium shared library.
    pub fn with_library_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.library_dir = dir;
        self
    }
}

#[async_trait]
impl PageRenderer for PdfiumRenderer {
    async fn render(&self, pdf_path: &Path) -> Result<Vec<DynamicImage>, IngestError> {
        let this = self.clone();
        let path = pdf_path.to_path_buf();

        tokio::task::spawn_blocking(move || this.render_blocking(&path))
            .await
            .map_err(|e| IngestError::Internal(format!("Render task panicked: {}", e)))?
    }
}

impl PdfiumRenderer {
    fn bind(&self) -> Result<Pdfium, IngestError> {
        let bindings = match &self.library_dir {
            Some(dir) => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
                    .or_else(|_| Pdfium::bind_to_system_library())
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| IngestError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }

    fn render_blocking(&self, pdf_path: &Path) -> Result<Vec<DynamicImage>, IngestError> {
        let pdfium = self.bind()?;
        let password = self.password.as_deref();

        let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                if password.is_some() {
                    IngestError::WrongPassword {
                        path: pdf_path.to_path_buf(),
                    }
                } else {
                    IngestError::PasswordRequired {
                        path: pdf_path.to_path_buf(),
                    }
                }
            } else {
                IngestError::CorruptPdf {
                    path: pdf_path.to_path_buf(),
                    detail: err_str,
                }
            }
        })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("PDF loaded: {} pages", total_pages);

        let render_config = PdfRenderConfig::new()
            .set_target_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let mut images = Vec::with_capacity(total_pages);
        for idx in 0..total_pages {
            let page = pages
                .get(idx as u16)
                .map_err(|e| IngestError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                })?;

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                IngestError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            images.push(image);
        }

        Ok(images)
    }
}
