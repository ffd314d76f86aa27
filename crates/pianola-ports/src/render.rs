#[derive(thiserror::Error, Debug)]
pub enum SheetRenderError {
    #[error("render failed: {0}")]
    RenderFailed(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Sheet-music rasterization, consumed as a "markup in, printable pages out"
/// capability. The core never draws notation itself.
pub trait SheetRenderPort: Send + Sync {
    fn render_pdf(&self, musicxml: &str) -> Result<Vec<u8>, SheetRenderError>;
}
