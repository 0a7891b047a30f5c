pub mod ocr;

use image::DynamicImage;
use pdf2image::{Pages, RenderOptionsBuilder, DPI};
use std::env::current_dir;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub static CURRENT_DIR: LazyLock<PathBuf> =
    LazyLock::new(|| current_dir().unwrap_or_else(|_| PathBuf::from(".")));

/// PDF 坐标系的基准分辨率（缩放倍数 1.0）
pub const BASE_DPI: f32 = 72.0;

const MIN_RENDER_DPI: f32 = 36.0;
const MAX_RENDER_DPI: f32 = 600.0;

/// 光栅化得到的单页图像
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 页码，从 1 开始
    pub page: u32,
    pub image: DynamicImage,
}

/// 缩放倍数换算为渲染 DPI（2 倍缩放 = 144 DPI）
pub fn dpi_for_zoom(zoom: f32) -> u32 {
    (BASE_DPI * zoom).round().clamp(MIN_RENDER_DPI, MAX_RENDER_DPI) as u32
}

/// 按缩放倍数渲染 PDF 的全部页面
///
/// 返回顺序与 PDF 页序一致；页数为 0 时返回空列表，由调用方决定如何处理。
pub fn pdf_render_pages(path: &Path, zoom: f32) -> Result<Vec<PageImage>, Box<dyn Error>> {
    let pdf = pdf2image::PDF::from_file(path)?;
    let page_count = pdf.page_count();
    if page_count == 0 {
        tracing::warn!(event = "pdf.render.empty", path = %path.display());
        return Ok(Vec::new());
    }

    let dpi = dpi_for_zoom(zoom);
    let mut binding = RenderOptionsBuilder::default();
    let builder = binding.pdftocairo(true).resolution(DPI::Uniform(dpi));
    let images = pdf.render(Pages::Range(1..=page_count), builder.build()?)?;

    tracing::debug!(
        event = "pdf.render.done",
        path = %path.display(),
        pages = page_count,
        rendered = images.len(),
        dpi
    );

    Ok(images
        .into_iter()
        .enumerate()
        .map(|(index, image)| PageImage {
            page: index as u32 + 1,
            image,
        })
        .collect())
}
