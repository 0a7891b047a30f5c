use std::sync::Arc;

pub mod api;
pub mod build_info;
pub mod model;
pub mod server;
pub mod util;

use util::config::Config;
use util::processing::{PageRasterizer, TextRecognizer};

/// 应用状态结构
///
/// 两个外部协作者（光栅化、文字识别）以 trait 对象注入，测试中可替换为桩实现。
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub rasterizer: Arc<dyn PageRasterizer>,
    pub recognizer: Arc<dyn TextRecognizer>,
}

impl AppState {
    pub fn new(
        config: Config,
        rasterizer: Arc<dyn PageRasterizer>,
        recognizer: Arc<dyn TextRecognizer>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            rasterizer,
            recognizer,
        }
    }
}

