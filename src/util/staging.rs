//! 上传文件暂存
//!
//! 暂存文件以 `{时间戳}_{随机串}_{清洗后文件名}` 命名；`StagedUpload` 被释放时删除文件，
//! 任何退出路径（成功、4xx、5xx、panic 展开）都只删除一次。删除失败只记日志。

use chrono::Local;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const RANDOM_LEN: usize = 8;

#[derive(Debug)]
pub struct StagedUpload {
    file: Option<NamedTempFile>,
    path: PathBuf,
    size_bytes: u64,
}

impl StagedUpload {
    /// 将上传内容写入暂存目录
    pub fn stage(dir: &Path, filename: &str, bytes: &[u8]) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;

        let prefix = format!("{}_", Local::now().format("%Y%m%d_%H%M%S"));
        let suffix = format!("_{}", filename);
        let mut file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&suffix)
            .rand_bytes(RANDOM_LEN)
            .tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;

        let path = file.path().to_path_buf();
        let size_bytes = file.as_file().metadata()?.len();
        debug!(
            event = "extract.staging.created",
            path = %path.display(),
            size_bytes
        );

        Ok(Self {
            file: Some(file),
            path,
            size_bytes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// 大小（MB，保留两位小数）
    pub fn size_mb(&self) -> f64 {
        super::round_to(self.size_bytes as f64 / (1024.0 * 1024.0), 2)
    }

    /// 显式清理，等价于 drop
    pub fn cleanup(self) {
        drop(self);
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        match file.close() {
            Ok(()) => debug!(event = "extract.staging.removed", path = %self.path.display()),
            Err(err) => warn!(
                event = "staging.cleanup.failed",
                path = %self.path.display(),
                error = %err
            ),
        }
    }
}
