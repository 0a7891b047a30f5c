use crate::CURRENT_DIR;
use base64::Engine;
use crossbeam::channel::{bounded, Receiver};
use image::{DynamicImage, GenericImageView, ImageFormat};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io::{self, BufRead, BufReader, Cursor, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

type Point = [usize; 2];

const SLOW_CALL_WARN_THRESHOLD_MS: u128 = 8_000;
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const STDERR_KEEP_LINES: usize = 200;
const DEFAULT_MAX_INPUT_BYTES: usize = 10 * 1024 * 1024; // 10MB
const DEFAULT_MAX_PIXELS: u64 = 25_000_000; // ~25MP, 5000x5000
const DEFAULT_MIN_DIMENSION: u32 = 16; // 过小图片直接判为无效

/// PaddleOCR-json 官方错误码
pub mod error_code {
    // 成功类 (正常返回)
    pub const OK_WITH_TEXT: u32 = 100; // 识别到文字
    pub const OK_NO_TEXT: u32 = 101; // 未识别到文字（正常）

    // 路径/文件类错误 (2xx) - 数据问题，不需重启
    pub const ERR_PATH_NOT_EXIST: u32 = 200;
    pub const ERR_PATH_ENCODE: u32 = 201;
    pub const ERR_FILE_OPEN: u32 = 202;
    pub const ERR_IMAGE_DECODE: u32 = 203;

    // Base64类错误 (3xx) - 数据问题，不需重启
    pub const ERR_BASE64_DECODE: u32 = 300;
    pub const ERR_BASE64_IMDECODE: u32 = 301;

    // JSON/引擎类错误 (4xx) - 需要重启
    pub const ERR_JSON_DUMP: u32 = 400;
    pub const ERR_JSON_PARSE: u32 = 401;
    pub const ERR_JSON_KEY: u32 = 402;
    pub const ERR_NO_TASK: u32 = 403;

    /// 判断是否为"成功"结果（包括空文本）
    #[inline]
    pub fn is_success(code: u32) -> bool {
        matches!(code, OK_WITH_TEXT | OK_NO_TEXT)
    }

    /// 判断是否为数据问题（不需要重启引擎）
    #[inline]
    pub fn is_data_error(code: u32) -> bool {
        matches!(code, 200..=217 | 300..=301)
    }

    /// 判断是否需要重启引擎（引擎内部问题）
    #[inline]
    pub fn should_restart(code: u32) -> bool {
        matches!(code, 400..=403)
    }

    /// Human-readable description of an engine code.
    pub fn description(code: u32) -> &'static str {
        match code {
            100 => "text recognized",
            101 => "no text found",
            200 => "image path does not exist",
            201 => "image path encoding failed",
            202 => "image file could not be opened",
            203 => "image could not be decoded",
            210..=217 => "clipboard input is not supported",
            300 => "base64 payload could not be parsed",
            301 => "base64 image could not be decoded",
            400 => "engine failed to serialize its result",
            401 => "engine failed to parse the request",
            402 => "engine request is missing a key",
            403 => "engine found no task in the request",
            _ => "unknown engine error",
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Content {
    code: u32,
    #[serde(default)]
    data: serde_json::Value, // 可以是数组或字符串
}

#[derive(Deserialize, Debug, Clone)]
pub struct ContentData {
    #[serde(rename = "box")]
    pub rect: Rectangle,
    pub score: f64,
    pub text: String,
}

pub type Rectangle = [Point; 4];

/// 提交给引擎的图片（Base64 形式，避免落盘）
#[derive(Debug, Serialize, Clone)]
pub struct ImageData {
    image_base64: String,
}

impl ImageData {
    fn from_bytes<T>(bytes: T) -> ImageData
    where
        T: AsRef<[u8]>,
    {
        ImageData {
            image_base64: base64::engine::general_purpose::STANDARD.encode(bytes.as_ref()),
        }
    }

    /// 将解码后的页面位图转为 RGB PNG
    ///
    /// 尺寸与像素数在编码前按位图检查，编码后只检查体积；不合格的页面返回 DATA_ERR，不送入引擎。
    pub fn from_image(image: &DynamicImage) -> Result<ImageData, String> {
        let limits = &*IMAGE_LIMITS;
        let (width, height) = image.dimensions();
        check_dimensions(width, height, limits)?;

        let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
        let mut cursor = Cursor::new(Vec::new());
        rgb.write_to(&mut cursor, ImageFormat::Png)
            .map_err(|e| format!("[DATA_ERR:IMAGE_ENCODE] page bitmap could not be encoded: {}", e))?;
        let bytes = cursor.into_inner();
        check_encoded_size(bytes.len(), limits)?;
        Ok(ImageData::from_bytes(bytes))
    }
}

/// 引擎启动选项（由上层按语言传入）
#[derive(Debug, Clone)]
pub struct OcrEngineOptions {
    pub work_dir: Option<PathBuf>,
    pub binary: Option<PathBuf>,
    pub lib_path: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    /// 语言模型配置文件，如 models/config_en.txt
    pub config_path: Option<PathBuf>,
    pub use_angle_cls: bool,
}

impl Default for OcrEngineOptions {
    fn default() -> Self {
        Self {
            work_dir: None,
            binary: None,
            lib_path: None,
            timeout_secs: None,
            config_path: None,
            use_angle_cls: true,
        }
    }
}

impl OcrEngineOptions {
    /// 未配置时使用 `<当前目录>/ocr`
    pub fn resolved_work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(|| CURRENT_DIR.join("ocr"))
    }

    pub fn binary_path(&self) -> PathBuf {
        self.binary
            .clone()
            .unwrap_or_else(|| self.resolved_work_dir().join("PaddleOCR-json"))
    }

    /// 引擎命令行参数：方向分类开启，GPU 关闭
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(4);
        if let Some(config) = &self.config_path {
            args.push(format!("-config_path={}", config.display()));
        }
        let cls = u8::from(self.use_angle_cls);
        args.push(format!("-cls={cls}"));
        args.push(format!("-use_angle_cls={cls}"));
        args.push("-use_gpu=0".to_string());
        args
    }
}

pub struct Extractor {
    process: Child,
    receiver: Receiver<String>,
    stderr_recent: Arc<Mutex<VecDeque<String>>>,
    engine_opts: OcrEngineOptions,
    last_used: Instant,
    consecutive_failures: u32,
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("pid", &self.process.id())
            .field("consecutive_failures", &self.consecutive_failures)
            .field("idle_ms", &self.last_used.elapsed().as_millis())
            .finish()
    }
}

impl Extractor {
    pub fn new_with_options(opts: OcrEngineOptions) -> io::Result<Self> {
        let (process, receiver, stderr_recent) = Self::spawn_process(&opts)?;
        Ok(Self {
            process,
            receiver,
            stderr_recent,
            engine_opts: opts,
            last_used: Instant::now(),
            consecutive_failures: 0,
        })
    }

    fn spawn_process(
        opts: &OcrEngineOptions,
    ) -> io::Result<(Child, Receiver<String>, Arc<Mutex<VecDeque<String>>>)> {
        let work_dir = opts.resolved_work_dir();
        let bin = opts.binary_path();
        let lib = opts.lib_path.clone().unwrap_or(work_dir.join("lib"));

        let mut process = Command::new(&bin)
            .args(opts.launch_args())
            .env("LD_LIBRARY_PATH", lib)
            .current_dir(&work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let (sender, receiver) = bounded::<String>(0);
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "OCR进程stdout不可用"))?;
        std::thread::Builder::new()
            .name("ocr-stdout".to_string())
            .spawn(move || {
                let mut reader = BufReader::new(stdout);
                let mut content = String::new();
                loop {
                    match reader.read_line(&mut content) {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {
                            if sender.send(content.clone()).is_err() {
                                break;
                            }
                            content.clear();
                        }
                    }
                }
            })?;

        // stderr 只保留最近若干行，用于故障诊断
        let stderr_recent: Arc<Mutex<VecDeque<String>>> =
            Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_KEEP_LINES)));
        let stderr_recent_cloned = stderr_recent.clone();
        let stderr = process
            .stderr
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "OCR进程stderr不可用"))?;
        std::thread::Builder::new()
            .name("ocr-stderr".to_string())
            .spawn(move || {
                let mut reader = BufReader::new(stderr);
                let mut line = String::new();
                loop {
                    match reader.read_line(&mut line) {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {
                            let mut buf = stderr_recent_cloned.lock();
                            if buf.len() >= STDERR_KEEP_LINES {
                                buf.pop_front();
                            }
                            buf.push_back(line.trim_end().to_string());
                        }
                    }
                    line.clear();
                }
            })?;

        // 丢弃启动横幅
        while receiver.recv_timeout(Duration::from_millis(200)).is_ok() {}
        ENGINE_STARTED.fetch_add(1, Ordering::Relaxed);
        debug!(
            event = "engine.spawned",
            binary = %bin.display(),
            pid = process.id()
        );
        Ok((process, receiver, stderr_recent))
    }

    fn read_line(&mut self) -> String {
        let timeout = self.engine_opts.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let deadline = Instant::now() + Duration::from_secs(timeout);
        loop {
            let now = Instant::now();
            if now >= deadline {
                return String::new();
            }
            match self.receiver.recv_timeout(deadline - now) {
                Ok(content) => {
                    // 跳过非 JSON 行（版本横幅、日志等）
                    if content.trim_start().starts_with('{') {
                        return content;
                    }
                }
                Err(_) => return String::new(),
            }
        }
    }

    fn write_request(&mut self, image: &ImageData) -> io::Result<()> {
        let payload = serde_json::to_string(image)?;
        let stdin = self
            .process
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "stdin not piped"))?;
        writeln!(stdin, "{}", payload)?;
        stdin.flush()
    }

    /// 发送一张图片并解析引擎返回的文本块
    pub fn ocr_and_parse(&mut self, image: &ImageData) -> Result<Vec<ContentData>, String> {
        use error_code::*;

        let start = Instant::now();
        self.write_request(image)
            .map_err(|e| format!("[ENGINE_ERR:WRITE] OCR engine call failed: {}", e))?;
        let response = self.read_line();
        let elapsed = start.elapsed();
        if elapsed.as_millis() > SLOW_CALL_WARN_THRESHOLD_MS {
            warn!(
                event = "engine.call.slow",
                duration_ms = elapsed.as_millis() as u64
            );
        }

        if response.trim().is_empty() {
            return Err(
                "[ENGINE_ERR:NO_RESPONSE] OCR engine did not respond (timeout or crash)".to_string(),
            );
        }

        let content = serde_json::from_str::<Content>(&response).map_err(|e| {
            debug!(
                "原始响应 (前500字符): {}",
                response.chars().take(500).collect::<String>()
            );
            format!("[ENGINE_ERR:RESPONSE] response JSON parse failed: {}", e)
        })?;

        if is_success(content.code) {
            if content.code == OK_NO_TEXT {
                return Ok(Vec::new());
            }
            return Ok(serde_json::from_value::<Vec<ContentData>>(content.data).unwrap_or_default());
        }

        let detail = content.data.as_str().unwrap_or("unknown");
        let desc = description(content.code);
        if is_data_error(content.code) {
            Err(format!("[DATA_ERR:{}] {} - {}", content.code, desc, detail))
        } else {
            Err(format!("[ENGINE_ERR:{}] {} - {}", content.code, desc, detail))
        }
    }

    /// 识别一张图片，返回按行拼接的文本
    ///
    /// 数据错误不计入引擎故障。通信故障（写入失败、无响应、响应无法解析）和
    /// `should_restart` 范围内的错误码会立即重启引擎，避免下一次调用读到残留输出；
    /// 其他未知错误码只计数。
    pub fn recognize_text(&mut self, image: &ImageData) -> Result<String, String> {
        self.ensure_running();
        match self.ocr_and_parse(image) {
            Ok(blocks) => {
                self.mark_success();
                Ok(join_block_texts(&blocks))
            }
            Err(err) if is_data_error_message(&err) => {
                info!(event = "engine.data_error", error = %err);
                Err(err)
            }
            Err(err) => {
                let restart = error_requires_restart(&err);
                self.mark_failure(&err, restart);
                Err(err)
            }
        }
    }

    fn restart(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
        match Self::spawn_process(&self.engine_opts) {
            Ok((proc, recv, stderr_recent)) => {
                self.process = proc;
                self.receiver = recv;
                self.stderr_recent = stderr_recent;
                self.last_used = Instant::now();
                ENGINE_RESTARTED.fetch_add(1, Ordering::Relaxed);
                info!(event = "engine.restart.success");
            }
            Err(e) => {
                error!(event = "engine.restart.failed", error = %e);
            }
        }
    }

    fn ensure_running(&mut self) {
        match self.process.try_wait() {
            Ok(Some(status)) => {
                warn!(?status, "检测到OCR引擎已退出，准备重启");
                self.restart();
            }
            Ok(None) => {}
            Err(err) => {
                warn!("检查OCR引擎状态失败，将重新拉起: {}", err);
                self.restart();
            }
        }
    }

    fn mark_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_used = Instant::now();
    }

    fn mark_failure(&mut self, err: &str, restart: bool) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_used = Instant::now();
        ENGINE_FAILURES.fetch_add(1, Ordering::Relaxed);

        let tail: Vec<String> = {
            let buf = self.stderr_recent.lock();
            buf.iter().rev().take(20).rev().cloned().collect()
        };
        warn!(
            event = "engine.call.failed",
            consecutive_failures = self.consecutive_failures,
            restart,
            error = %err,
            stderr_tail = %tail.join(" | ")
        );
        if restart {
            self.restart();
        }
    }
}

impl Drop for Extractor {
    fn drop(&mut self) {
        self.process.kill().ok();
    }
}

/// 引擎返回的文本块按顺序逐行拼接
pub fn join_block_texts(blocks: &[ContentData]) -> String {
    blocks
        .iter()
        .map(|block| block.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// 判断错误消息是否为"数据问题"（不需要重启引擎）
pub fn is_data_error_message(err: &str) -> bool {
    err.starts_with("[DATA_ERR:")
}

/// 引擎错误是否需要重启进程
///
/// `[ENGINE_ERR:<code>]` 按错误码表判断；非数字标签（WRITE、NO_RESPONSE、RESPONSE 等）
/// 表示进程通信已不可靠，一律重启。
pub fn error_requires_restart(err: &str) -> bool {
    let tag = err
        .strip_prefix("[ENGINE_ERR:")
        .and_then(|rest| rest.split_once(']'))
        .map(|(tag, _)| tag);
    match tag.map(str::parse::<u32>) {
        Some(Ok(code)) => error_code::should_restart(code),
        _ => true,
    }
}

fn check_dimensions(width: u32, height: u32, limits: &ImageLimits) -> Result<(), String> {
    if width < limits.min_dimension || height < limits.min_dimension {
        return Err(format!(
            "[DATA_ERR:IMAGE_TOO_SMALL] image too small: {}x{} (minimum {}x{})",
            width, height, limits.min_dimension, limits.min_dimension
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > limits.max_pixels {
        return Err(format!(
            "[DATA_ERR:IMAGE_TOO_LARGE] too many pixels: {} (limit {})",
            pixels, limits.max_pixels
        ));
    }
    Ok(())
}

fn check_encoded_size(len: usize, limits: &ImageLimits) -> Result<(), String> {
    if len > limits.max_input_bytes {
        return Err(format!(
            "[DATA_ERR:IMAGE_TOO_LARGE] encoded image too large: {} bytes (limit {} bytes)",
            len, limits.max_input_bytes
        ));
    }
    Ok(())
}

struct ImageLimits {
    max_input_bytes: usize,
    max_pixels: u64,
    min_dimension: u32,
}

static IMAGE_LIMITS: LazyLock<ImageLimits> = LazyLock::new(|| {
    let max_input_bytes = std::env::var("OCR_MAX_INPUT_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_MAX_INPUT_BYTES);
    let max_pixels = std::env::var("OCR_MAX_PIXELS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_MAX_PIXELS);
    let min_dimension = std::env::var("OCR_MIN_DIMENSION")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_MIN_DIMENSION);

    info!(
        max_input_bytes,
        max_pixels,
        min_dimension,
        "OCR 图片校验阈值已初始化（可通过环境变量 OCR_MAX_INPUT_BYTES / OCR_MAX_PIXELS / OCR_MIN_DIMENSION 覆盖）"
    );

    ImageLimits {
        max_input_bytes,
        max_pixels,
        min_dimension,
    }
});

// =====================
// 按语言划分的引擎注册表
// =====================

struct EngineSlot {
    options: OcrEngineOptions,
    engine: Mutex<Option<Arc<Mutex<Extractor>>>>,
}

/// 每种语言一个常驻引擎，首次使用时创建
///
/// 创建过程持有该语言的槽位锁，同一语言的并发首个请求只会拉起一个进程；
/// 不同语言之间互不阻塞。
pub struct EngineRegistry {
    slots: HashMap<String, EngineSlot>,
}

impl EngineRegistry {
    pub fn new<I, K>(languages: I) -> Self
    where
        I: IntoIterator<Item = (K, OcrEngineOptions)>,
        K: Into<String>,
    {
        let slots = languages
            .into_iter()
            .map(|(language, options)| {
                (
                    language.into(),
                    EngineSlot {
                        options,
                        engine: Mutex::new(None),
                    },
                )
            })
            .collect();
        Self { slots }
    }

    pub fn languages(&self) -> Vec<&str> {
        let mut languages: Vec<&str> = self.slots.keys().map(String::as_str).collect();
        languages.sort_unstable();
        languages
    }

    pub fn is_initialized(&self, language: &str) -> bool {
        self.slots
            .get(language)
            .map(|slot| slot.engine.lock().is_some())
            .unwrap_or(false)
    }

    /// 获取（必要时创建）指定语言的引擎
    pub fn engine(&self, language: &str) -> io::Result<Arc<Mutex<Extractor>>> {
        let slot = self.slots.get(language).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no OCR engine configured for language '{}'", language),
            )
        })?;

        let mut guard = slot.engine.lock();
        if let Some(engine) = guard.as_ref() {
            return Ok(engine.clone());
        }

        info!(event = "recognizer.init.start", language);
        match Extractor::new_with_options(slot.options.clone()) {
            Ok(extractor) => {
                let engine = Arc::new(Mutex::new(extractor));
                *guard = Some(engine.clone());
                info!(event = "recognizer.init.success", language);
                Ok(engine)
            }
            Err(err) => {
                error!(event = "recognizer.init.failed", language, error = %err);
                Err(err)
            }
        }
    }

    /// 用指定语言的引擎识别一张图片
    pub fn recognize(&self, language: &str, image: &ImageData) -> Result<String, String> {
        let engine = self
            .engine(language)
            .map_err(|e| format!("[ENGINE_ERR:SPAWN] OCR engine could not be started: {}", e))?;
        let mut extractor = engine.lock();
        extractor.recognize_text(image)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            languages: self.languages().into_iter().map(str::to_string).collect(),
            initialized: self
                .languages()
                .into_iter()
                .filter(|language| self.is_initialized(language))
                .map(str::to_string)
                .collect(),
            total_started: ENGINE_STARTED.load(Ordering::Relaxed),
            total_restarted: ENGINE_RESTARTED.load(Ordering::Relaxed),
            total_failures: ENGINE_FAILURES.load(Ordering::Relaxed),
        }
    }
}

static ENGINE_STARTED: AtomicU64 = AtomicU64::new(0);
static ENGINE_RESTARTED: AtomicU64 = AtomicU64::new(0);
static ENGINE_FAILURES: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub languages: Vec<String>,
    pub initialized: Vec<String>,
    pub total_started: u64,
    pub total_restarted: u64,
    pub total_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn block(text: &str) -> ContentData {
        ContentData {
            rect: [[0, 0], [10, 0], [10, 10], [0, 10]],
            score: 0.9,
            text: text.to_string(),
        }
    }

    #[test]
    fn error_codes_are_classified() {
        assert!(error_code::is_success(100));
        assert!(error_code::is_success(101));
        assert!(error_code::is_data_error(203));
        assert!(error_code::is_data_error(301));
        assert!(!error_code::is_data_error(401));
        assert!(error_code::should_restart(402));
        assert_eq!(error_code::description(999), "unknown engine error");
    }

    #[test]
    fn block_texts_are_joined_by_line() {
        let blocks = vec![block("Hello"), block("world  "), block("")];
        assert_eq!(join_block_texts(&blocks), "Hello\nworld");
        assert_eq!(join_block_texts(&[]), "");
    }

    #[test]
    fn engine_response_parses() {
        let raw = r#"{"code":100,"data":[{"box":[[1,2],[3,2],[3,4],[1,4]],"score":0.98,"text":"Xin chào"}]}"#;
        let content: Content = serde_json::from_str(raw).unwrap();
        assert_eq!(content.code, 100);
        let blocks: Vec<ContentData> = serde_json::from_value(content.data).unwrap();
        assert_eq!(blocks[0].text, "Xin chào");
        assert_eq!(blocks[0].rect[2], [3, 4]);
    }

    #[test]
    fn launch_args_enable_angle_cls_and_disable_gpu() {
        let opts = OcrEngineOptions {
            config_path: Some(PathBuf::from("models/config_en.txt")),
            ..Default::default()
        };
        assert_eq!(
            opts.launch_args(),
            vec![
                "-config_path=models/config_en.txt",
                "-cls=1",
                "-use_angle_cls=1",
                "-use_gpu=0"
            ]
        );
    }

    #[test]
    fn page_image_is_encoded_as_png() {
        let img = DynamicImage::ImageRgba8(image::RgbaImage::new(64, 48));
        let data = ImageData::from_image(&img).unwrap();
        let png = base64::engine::general_purpose::STANDARD
            .decode(&data.image_base64)
            .unwrap();
        assert_eq!(image::guess_format(&png).unwrap(), ImageFormat::Png);
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
        assert!(matches!(decoded, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn undersized_or_oversized_pages_are_data_errors() {
        let tiny = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        let err = ImageData::from_image(&tiny).unwrap_err();
        assert!(err.starts_with("[DATA_ERR:IMAGE_TOO_SMALL]"));
        assert!(is_data_error_message(&err));

        let limits = ImageLimits {
            max_input_bytes: 1024,
            max_pixels: 10_000,
            min_dimension: 16,
        };
        assert!(check_dimensions(100, 100, &limits).is_ok());
        let err = check_dimensions(200, 100, &limits).unwrap_err();
        assert!(err.starts_with("[DATA_ERR:IMAGE_TOO_LARGE]"));
        assert!(check_encoded_size(1024, &limits).is_ok());
        assert!(is_data_error_message(&check_encoded_size(1025, &limits).unwrap_err()));
    }

    #[test]
    fn restart_follows_error_code_table() {
        assert!(error_requires_restart("[ENGINE_ERR:401] engine failed to parse the request - x"));
        assert!(error_requires_restart("[ENGINE_ERR:NO_RESPONSE] OCR engine did not respond"));
        assert!(error_requires_restart("[ENGINE_ERR:WRITE] OCR engine call failed: broken pipe"));
        assert!(!error_requires_restart("[ENGINE_ERR:999] unknown engine error - odd"));
    }

    #[test]
    fn unknown_language_has_no_engine() {
        let registry = EngineRegistry::new([("en", OcrEngineOptions::default())]);
        let err = registry.engine("fr").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(registry.languages(), vec!["en"]);
    }

    #[test]
    fn failed_spawn_leaves_slot_empty() {
        let missing = CURRENT_DIR.join("no-such-engine-dir");
        let registry = EngineRegistry::new([(
            "vi",
            OcrEngineOptions {
                work_dir: Some(missing),
                ..Default::default()
            },
        )]);
        assert!(registry.engine("vi").is_err());
        assert!(!registry.is_initialized("vi"));

        let image = ImageData::from_bytes(b"irrelevant");
        let err = registry.recognize("vi", &image).unwrap_err();
        assert!(err.starts_with("[ENGINE_ERR:SPAWN]"));
        assert!(registry.stats().initialized.is_empty());
    }

    #[cfg(unix)]
    mod fake_engine {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;
        use tempfile::TempDir;

        // 假引擎用例串行执行：写脚本期间若被其他线程 fork 继承写句柄，exec 会报 ETXTBSY
        static SERIAL: Mutex<()> = parking_lot::const_mutex(());

        fn reply(text: &str) -> String {
            format!(
                r#"{{"code":100,"data":[{{"box":[[0,0],[8,0],[8,8],[0,8]],"score":0.99,"text":"{}"}}]}}"#,
                text
            )
        }

        /// 在临时目录放置 `PaddleOCR-json` 脚本；每次启动向 spawns.log 追加一行
        fn install_engine(body: &str) -> (TempDir, OcrEngineOptions) {
            let dir = TempDir::new().unwrap();
            let script = dir.path().join("PaddleOCR-json");
            std::fs::write(
                &script,
                format!(
                    "#!/bin/sh\necho spawn >> spawns.log\necho 'OCR init completed.'\n{}\n",
                    body
                ),
            )
            .unwrap();
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

            let options = OcrEngineOptions {
                work_dir: Some(dir.path().to_path_buf()),
                timeout_secs: Some(2),
                ..Default::default()
            };
            (dir, options)
        }

        fn spawn_count(dir: &Path) -> usize {
            std::fs::read_to_string(dir.join("spawns.log"))
                .map(|log| log.lines().count())
                .unwrap_or(0)
        }

        fn page() -> ImageData {
            let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([255, 255, 255])));
            ImageData::from_image(&img).unwrap()
        }

        fn wait_for_exit(registry: &EngineRegistry, language: &str) {
            let engine = registry.engine(language).unwrap();
            let deadline = Instant::now() + Duration::from_secs(5);
            while engine.lock().process.try_wait().unwrap().is_none() {
                assert!(Instant::now() < deadline, "engine did not exit");
                std::thread::sleep(Duration::from_millis(20));
            }
        }

        #[test]
        fn concurrent_first_requests_spawn_one_engine() {
            let _serial = SERIAL.lock();
            let (dir, options) = install_engine(&format!(
                "while read -r line; do echo '{}'; done",
                reply("Hello")
            ));
            let registry = EngineRegistry::new([("en", options)]);
            let image = page();
            let (registry, image) = (&registry, &image);

            let results: Vec<Result<String, String>> = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..8)
                    .map(|_| scope.spawn(move || registry.recognize("en", image)))
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            for result in results {
                assert_eq!(result.unwrap(), "Hello");
            }
            assert_eq!(spawn_count(dir.path()), 1);
            assert_eq!(registry.stats().initialized, vec!["en"]);
        }

        #[test]
        fn exited_engine_is_respawned_before_next_use() {
            let _serial = SERIAL.lock();
            let (dir, options) =
                install_engine(&format!("read -r line\necho '{}'", reply("A")));
            let registry = EngineRegistry::new([("vi", options)]);
            let image = page();

            assert_eq!(registry.recognize("vi", &image).unwrap(), "A");
            wait_for_exit(&registry, "vi");

            assert_eq!(registry.recognize("vi", &image).unwrap(), "A");
            assert_eq!(spawn_count(dir.path()), 2);
        }

        #[test]
        fn silent_engine_times_out_and_is_restarted() {
            let _serial = SERIAL.lock();
            let (dir, mut options) = install_engine("while read -r line; do :; done");
            options.timeout_secs = Some(1);
            let registry = EngineRegistry::new([("en", options)]);

            let err = registry.recognize("en", &page()).unwrap_err();
            assert!(err.starts_with("[ENGINE_ERR:NO_RESPONSE]"), "{err}");
            assert!(error_requires_restart(&err));
            assert_eq!(spawn_count(dir.path()), 2);
        }

        #[test]
        fn engine_codes_restart_only_when_required() {
            let _serial = SERIAL.lock();
            let image = page();

            let (dir, options) = install_engine(
                r#"while read -r line; do echo '{"code":999,"data":"odd"}'; done"#,
            );
            let registry = EngineRegistry::new([("en", options)]);
            for _ in 0..2 {
                let err = registry.recognize("en", &image).unwrap_err();
                assert!(err.starts_with("[ENGINE_ERR:999]"), "{err}");
            }
            assert_eq!(spawn_count(dir.path()), 1);

            let (dir, options) = install_engine(
                r#"while read -r line; do echo '{"code":401,"data":"bad request"}'; done"#,
            );
            let registry = EngineRegistry::new([("en", options)]);
            let err = registry.recognize("en", &image).unwrap_err();
            assert!(err.starts_with("[ENGINE_ERR:401]"), "{err}");
            assert_eq!(spawn_count(dir.path()), 2);

            let (dir, options) = install_engine(
                r#"while read -r line; do echo '{"code":203,"data":"bad image"}'; done"#,
            );
            let registry = EngineRegistry::new([("en", options)]);
            let err = registry.recognize("en", &image).unwrap_err();
            assert!(err.starts_with("[DATA_ERR:203]"), "{err}");
            assert_eq!(spawn_count(dir.path()), 1);
        }
    }
}
