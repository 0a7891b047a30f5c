use std::io::Write;

use pdf_ocr_server::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s
        } else {
            "Unknown panic payload"
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "Unknown location".to_string());

        eprintln!("[PANIC] 程序异常");
        eprintln!("位置: {}", location);
        eprintln!("原因: {}", message);
        eprintln!("时间: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));

        tracing::error!(event = "panic.raised", location = %location, reason = %message);

        std::io::stderr().flush().ok();
    }));

    let mut args = std::env::args();
    let _ = args.next();

    match args.next().as_deref() {
        Some("health-check") | Some("--health-check") => {
            let report = server::check_system_health().await?;
            println!(
                "健康检查: overall={}, config_valid={}, staging={} (writable={}), engine={} (present={})",
                report.overall_healthy,
                report.config_valid,
                report.staging_dir.display(),
                report.staging_writable,
                report.engine_binary.display(),
                report.engine_present
            );
            if let Some(log_health) = &report.log_health {
                println!("日志目录: {}", log_health);
            }
            for warning in &report.validation_warnings {
                println!("[warn] {}", warning);
            }
            if !report.overall_healthy {
                std::process::exit(1);
            }
            Ok(())
        }
        _ => server::start_server().await,
    }
}
