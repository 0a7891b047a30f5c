//! HTTP服务器设置模块
//! 负责监听、路由挂载与优雅关闭

use crate::api::routes;
use crate::util::config::Config;
use crate::AppState;
use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
use tracing::{info, warn};

/// HTTP服务器管理器
pub struct ServerManager;

impl ServerManager {
    /// 创建HTTP服务器
    pub async fn create_server(config: &Config, app_state: AppState) -> Result<HttpServer> {
        let listener = Self::bind_listener(&config.server.host, config.server.port).await?;
        let local_addr = listener.local_addr()?;

        info!(target: "server.http", event = "http.router.build");
        let app_routes = routes(app_state);

        info!(
            target: "server.http",
            event = "http.server.ready",
            address = %local_addr
        );

        Ok(HttpServer {
            listener,
            app_routes,
            local_addr,
        })
    }

    /// 绑定监听端口
    ///
    /// 通配地址优先尝试 IPv6 双栈 `[::]`，失败再降级为 IPv4 `0.0.0.0`。
    async fn bind_listener(host: &str, port: u16) -> Result<TcpListener> {
        info!(
            target: "server.http",
            event = "http.server.bind_start",
            host,
            port
        );

        if !matches!(host, "0.0.0.0" | "::" | "[::]") {
            let addr = if host.contains(':') && !host.starts_with('[') {
                format!("[{}]:{}", host, port)
            } else {
                format!("{}:{}", host, port)
            };
            let listener = TcpListener::bind(&addr)
                .await
                .map_err(|e| anyhow::anyhow!("地址 {} 绑定失败: {}", addr, e))?;
            info!(
                target: "server.http",
                event = "http.server.bound",
                address = %addr
            );
            return Ok(listener);
        }

        let v6_addr = format!("[::]:{}", port);
        match TcpListener::bind(&v6_addr).await {
            Ok(listener) => {
                info!(
                    target: "server.http",
                    event = "http.server.bound",
                    protocol = "ipv6",
                    address = %v6_addr
                );
                Ok(listener)
            }
            Err(e6) => {
                warn!("IPv6绑定失败: {}，尝试IPv4", e6);
                let v4_addr = format!("0.0.0.0:{}", port);
                let listener = TcpListener::bind(&v4_addr).await.map_err(|e4| {
                    anyhow::anyhow!(
                        "端口 {} 绑定失败 (IPv4): {}；之前IPv6错误: {}",
                        port,
                        e4,
                        e6
                    )
                })?;
                info!(
                    target: "server.http",
                    event = "http.server.bound",
                    protocol = "ipv4",
                    address = %v4_addr
                );
                Ok(listener)
            }
        }
    }

    /// 启动服务器
    pub async fn start_server(server: HttpServer) -> Result<()> {
        info!(
            target: "server.http",
            event = "http.server.start",
            address = %server.local_addr
        );

        axum::serve(server.listener, server.app_routes)
            .with_graceful_shutdown(Self::shutdown_signal())
            .await?;

        info!(target: "server.http", event = "http.server.stopped");
        Ok(())
    }

    /// 等待 SIGINT / SIGTERM / SIGHUP 任一信号
    async fn shutdown_signal() {
        tokio::select! {
            _ = ctrl_c() => {
                info!(target: "server.http", event = "http.server.signal", signal = "SIGINT");
            }
            _ = Self::wait_for_unix_signal(UnixSignal::Terminate) => {
                info!(target: "server.http", event = "http.server.signal", signal = "SIGTERM");
            }
            _ = Self::wait_for_unix_signal(UnixSignal::Hangup) => {
                warn!(
                    target: "server.http",
                    event = "http.server.signal",
                    signal = "SIGHUP",
                    "不支持配置重载，准备退出"
                );
            }
        }

        info!(target: "server.http", event = "http.server.shutdown_begin");
    }

    async fn wait_for_unix_signal(kind: UnixSignal) -> Result<(), Box<dyn std::error::Error>> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let kind = match kind {
                UnixSignal::Terminate => SignalKind::terminate(),
                UnixSignal::Hangup => SignalKind::hangup(),
            };
            let mut stream = signal(kind)?;
            stream.recv().await;
            Ok(())
        }
        #[cfg(not(unix))]
        {
            let _ = kind;
            std::future::pending::<()>().await;
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum UnixSignal {
    Terminate,
    Hangup,
}

/// HTTP服务器实例
pub struct HttpServer {
    listener: TcpListener,
    app_routes: Router,
    local_addr: std::net::SocketAddr,
}
