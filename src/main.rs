//! # Chaser-Capture 命令行入口
//!
//! 连接以 `--remote-debugging-port` 启动的浏览器，列出其标签页；
//! 若给出 URL，则在第一个标签页中导航到该地址并捕获页面状态。
//!
//! ```text
//! chaser-capture [--config FILE] [--keep] [URL]
//! ```
//!
//! ## 环境变量
//! - `CDP_HOST` / `CDP_PORT`: 调试端点（默认 127.0.0.1:9222）
//! - `CHASER_CONFIG`: TOML 配置文件路径
//! - `CHASER_CAPTURE_DIR`: 会话目录的父目录
//! - `RUST_LOG` / `CHASER_LOG_LEVEL`: 日志过滤

use chaser_capture::{
    actions::ActionExecutor,
    capture::{spawn_signal_cleanup, CaptureArtifactWriter, CaptureSession, SessionGuard},
    config::Config,
    targets::TargetRegistry,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "chaser-capture", version, about, long_about = None)]
struct Args {
    /// TOML configuration file; environment variables are used otherwise
    #[arg(short, long, env = "CHASER_CONFIG")]
    config: Option<PathBuf>,

    /// Leave the capture directory on disk after exit
    #[arg(long)]
    keep: bool,

    /// Navigate the first tab here and capture the result
    url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Chaser-Capture v{}", chaser_capture::VERSION);

    let session = Arc::new(CaptureSession::new(config.capture_base_dir()));
    let root = session.initialize()?;

    // --keep leaves the archive on disk for inspection
    let _guard = if args.keep {
        None
    } else {
        spawn_signal_cleanup(Arc::clone(&session));
        Some(SessionGuard::new(Arc::clone(&session)))
    };

    let registry = TargetRegistry::new(&config)?;

    match registry.version().await {
        Ok(version) => info!("Connected to {} (protocol {})", version.product, version.protocol_version),
        Err(e) => warn!("Browser version unavailable: {}", e),
    }

    let targets = registry.list().await?;
    for (index, target) in targets.iter().enumerate() {
        println!("[{}] {} {}", index, target.title, target.url);
    }

    if let Some(url) = &args.url {
        let page = if targets.is_empty() {
            let target = registry.create(None).await?;
            registry.attach_target(target).await?
        } else {
            registry.attach(0).await?
        };

        let executor = ActionExecutor::new(CaptureArtifactWriter::new(Arc::clone(&session)))
            .with_navigation_timeout(config.navigation_timeout());

        let outcome = executor.navigate_with_capture(&page, url).await?;
        print!("{}", outcome);

        if args.keep {
            println!("Captures kept in {}", root.display());
        }
    }

    registry.shutdown().await;
    Ok(())
}
