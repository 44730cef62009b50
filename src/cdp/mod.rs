//! # Chrome DevTools Protocol (CDP) 层
//!
//! 与单个浏览器目标之间的 WebSocket JSON-RPC 控制通道。
//!
//! ## 主要功能
//! - **命令关联**: 分配命令 id、匹配响应、按截止时间清理未完成命令
//! - **事件路由**: 按到达顺序处理 Page/Runtime 事件，维护控制台日志与加载等待
//! - **类型化操作**: 导航、脚本执行、截图、按键
//!
//! ## 模块结构
//! - `types`: 线上帧与脚本执行结果类型
//! - `traits`: [`CdpConnection`] 抽象
//! - `correlator`: 命令 id 与响应匹配
//! - `connection`: 基于 tokio-tungstenite 的传输实现
//! - `events`: 事件路由、控制台日志、加载等待
//! - `client`: CDP 客户端实现
//! - `mock`: 用于测试的 Mock 实现
//!
//! ```rust,no_run
//! use chaser_capture::cdp::{CdpClient, CdpConnection, CdpTimeoutConfig, CdpWebSocketConnection};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connection = CdpWebSocketConnection::new(
//!     "ws://127.0.0.1:9222/devtools/page/ABC",
//!     CdpTimeoutConfig::default(),
//! )
//! .await?;
//! let client = CdpClient::new(connection as Arc<dyn CdpConnection>);
//! let title = client.evaluate("document.title", false).await?;
//! println!("Title: {}", title);
//! # Ok(())
//! # }
//! ```

pub mod traits;
pub mod types;
pub mod correlator;
pub mod connection;
pub mod events;
pub mod client;
pub mod mock;

pub use traits::{CdpConnection, CdpError, CdpEvent, CdpResponse};

pub use client::{CdpClient, EvaluationResult};
pub use connection::{CdpTimeoutConfig, CdpWebSocketConnection};
pub use correlator::CommandCorrelator;
pub use events::{ConsoleLog, ConsoleMessage, EventRouter, LoadWaiter};

pub use mock::MockCdpConnection;
