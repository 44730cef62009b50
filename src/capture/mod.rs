//! # 动作捕获
//!
//! 每次页面交互之后，按编号保存页面状态快照。
//!
//! ## 主要功能
//! - **会话目录**: 目录生命周期与前缀计数器
//! - **并发写入**: HTML、Markdown、截图、控制台日志四个文件
//! - **DOM 摘要**: 有长度上限的页面结构概览
//!
//! ## 模块结构
//! - `session`: 会话目录与前缀分配
//! - `writer`: 并发获取并写入产物
//! - `summary`: DOM 摘要
//! - `record`: 捕获结果及各阶段的独立失败
//! - `scripts`: 页面端提取脚本

pub mod record;
pub mod scripts;
pub mod session;
pub mod summary;
pub mod writer;

pub use record::{CaptureError, CaptureRecord, CaptureStage, PageDimensions};
pub use session::{sanitize_label, spawn_signal_cleanup, CapturePrefix, CaptureSession, SessionGuard};
pub use summary::{DomSummarizer, DomSummary};
pub use writer::CaptureArtifactWriter;
