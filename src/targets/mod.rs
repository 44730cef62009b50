//! # 目标管理
//!
//! 通过浏览器的发现接口（`/json/*`）枚举、打开和关闭标签页，并提供已附加的页面句柄。
//!
//! ## 模块结构
//! - `registry`: 列出 / 解析 / 创建 / 关闭 / 附加
//! - `page`: [`Target`] 记录与已附加的 [`Page`] 句柄
//! - `url`: 为远程浏览器改写调试器 WebSocket 地址

pub mod registry;
pub mod page;
pub mod url;

pub use page::{Page, Target};
pub use registry::{BrowserVersion, TargetRegistry};
pub use url::rewrite_ws_url;
