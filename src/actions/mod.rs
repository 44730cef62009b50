//! # 页面动作
//!
//! 交互原语、附带捕获的变体以及带超时的等待。
//!
//! ## 模块结构
//! - `executor`: 导航 / 点击 / 填写 / 选择 / 执行脚本
//! - `selector`: CSS 与 XPath 选择器解析及元素脚本
//! - `outcome`: 带标签的结果与捕获记录
//! - `wait`: 元素与文本轮询

pub mod executor;
pub mod outcome;
pub mod selector;
pub mod wait;

pub use executor::ActionExecutor;
pub use outcome::{ActionOutcome, ActionResult, NavigationOutcome};
pub use selector::{Selector, SelectorKind};
pub use wait::WaitEngine;
