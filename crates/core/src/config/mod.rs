//! 配置管理
//!
//! 基于 `config` crate 的分层加载：默认值、TOML 配置文件、`PINGER_` 前缀的环境变量。
//! 每个配置段提供 `validate()`，加载完成后统一校验。

pub mod models;

pub use models::*;
