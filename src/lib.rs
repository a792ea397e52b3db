//! Notify Dispatch - 客户端通知分发：限流、批量、超时保护的 HTTP 投递

pub mod cli;
pub mod notification;

pub use notification::{
    ConfigOverrides, EnvScope, NotificationOptions, NotificationResponse, Notifier,
    NotifierConfig, Priority,
};
