//! Notify Dispatch CLI
//!
//! 从命令行发送通知，或查看解析后的配置

use anyhow::Result;
use clap::{Parser, Subcommand};
use notify_dispatch::cli::{handle_config, handle_send, send_exit_status, ConfigArgs, SendArgs};
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "notify-dispatch")]
#[command(about = "Notify Dispatch - 限流、批量、超时保护的通知发送")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 发送一条通知
    Send(SendArgs),
    /// 打印解析后的配置（api key 脱敏）
    Config(ConfigArgs),
}

impl Commands {
    fn debug(&self) -> bool {
        match self {
            Commands::Send(args) => args.config.debug,
            Commands::Config(args) => args.debug,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // 通过 RUST_LOG 控制日志级别，--debug 时默认为 debug
    // 例如: RUST_LOG=notify_dispatch=trace notify-dispatch send "hello"
    let default_filter = if cli.command.debug() {
        "notify_dispatch=debug"
    } else {
        "notify_dispatch=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let status = match cli.command {
        Commands::Send(args) => {
            let response = handle_send(args).await?;
            if !response.success {
                warn!(error = ?response.error, "Notification was not delivered");
            }
            send_exit_status(&response)
        }
        Commands::Config(args) => {
            handle_config(args)?;
            0
        }
    };

    Ok(ExitCode::from(status))
}
