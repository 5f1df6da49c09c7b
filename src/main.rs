//! pm2 Telegram Notify CLI
//!
//! 读取 pm2 总线事件（逐行 JSON），缓冲、限流后转发到 Telegram

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pm2_telegram_notify::{
    read_events, Clock, Normalizer, NotificationMessage, Notifier, NotifyConfig, SendResult,
    SystemClock, TelegramChannel, TelegramConfig, NOTIFIER_NAME,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "pm2-telegram-notify")]
#[command(about = "pm2 Telegram Notify - 把 pm2 进程事件转发到 Telegram")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动转发（默认从 stdin 读取事件）
    Run {
        /// 配置文件路径
        #[arg(long, short)]
        config: Option<PathBuf>,
        /// 从文件读取事件而不是 stdin
        #[arg(long, short)]
        input: Option<PathBuf>,
    },
    /// 打印解析后的配置
    Config {
        /// 配置文件路径
        #[arg(long, short)]
        config: Option<PathBuf>,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 立即发送一条测试消息
    Test {
        /// 配置文件路径
        #[arg(long, short)]
        config: Option<PathBuf>,
        /// 消息内容
        #[arg(default_value = "Test message")]
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 通过 RUST_LOG 控制日志级别，默认 info
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pm2_telegram_notify=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, input } => {
            let settings = NotifyConfig::load(config.as_deref())?.resolve();
            if settings.telegram_url.is_none() {
                warn!("telegram_url is not set, notifications will be skipped until it is configured");
            }

            let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &input {
                Some(path) => {
                    let file = tokio::fs::File::open(path)
                        .await
                        .with_context(|| format!("Failed to open input {}", path.display()))?;
                    Box::new(BufReader::new(file))
                }
                None => Box::new(BufReader::new(tokio::io::stdin())),
            };

            run(settings, reader).await?;
        }
        Commands::Config { config, json } => {
            let settings = NotifyConfig::load(config.as_deref())?.resolve();
            if json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            } else {
                println!("telegram_url:    {}", settings.telegram_url.as_deref().unwrap_or("(not set)"));
                println!("chat_id:         {}", settings.chat_id);
                println!("buffer:          {}", settings.buffer);
                println!("buffer_seconds:  {}", settings.buffer_seconds);
                println!("queue_max:       {}", settings.queue_max);
                println!("log/error:       {}/{}", settings.log, settings.error);
                println!("kill/exception:  {}/{}", settings.kill, settings.exception);
                println!("timeout:         {}s", settings.timeout.as_secs());
                if !settings.event_toggles.is_empty() {
                    println!("events:          {}", settings.event_toggles.join(", "));
                }
            }
        }
        Commands::Test { config, message } => {
            let settings = NotifyConfig::load(config.as_deref())?.resolve();
            let channel = TelegramChannel::new(TelegramConfig::from_settings(&settings))?;
            let text = format!("{} - *test* - {}", NOTIFIER_NAME, message);

            match channel.send(&NotificationMessage::new(text, NOTIFIER_NAME, "test")).await {
                SendResult::Sent => println!("✅ 已发送"),
                SendResult::Skipped(reason) => println!("⏭️ 已跳过: {}", reason),
                SendResult::Failed(reason) => {
                    println!("❌ 发送失败: {}", reason);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

/// 启动事件源和投递泵，直到输入结束且队列清空，或收到 Ctrl-C
async fn run(
    settings: pm2_telegram_notify::Settings,
    reader: Box<dyn AsyncBufRead + Unpin + Send>,
) -> Result<()> {
    let grace = settings.timeout;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let channel = Arc::new(TelegramChannel::new(TelegramConfig::from_settings(&settings))?);
    let normalizer = Normalizer::new(settings.clone(), clock.clone());
    let notifier = Notifier::new(settings, channel, clock);

    let (tx, rx) = mpsc::unbounded_channel();

    let source = tokio::spawn(async move {
        match read_events(reader, &normalizer, tx).await {
            Ok(count) => info!(forwarded = count, "Event source finished"),
            Err(e) => error!(error = %e, "Event source failed"),
        }
    });

    info!("{} started", NOTIFIER_NAME);

    tokio::select! {
        _ = notifier.run(rx) => {
            // 等待最后一批发送完成
            tokio::time::sleep(grace).await;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }

    source.abort();
    Ok(())
}
