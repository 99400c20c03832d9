//! # Eraser Daemon
//!
//! 白板擦除器设备服务主入口
//!
//! 启动顺序（与关停严格相反）：
//!
//! 1. 加载配置、初始化日志（控制台 + 每日轮转文件）
//! 2. 打开上传队列（恢复扫描 + 目录独占锁）并启动上传工作线程
//! 3. 构建电机控制器和调度器（协作者注入：本二进制内置 mock
//!    硬件——真实 GPIO 驱动、相机和对象存储客户端是外部集成）
//! 4. 启动终端输入线程，注册 Ctrl+C 优雅关停
//! 5. 主线程守护健康状态：持久队列写入失败破坏崩溃恢复保证，
//!    此时快速失败退出，交给外部重启

mod config;
mod terminal;

use anyhow::{Context, Result};
use clap::Parser;
use config::DaemonConfig;
use eraser_dispatch::{Dispatcher, MockCamera, StatusPublisher};
use eraser_motor::{MockMotorAdapter, MotorController};
use eraser_protocol::{CommandResponse, StatusSnapshot, Topics};
use eraser_queue::{MockUploader, UploadQueue};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// 白板擦除器设备服务
#[derive(Parser, Debug)]
#[command(name = "eraser-daemon")]
#[command(about = "Smart whiteboard eraser device service", long_about = None)]
struct Args {
    /// 配置文件路径
    ///
    /// 默认: 用户配置目录下的 eraser/config.toml（不存在则用内置默认值）
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// 日志目录覆盖
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// 队列目录覆盖
    #[arg(long)]
    queue_dir: Option<PathBuf>,
}

/// 控制台发布器
///
/// broker 客户端是外部协作者；这里把每次发布连同目标主题一起
/// 写进日志，保持 fire-and-forget 纪律。
struct ConsolePublisher {
    topics: Topics,
}

impl StatusPublisher for ConsolePublisher {
    fn publish_status(&self, snapshot: &StatusSnapshot) {
        debug!(topic = %self.topics.status, state = %snapshot.device_state, "publish status");
    }

    fn publish_response(&self, response: &CommandResponse) {
        match serde_json_compact(response) {
            Some(payload) => info!(topic = %self.topics.response, %payload, "publish response"),
            None => info!(topic = %self.topics.response, correlation_id = %response.correlation_id, "publish response"),
        }
    }

    fn publish_session(&self, active: bool) {
        info!(topic = %self.topics.session, active, "publish session");
    }
}

fn serde_json_compact(response: &CommandResponse) -> Option<String> {
    serde_json::to_string(response).ok()
}

/// 初始化日志：控制台 + 每日轮转文件（非阻塞）
///
/// 返回的 guard 必须在 main 存活期间持有，否则文件日志会丢尾。
fn init_logging(log_dir: &std::path::Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "eraser-daemon.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();
    Ok(guard)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = DaemonConfig::load(args.config.as_deref())?;
    if let Some(log_dir) = args.log_dir {
        config.log_dir = log_dir;
    }
    if let Some(queue_dir) = args.queue_dir {
        config.queue_dir = queue_dir;
    }

    let _log_guard = init_logging(&config.log_dir)?;
    info!(device_id = config.device_id, "Initializing whiteboard eraser service");

    // 上传队列：打开即恢复（接手上次运行中没传完的图片）
    let queue = Arc::new(
        UploadQueue::open(&config.queue_dir, config.backoff_policy())
            .context("failed to open upload queue")?,
    );
    queue.start(Box::new(MockUploader::new()));

    // 电机控制器（mock 适配器；真实 GPIO 驱动由集成方注入）
    let motor = Arc::new(MotorController::new(
        Box::new(MockMotorAdapter::new()),
        config.motor_config(),
    ));

    // 调度器
    let topics = Topics::for_device(config.device_id);
    let dispatcher = Arc::new(
        Dispatcher::builder(
            motor,
            queue.clone(),
            Box::new(MockCamera::new(&config.capture_dir)),
        )
        .publisher(Box::new(ConsolePublisher { topics }))
        .build(),
    );

    // Ctrl+C 优雅关停
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nReceived interrupt signal. Shutting down...");
            running.store(false, Ordering::Release);
        })
        .context("failed to set signal handler")?;
    }

    // 终端输入线程
    let _terminal = terminal::spawn(dispatcher.clone(), running.clone());

    info!("Whiteboard eraser service started. Press Ctrl+C to stop.");
    while running.load(Ordering::Acquire) {
        if !dispatcher.is_healthy() {
            // 持久存储已不可信：快速失败，依赖外部重启
            error!("Durable queue failure detected, exiting for supervised restart");
            process::exit(1);
        }
        std::thread::sleep(Duration::from_secs(1));
    }

    info!("Stopping whiteboard eraser service");
    dispatcher.shutdown();
    queue.stop();
    info!("All services stopped");
    Ok(())
}
