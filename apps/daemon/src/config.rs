//! 守护进程配置
//!
//! TOML 配置文件，所有字段都有默认值；未给出配置文件时
//! 依次尝试 `--config` 参数和用户配置目录下的默认路径。

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 电机时序配置段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MotorSection {
    /// 单步间隔（微秒）
    pub step_interval_us: u64,
    /// 一个擦除行程的步数（单向）
    pub sweep_steps: u32,
    /// 行程端点静置时间（毫秒）
    pub settle_delay_ms: u64,
}

impl Default for MotorSection {
    fn default() -> Self {
        Self {
            step_interval_us: 1000,
            sweep_steps: 2000,
            settle_delay_ms: 500,
        }
    }
}

/// 上传退避配置段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackoffSection {
    /// 首次失败后的延迟（毫秒）
    pub base_ms: u64,
    /// 延迟上限（毫秒）
    pub max_ms: u64,
}

impl Default for BackoffSection {
    fn default() -> Self {
        Self {
            base_ms: 1000,
            max_ms: 300_000,
        }
    }
}

/// 守护进程配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// 设备 ID（决定消息主题命名空间 `eraser_{ID}`）
    pub device_id: u32,
    /// 上传队列目录（持久存储）
    pub queue_dir: PathBuf,
    /// 日志目录
    pub log_dir: PathBuf,
    /// mock 相机的工件输出目录
    pub capture_dir: PathBuf,
    /// 电机时序
    pub motor: MotorSection,
    /// 上传退避
    pub backoff: BackoffSection,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            device_id: 1,
            queue_dir: PathBuf::from("queue"),
            log_dir: PathBuf::from("logs"),
            capture_dir: PathBuf::from("captures"),
            motor: MotorSection::default(),
            backoff: BackoffSection::default(),
        }
    }
}

impl DaemonConfig {
    /// 加载配置
    ///
    /// 优先级：显式路径 > 用户配置目录下的 `eraser/config.toml` > 默认值。
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_file().filter(|p| p.exists()),
        };

        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// 电机配置（转换为子系统类型）
    pub fn motor_config(&self) -> eraser_motor::MotorConfig {
        eraser_motor::MotorConfig {
            step_interval: Duration::from_micros(self.motor.step_interval_us),
            sweep_steps: self.motor.sweep_steps,
            settle_delay: Duration::from_millis(self.motor.settle_delay_ms),
        }
    }

    /// 退避策略（转换为队列类型）
    pub fn backoff_policy(&self) -> eraser_queue::BackoffPolicy {
        eraser_queue::BackoffPolicy {
            base: Duration::from_millis(self.backoff.base_ms),
            max: Duration::from_millis(self.backoff.max_ms),
        }
    }
}

/// 用户配置目录下的默认配置文件路径
fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("eraser").join("config.toml"))
}
