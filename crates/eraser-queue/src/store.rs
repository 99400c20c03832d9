//! 持久日志存储
//!
//! 队列目录的磁盘布局：
//!
//! ```text
//! queue/
//!   queue.lock            进程独占锁（fs4，崩溃后自动释放）
//!   <id>.jpg              工件本体
//!   <id>.json             边车日志记录（入队时 fsync）
//! ```
//!
//! 写入纪律：记录先写入 `<id>.json.tmp` 并 `sync_all`，再原子
//! rename 到最终名，最后同步目录项。恢复扫描只认 `.json`，
//! 所以半写的临时文件不会被当成队列项。
//!
//! 投递成功的删除顺序是工件在前、记录在后：一条记录若找不到
//! 对应工件，说明投递已经确认过，恢复时直接丢弃该记录而不会
//! 重复投递。

use crate::QueueError;
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// 队列项的瞬时状态（不落盘）
///
/// `Uploading` 只存在于内存：崩溃时在途的尝试自然回到
/// `Pending`，这正是至少一次语义。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    /// 等待投递（或等待退避到期）
    Pending,
    /// 工作线程正在尝试投递
    Uploading,
}

/// 一个待上传的工件
#[derive(Debug, Clone)]
pub struct QueueItem {
    /// 稳定 ID（也是工件/记录的文件名主干）
    pub id: String,
    /// 工件文件路径
    pub artifact_path: PathBuf,
    /// 随工件入队的元数据（会话 ID 等）
    pub metadata: serde_json::Value,
    /// 已失败的尝试次数（跨重启保留）
    pub attempts: u32,
    /// 下次允许尝试的时刻
    pub next_attempt_at: Instant,
    /// 瞬时状态
    pub status: ItemStatus,
    /// 入队时刻（unix 毫秒，决定排空顺序）
    pub created_at_ms: u64,
}

/// 落盘的日志记录
#[derive(Debug, Serialize, Deserialize)]
struct JournalRecord {
    id: String,
    artifact: String,
    created_at_ms: u64,
    attempts: u32,
    metadata: serde_json::Value,
}

static NEXT_ITEM_SEQ: AtomicU64 = AtomicU64::new(1);

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// 持久日志存储
#[derive(Debug)]
pub struct JournalStore {
    dir: PathBuf,
    /// 目录独占锁；File 关闭时由操作系统自动释放
    _lock: File,
}

impl JournalStore {
    /// 打开（必要时创建）队列目录，取得独占锁并扫描恢复队列项
    pub fn open(dir: impl AsRef<Path>) -> Result<(Self, Vec<QueueItem>), QueueError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let lock_path = dir.join("queue.lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)?;
        if !lock.try_lock_exclusive()? {
            return Err(QueueError::DirectoryLocked);
        }

        let store = Self { dir, _lock: lock };
        let recovered = store.scan()?;
        if !recovered.is_empty() {
            info!(
                count = recovered.len(),
                "Recovered undelivered items from queue directory"
            );
        }
        Ok((store, recovered))
    }

    /// 队列目录路径
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 分配新的队列项 ID
    pub fn next_id(&self) -> String {
        let seq = NEXT_ITEM_SEQ.fetch_add(1, Ordering::Relaxed);
        format!("whiteboard_{}_{:04}", unix_millis(), seq)
    }

    /// 把工件移入队列目录并落盘日志记录
    ///
    /// 返回时记录已 fsync：此后任何时刻崩溃，该项都能被恢复扫描
    /// 重建。任何一步磁盘失败都会以 `QueueError::Persistence` 上浮。
    pub fn append(
        &self,
        id: &str,
        source: &Path,
        metadata: serde_json::Value,
    ) -> Result<QueueItem, QueueError> {
        let extension = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg")
            .to_string();
        let artifact_name = format!("{id}.{extension}");
        let artifact_path = self.dir.join(&artifact_name);

        // 工件先进目录：rename 优先，跨文件系统时退回 copy
        if fs::rename(source, &artifact_path).is_err() {
            fs::copy(source, &artifact_path)?;
            let _ = fs::remove_file(source);
        }
        File::open(&artifact_path)?.sync_all()?;

        let created_at_ms = unix_millis();
        let record = JournalRecord {
            id: id.to_string(),
            artifact: artifact_name,
            created_at_ms,
            attempts: 0,
            metadata: metadata.clone(),
        };
        self.write_record(&record)?;
        self.sync_dir()?;

        debug!(id, "Journal record durable, item enqueued");
        Ok(QueueItem {
            id: id.to_string(),
            artifact_path,
            metadata,
            attempts: 0,
            next_attempt_at: Instant::now(),
            status: ItemStatus::Pending,
            created_at_ms,
        })
    }

    /// 把某项的失败次数写回日志（跨重启保留退避历史）
    ///
    /// 这里的失败不破坏恢复保证（记录仍在），所以只大声记日志，
    /// 不向上冒泡成致命错误。
    pub fn persist_attempts(&self, item: &QueueItem) {
        let record = JournalRecord {
            id: item.id.clone(),
            artifact: artifact_name_of(&item.artifact_path),
            created_at_ms: item.created_at_ms,
            attempts: item.attempts,
            metadata: item.metadata.clone(),
        };
        if let Err(e) = self.write_record(&record) {
            warn!(id = %item.id, "Failed to persist attempt count: {}", e);
        }
    }

    /// 投递确认后删除工件和记录（顺序：工件在前）
    pub fn remove(&self, item: &QueueItem) -> Result<(), QueueError> {
        if item.artifact_path.exists() {
            fs::remove_file(&item.artifact_path)?;
        }
        let record_path = self.record_path(&item.id);
        if record_path.exists() {
            fs::remove_file(&record_path)?;
        }
        self.sync_dir()?;
        debug!(id = %item.id, "Delivered item removed from durable store");
        Ok(())
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn write_record(&self, record: &JournalRecord) -> Result<(), QueueError> {
        let final_path = self.record_path(&record.id);
        let tmp_path = self.dir.join(format!("{}.json.tmp", record.id));

        let payload = serde_json::to_vec_pretty(record)
            .map_err(|e| QueueError::Persistence(std::io::Error::other(e)))?;
        let mut file = File::create(&tmp_path)?;
        file.write_all(&payload)?;
        file.sync_all()?;
        fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    /// 同步目录项（rename/unlink 之后）
    fn sync_dir(&self) -> Result<(), QueueError> {
        #[cfg(unix)]
        File::open(&self.dir)?.sync_all()?;
        Ok(())
    }

    /// 恢复扫描：每条记录重建为 Pending，attempts 原样保留
    fn scan(&self) -> Result<Vec<QueueItem>, QueueError> {
        let mut items = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some("json") => {},
                // 半写的临时记录：入队从未返回成功，清掉
                Some("tmp") => {
                    warn!(?path, "Removing stale temporary record");
                    let _ = fs::remove_file(&path);
                    continue;
                },
                _ => continue,
            }

            let record: JournalRecord = match fs::read_to_string(&path)
                .map_err(QueueError::from)
                .and_then(|s| {
                    serde_json::from_str(&s)
                        .map_err(|e| QueueError::Persistence(std::io::Error::other(e)))
                }) {
                Ok(record) => record,
                Err(e) => {
                    // 留下文件供人工检查，不让一条坏记录阻止其余恢复
                    warn!(?path, "Skipping unreadable journal record: {}", e);
                    continue;
                },
            };

            let artifact_path = self.dir.join(&record.artifact);
            if !artifact_path.exists() {
                // 工件已删、记录未删：投递已确认过，丢弃记录避免重复投递
                warn!(id = %record.id, "Record without artifact, delivery was already confirmed");
                let _ = fs::remove_file(&path);
                continue;
            }

            items.push(QueueItem {
                id: record.id,
                artifact_path,
                metadata: record.metadata,
                attempts: record.attempts,
                next_attempt_at: Instant::now(),
                status: ItemStatus::Pending,
                created_at_ms: record.created_at_ms,
            });
        }

        // 最老优先
        items.sort_by_key(|item| (item.created_at_ms, item.id.clone()));
        Ok(items)
    }
}

fn artifact_name_of(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}
