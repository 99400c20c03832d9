//! 上传队列本体
//!
//! 生产者（调度器线程）入队，独立的工作线程排空。持久存储是
//! 两者之间唯一的共享资源，所有变更都经过同一把状态锁；工件
//! 选取在锁内完成并标记 `Uploading`，因此即使配置多个工作线程
//! 也不会有两个线程选中同一项。
//!
//! 工作线程反复选取"最老的、退避已到期的 Pending 项"尝试投递：
//! 成功则删除本地工件并移除记录；失败则递增 `attempts`、按指数
//! 退避推迟下次尝试，项永远不会因失败而被丢弃。没有可投递项时
//! 线程在 Condvar 上睡到最近的到期时刻或新项入队。

use crate::backoff::BackoffPolicy;
use crate::store::{ItemStatus, JournalStore, QueueItem};
use crate::uploader::Uploader;
use crate::QueueError;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// 空闲时的最大睡眠；保证停止请求能及时被观察到
const IDLE_WAIT: Duration = Duration::from_millis(500);

struct Shared {
    store: JournalStore,
    items: Mutex<Vec<QueueItem>>,
    wakeup: Condvar,
    running: AtomicBool,
    backoff: BackoffPolicy,
}

/// 持久上传队列
pub struct UploadQueue {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl UploadQueue {
    /// 打开队列目录并恢复未投递项（见 `JournalStore::open`）
    pub fn open(dir: impl AsRef<Path>, backoff: BackoffPolicy) -> Result<Self, QueueError> {
        let (store, recovered) = JournalStore::open(dir)?;
        Ok(Self {
            shared: Arc::new(Shared {
                store,
                items: Mutex::new(recovered),
                wakeup: Condvar::new(),
                running: AtomicBool::new(false),
                backoff,
            }),
            worker: Mutex::new(None),
        })
    }

    /// 启动工作线程
    pub fn start(&self, uploader: Box<dyn Uploader>) {
        let mut worker = self.worker.lock().unwrap_or_else(|e| e.into_inner());
        if worker.is_some() {
            warn!("Upload worker already running");
            return;
        }
        self.shared.running.store(true, Ordering::Release);
        let shared = self.shared.clone();
        *worker = Some(std::thread::spawn(move || worker_loop(shared, uploader)));
        info!("Upload worker started");
    }

    /// 入队一个已拍摄的工件
    ///
    /// 返回成功即表示记录已 fsync 落盘；持久存储失败原样上浮
    /// （调用方必须把它当作大事故处理，而不是静默重试）。
    pub fn enqueue(
        &self,
        source: &Path,
        metadata: serde_json::Value,
    ) -> Result<String, QueueError> {
        let id = self.shared.store.next_id();
        let item = self.shared.store.append(&id, source, metadata)?;

        let mut items = self
            .shared
            .items
            .lock()
            .map_err(|_| QueueError::PoisonedLock)?;
        items.push(item);
        drop(items);
        self.shared.wakeup.notify_one();

        info!(id, "Image enqueued for upload");
        Ok(id)
    }

    /// 未投递项数量
    pub fn depth(&self) -> usize {
        self.shared
            .items
            .lock()
            .map(|items| items.len())
            .unwrap_or(0)
    }

    /// 停止工作线程并等待它退出
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.wakeup.notify_all();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Upload worker panicked");
            } else {
                info!("Upload worker stopped");
            }
        }
    }
}

impl Drop for UploadQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 工作线程主循环
fn worker_loop(shared: Arc<Shared>, mut uploader: Box<dyn Uploader>) {
    while shared.running.load(Ordering::Acquire) {
        let Some(item) = select_or_wait(&shared) else {
            continue;
        };

        // 在途尝试不被取消：要么完成，要么由协作者报告失败
        match uploader.upload(&item) {
            Ok(confirmation) => {
                info!(
                    id = %item.id,
                    url = confirmation.remote_url.as_deref().unwrap_or("-"),
                    "Upload confirmed"
                );
                if let Err(e) = shared.store.remove(&item) {
                    // 工件可能残留，但记录与内存项的一致性必须保住
                    error!(id = %item.id, "Failed to clear delivered item from store: {}", e);
                }
                let mut items = shared.items.lock().unwrap_or_else(|e| e.into_inner());
                items.retain(|i| i.id != item.id);
            },
            Err(e) => {
                let mut items = shared.items.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(entry) = items.iter_mut().find(|i| i.id == item.id) {
                    entry.attempts += 1;
                    let delay = shared.backoff.delay(entry.attempts);
                    entry.next_attempt_at = Instant::now() + delay;
                    entry.status = ItemStatus::Pending;
                    warn!(
                        id = %entry.id,
                        attempts = entry.attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        "Upload failed, will retry: {}",
                        e
                    );
                    shared.store.persist_attempts(entry);
                }
            },
        }
    }
}

/// 在状态锁内选取最老的到期项并标记 Uploading；
/// 没有可投递项时睡到最近到期时刻或被入队唤醒。
fn select_or_wait(shared: &Shared) -> Option<QueueItem> {
    let mut items = shared.items.lock().unwrap_or_else(|e| e.into_inner());
    let now = Instant::now();

    let eligible = items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.status == ItemStatus::Pending && item.next_attempt_at <= now)
        .min_by_key(|(_, item)| (item.created_at_ms, item.id.clone()))
        .map(|(index, _)| index);

    if let Some(index) = eligible {
        items[index].status = ItemStatus::Uploading;
        return Some(items[index].clone());
    }

    let timeout = items
        .iter()
        .filter(|item| item.status == ItemStatus::Pending)
        .map(|item| item.next_attempt_at.saturating_duration_since(now))
        .min()
        .unwrap_or(IDLE_WAIT)
        .min(IDLE_WAIT);
    let (_items, _timed_out) = shared
        .wakeup
        .wait_timeout(items, timeout)
        .unwrap_or_else(|e| e.into_inner());
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uploader::MockUploader;
    use std::fs::File;
    use std::io::Write as _;
    use std::path::PathBuf;

    fn artifact_in(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(b"jpeg-bytes").unwrap();
        path
    }

    fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_enqueue_then_deliver() {
        let tmp = tempfile::tempdir().unwrap();
        let queue = UploadQueue::open(tmp.path().join("queue"), BackoffPolicy::default()).unwrap();

        let uploader = MockUploader::new();
        let delivered = uploader.delivered_log();
        queue.start(Box::new(uploader));

        let source = artifact_in(tmp.path(), "shot.jpg");
        let id = queue.enqueue(&source, serde_json::Value::Null).unwrap();

        assert!(wait_until(Duration::from_secs(5), || queue.depth() == 0));
        assert_eq!(*delivered.lock().unwrap(), vec![id]);
        queue.stop();
    }

    #[test]
    fn test_failures_back_off_and_never_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let backoff = BackoffPolicy {
            base: Duration::from_millis(10),
            max: Duration::from_millis(40),
        };
        let queue = UploadQueue::open(tmp.path().join("queue"), backoff).unwrap();

        let uploader = MockUploader::failing_first(3);
        let delivered = uploader.delivered_log();
        queue.start(Box::new(uploader));

        let source = artifact_in(tmp.path(), "shot.jpg");
        let id = queue.enqueue(&source, serde_json::Value::Null).unwrap();

        // 三次失败都不会丢项，第四次尝试成功
        assert!(wait_until(Duration::from_secs(5), || queue.depth() == 0));
        assert_eq!(*delivered.lock().unwrap(), vec![id]);
        queue.stop();
    }

    #[test]
    fn test_oldest_eligible_first() {
        let tmp = tempfile::tempdir().unwrap();
        let queue = UploadQueue::open(tmp.path().join("queue"), BackoffPolicy::default()).unwrap();

        let first = queue
            .enqueue(&artifact_in(tmp.path(), "a.jpg"), serde_json::Value::Null)
            .unwrap();
        let second = queue
            .enqueue(&artifact_in(tmp.path(), "b.jpg"), serde_json::Value::Null)
            .unwrap();

        let uploader = MockUploader::new();
        let delivered = uploader.delivered_log();
        queue.start(Box::new(uploader));

        assert!(wait_until(Duration::from_secs(5), || queue.depth() == 0));
        assert_eq!(*delivered.lock().unwrap(), vec![first, second]);
        queue.stop();
    }
}
