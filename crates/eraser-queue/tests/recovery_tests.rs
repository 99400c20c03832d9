//! 崩溃恢复集成测试
//!
//! 模拟"入队后进程被杀"和"投递确认后重启"两条路径，
//! 验证不丢失、不重复投递。

use eraser_queue::{BackoffPolicy, MockUploader, UploadQueue};
use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

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
fn item_survives_process_death_before_delivery() {
    let tmp = tempfile::tempdir().unwrap();
    let queue_dir = tmp.path().join("queue");

    // 第一次运行：入队成功但从未启动工作线程（相当于随后断电）
    let id = {
        let queue = UploadQueue::open(&queue_dir, BackoffPolicy::default()).unwrap();
        let source = artifact_in(tmp.path(), "survivor.jpg");
        queue.enqueue(&source, serde_json::json!({"session": "s1"})).unwrap()
    };

    // 第二次运行：恢复扫描把它重建为 pending 并完成投递
    let queue = UploadQueue::open(&queue_dir, BackoffPolicy::default()).unwrap();
    assert_eq!(queue.depth(), 1);

    let uploader = MockUploader::new();
    let delivered = uploader.delivered_log();
    queue.start(Box::new(uploader));

    assert!(wait_until(Duration::from_secs(5), || queue.depth() == 0));
    assert_eq!(*delivered.lock().unwrap(), vec![id]);
    queue.stop();
}

#[test]
fn delivered_item_never_reappears_after_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let queue_dir = tmp.path().join("queue");

    {
        let queue = UploadQueue::open(&queue_dir, BackoffPolicy::default()).unwrap();
        let uploader = MockUploader::new();
        let delivered = uploader.delivered_log();
        queue.start(Box::new(uploader));

        let source = artifact_in(tmp.path(), "delivered.jpg");
        queue.enqueue(&source, serde_json::Value::Null).unwrap();
        assert!(wait_until(Duration::from_secs(5), || queue.depth() == 0));
        assert_eq!(delivered.lock().unwrap().len(), 1);
        queue.stop();
    }

    // 重启后队列为空：已确认的投递不会再次出现
    let queue = UploadQueue::open(&queue_dir, BackoffPolicy::default()).unwrap();
    assert_eq!(queue.depth(), 0);
}

#[test]
fn recovered_item_keeps_its_attempt_history() {
    let tmp = tempfile::tempdir().unwrap();
    let queue_dir = tmp.path().join("queue");
    let backoff = BackoffPolicy {
        base: Duration::from_millis(10),
        max: Duration::from_millis(20),
    };

    {
        let queue = UploadQueue::open(&queue_dir, backoff).unwrap();
        // 一直失败的上传器：积累尝试次数
        let uploader = MockUploader::failing_first(u32::MAX);
        queue.start(Box::new(uploader));

        let source = artifact_in(tmp.path(), "stubborn.jpg");
        queue.enqueue(&source, serde_json::Value::Null).unwrap();
        std::thread::sleep(Duration::from_millis(200));
        queue.stop();
        assert_eq!(queue.depth(), 1);
    }

    // 重启：项仍在，且带着之前的失败历史立即可重试
    let queue = UploadQueue::open(&queue_dir, backoff).unwrap();
    assert_eq!(queue.depth(), 1);

    let uploader = MockUploader::new();
    let delivered = uploader.delivered_log();
    queue.start(Box::new(uploader));
    assert!(wait_until(Duration::from_secs(5), || queue.depth() == 0));
    assert_eq!(delivered.lock().unwrap().len(), 1);
    queue.stop();
}
