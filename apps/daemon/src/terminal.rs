//! 终端输入适配器
//!
//! 专用输入线程阻塞在行读取上，把单字母命令归一化为 `Command`
//! 后立即提交（提交永不阻塞，长操作由调度器工作线程执行）。

use eraser_dispatch::{inputs, Dispatcher, SubmitResult};
use eraser_protocol::{Command, CommandSource};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::info;

/// 打印命令菜单
fn print_menu() {
    println!("\nCommand options:");
    println!("  c - Capture image");
    println!("  e - Erase whiteboard");
    println!("  b - Capture image and erase whiteboard");
    println!("  m - Pause/Resume motor");
    println!("  r - Reset motor to original position");
    println!("  s - Stop operations");
    println!("  i - Show system information");
    println!("  n - Toggle session (start/stop)");
    println!("  l - Reload schedules");
    println!("  j - Show scheduler status");
    println!("  q - Quit");
}

/// 启动终端输入线程
pub fn spawn(dispatcher: Arc<Dispatcher>, running: Arc<AtomicBool>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        print_menu();
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if !running.load(Ordering::Acquire) {
                break;
            }

            let Some(key) = line.trim().chars().next() else {
                continue;
            };
            if key.eq_ignore_ascii_case(&'q') {
                println!("Shutting down...");
                running.store(false, Ordering::Release);
                break;
            }

            let Some(kind) = inputs::map_terminal_key(key) else {
                println!("Unknown command: {line}");
                continue;
            };

            let command = Command::new(CommandSource::Terminal, kind);
            match dispatcher.submit(command) {
                SubmitResult::Completed(outcome) => println!("=> {outcome:?}"),
                SubmitResult::Accepted => println!("=> accepted, result will follow"),
            }
        }
        info!("Terminal input thread exiting");
    })
}
