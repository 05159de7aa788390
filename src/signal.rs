use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use libc::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use tracing::warn;

use crate::monitor::Monitor;

/// SIGINT / SIGTERM を受けたらモニタをキャンセルするスレッド
pub struct SignalWatcher {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
    interrupted: Arc<AtomicBool>,
}

impl SignalWatcher {
    pub fn spawn(monitor: Arc<Monitor>) -> io::Result<Self> {
        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let handle = signals.handle();
        let interrupted = Arc::new(AtomicBool::new(false));

        let flag = interrupted.clone();
        let thread = thread::Builder::new()
            .name("signal-watcher".to_string())
            .spawn(move || {
                // handle.close() されるとイテレータが終わる
                for sig in signals.forever() {
                    warn!(signal = sig, "interrupted, sending the philosophers away");
                    flag.store(true, Ordering::SeqCst);
                    monitor.cancel();
                }
            })?;

        Ok(SignalWatcher {
            handle,
            thread: Some(thread),
            interrupted,
        })
    }

    pub fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// 監視をやめ、それまでにシグナルを受けたかを返す
    pub fn stop(mut self) -> bool {
        self.shutdown();
        self.interrupted()
    }

    fn shutdown(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("signal watcher panicked");
            }
        }
    }
}

impl Drop for SignalWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
