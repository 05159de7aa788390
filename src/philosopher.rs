use std::{sync::Arc, thread, time::Duration};

use rand::Rng;
use tracing::{debug, info};

use crate::monitor::{Monitor, MonitorError};

/// 考える・食べる・話す時間の上限。実際の時間は 0 から上限までの乱数
#[derive(Debug, Clone, Copy)]
pub struct Pause {
    max: Duration,
}

impl Pause {
    pub fn new(max: Duration) -> Self {
        Pause { max }
    }

    pub fn none() -> Self {
        Pause::new(Duration::ZERO)
    }

    // u64 に収まらない上限は u64::MAX で頭打ち
    fn max_micros(&self) -> u64 {
        u64::try_from(self.max.as_micros()).unwrap_or(u64::MAX)
    }

    fn take(&self) {
        if !self.max.is_zero() {
            let micros = rand::thread_rng().gen_range(0..=self.max_micros());
            thread::sleep(Duration::from_micros(micros));
        }
        thread::yield_now();
    }
}

/// 1 人の哲学者が食事を終えて席を立つまでの記録
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub id: usize,
    pub meals: usize,
    pub talks: usize,
    pub cancelled: bool,
}

pub struct Philosopher {
    id: usize,
    monitor: Arc<Monitor>,
    pause: Pause,
}

impl Philosopher {
    pub fn new(id: usize, monitor: Arc<Monitor>, pause: Pause) -> Self {
        Philosopher { id, monitor, pause }
    }

    /// think -> eat -> think -> talk を steps 回繰り返す
    ///
    /// 待機中にキャンセルされたらその場で打ち切り、`cancelled` を立てた Outcome を返す。
    pub fn run(&self, steps: usize) -> Result<Outcome, MonitorError> {
        let mut outcome = Outcome {
            id: self.id,
            meals: 0,
            talks: 0,
            cancelled: false,
        };

        for step in 0..steps {
            debug!(id = self.id, step, "next course");

            self.think();
            if !granted(self.monitor.acquire_pair(self.id))? {
                outcome.cancelled = true;
                break;
            }
            self.eat();
            outcome.meals += 1;
            self.monitor.release_pair(self.id)?;

            self.think();
            if !granted(self.monitor.acquire_talk(self.id))? {
                outcome.cancelled = true;
                break;
            }
            self.talk();
            outcome.talks += 1;
            self.monitor.release_talk(self.id)?;
        }

        if outcome.cancelled {
            info!(id = self.id, "Philosopher {} was sent away from the table.", self.id);
        } else {
            info!(id = self.id, "Philosopher {} has finished the dinner.", self.id);
        }
        Ok(outcome)
    }

    fn think(&self) {
        info!(id = self.id, "Philosopher {} has started thinking.", self.id);
        self.pause.take();
        info!(id = self.id, "Philosopher {} is done thinking.", self.id);
    }

    fn eat(&self) {
        info!(id = self.id, "Philosopher {} has started eating.", self.id);
        self.pause.take();
        info!(id = self.id, "Philosopher {} is done eating.", self.id);
    }

    fn talk(&self) {
        info!(id = self.id, "Philosopher {} has started talking.", self.id);
        self.pause.take();
        info!(id = self.id, "Philosopher {} is done talking.", self.id);
    }
}

// Ok(true) なら獲得、Ok(false) ならキャンセル
fn granted(result: Result<(), MonitorError>) -> Result<bool, MonitorError> {
    match result {
        Ok(()) => Ok(true),
        Err(MonitorError::Cancelled) => Ok(false),
        Err(e) => Err(e),
    }
}
