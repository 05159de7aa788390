use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
};

use thiserror::Error;
use tracing::{debug, error};

use crate::{
    config::Config,
    monitor::{Monitor, MonitorError},
    philosopher::{Outcome, Pause, Philosopher},
};

#[derive(Debug, Error)]
pub enum DinnerError {
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    #[error("failed to seat philosopher {id}")]
    Spawn {
        id: usize,
        #[source]
        source: io::Error,
    },
    #[error("philosopher {id} left the table abnormally")]
    Join { id: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub outcomes: Vec<Outcome>,
    pub meals: usize,
    pub talks: usize,
    /// 途中でモニタがキャンセルされたか
    pub cancelled: bool,
}

/// モニタを用意し、哲学者を 1 人 1 スレッドで座らせて全員が帰るのを待つ
pub struct Dinner {
    config: Config,
    monitor: Arc<Monitor>,
}

impl Dinner {
    pub fn new(config: Config) -> Result<Self, DinnerError> {
        let monitor = Arc::new(Monitor::new(config.philosophers)?);
        Ok(Dinner { config, monitor })
    }

    pub fn monitor(&self) -> Arc<Monitor> {
        self.monitor.clone()
    }

    /// `announce` は誰かが席に着く前に人数を渡して呼ばれる
    pub fn serve(self, announce: impl FnOnce(usize)) -> Result<Report, DinnerError> {
        let count = self.config.philosophers;
        let pause = Pause::new(self.config.max_pause);
        let steps = self.config.steps;

        announce(count);

        let mut seated = Vec::with_capacity(count);
        for id in 1..=count {
            let philosopher = Philosopher::new(id, self.monitor.clone(), pause);
            let spawned = thread::Builder::new()
                .name(format!("philosopher-{id}"))
                .spawn(move || philosopher.run(steps));

            match spawned {
                Ok(handle) => seated.push((id, handle)),
                Err(source) => {
                    error!(id, %source, "could not seat philosopher");
                    // 座れた人には帰ってもらう
                    self.monitor.cancel();
                    let _ = join_all(seated);
                    return Err(DinnerError::Spawn { id, source });
                }
            }
        }
        debug!(count, "everyone is seated");

        let outcomes = join_all(seated)?;
        let snapshot = self.monitor.snapshot();
        Ok(Report {
            meals: outcomes.iter().map(|o| o.meals).sum(),
            talks: outcomes.iter().map(|o| o.talks).sum(),
            outcomes,
            cancelled: snapshot.cancelled,
        })
    }
}

// 全員の終了を待つ。失敗があっても残りは待ってから最初のエラーを返す
fn join_all(
    seated: Vec<(usize, JoinHandle<Result<Outcome, MonitorError>>)>,
) -> Result<Vec<Outcome>, DinnerError> {
    let mut outcomes = Vec::with_capacity(seated.len());
    let mut failure = None;

    for (id, handle) in seated {
        match handle.join() {
            Ok(Ok(outcome)) => outcomes.push(outcome),
            Ok(Err(e)) => {
                error!(id, error = %e, "philosopher misused the monitor");
                failure.get_or_insert(DinnerError::Monitor(e));
            }
            Err(_) => {
                error!(id, "philosopher thread panicked");
                failure.get_or_insert(DinnerError::Join { id });
            }
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(outcomes),
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    fn config(philosophers: usize, steps: usize) -> Config {
        Config {
            philosophers,
            steps,
            max_pause: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_dinner_for_four() {
        let mut announced = None;
        let report = Dinner::new(config(4, 10))
            .unwrap()
            .serve(|n| announced = Some(n))
            .unwrap();

        assert_eq!(announced, Some(4));
        assert_eq!(report.meals, 40);
        assert_eq!(report.talks, 40);
        assert!(!report.cancelled);
        let ids: Vec<_> = report.outcomes.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_no_table_for_nobody() {
        assert!(matches!(
            Dinner::new(config(0, 10)),
            Err(DinnerError::Monitor(MonitorError::Seat(_)))
        ));
    }

    #[test]
    fn test_cancelled_before_serving() {
        let dinner = Dinner::new(config(3, 10)).unwrap();
        dinner.monitor().cancel();

        let report = dinner.serve(|_| {}).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.meals, 0);
        assert!(report.outcomes.iter().all(|o| o.cancelled));
    }
}
