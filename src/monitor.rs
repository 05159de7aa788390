use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, error};

use crate::ring::{ResourceRing, Seat, SeatError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MonitorError {
    /// 待機中、あるいは待機に入る前にキャンセルされた
    #[error("wait was cancelled")]
    Cancelled,
    #[error(transparent)]
    Seat(#[from] SeatError),
    #[error("philosopher {id} does not hold chopsticks {left} and {right}")]
    PairNotHeld { id: usize, left: usize, right: usize },
    #[error("philosopher {id} does not hold the floor")]
    FloorNotHeld { id: usize },
}

/// 発言権。同時に 1 人だけが持てる
#[derive(Debug, Default, Clone, Copy)]
pub struct TalkToken {
    holder: Option<usize>,
}

impl TalkToken {
    pub fn is_free(&self) -> bool {
        self.holder.is_none()
    }

    pub fn holder(&self) -> Option<usize> {
        self.holder
    }
}

/// ある時点の卓の様子
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSnapshot {
    pub held: Vec<usize>,
    /// 箸ごとの持ち主
    pub holders: Vec<Option<usize>>,
    pub floor: Option<usize>,
    pub meals: usize,
    pub talks: usize,
    pub cancelled: bool,
}

#[derive(Debug)]
struct State {
    ring: ResourceRing,
    floor: TalkToken,
    cancelled: bool,
    // 哲学者ごとのキャンセル。添字は id - 1
    dismissed: Vec<bool>,
    // 箸の組と発言権を獲得できた回数
    meals: usize,
    talks: usize,
}

impl State {
    fn sent_away(&self, seat: &Seat) -> bool {
        self.cancelled || self.dismissed[seat.id - 1]
    }
}

/// 箸と発言権をまとめて管理するモニタ
///
/// 状態はすべて 1 つの Mutex で守る。待機は条件変数で行い、
/// 起こされたら必ず条件を確認し直す (notify_all は誰の条件が満たされたかを区別しない)。
#[derive(Debug)]
pub struct Monitor {
    seats: usize,
    state: Mutex<State>,
    chopsticks: Condvar, // acquire_pair の待ち
    floor: Condvar,      // acquire_talk の待ち
}

impl Monitor {
    pub fn new(seats: usize) -> Result<Self, MonitorError> {
        if seats == 0 {
            return Err(SeatError::EmptyTable.into());
        }

        Ok(Monitor {
            seats,
            state: Mutex::new(State {
                ring: ResourceRing::new(seats),
                floor: TalkToken::default(),
                cancelled: false,
                dismissed: vec![false; seats],
                meals: 0,
                talks: 0,
            }),
            chopsticks: Condvar::new(),
            floor: Condvar::new(),
        })
    }

    // どのクリティカルセクションも途中で状態を壊さないので、poison は無視してよい
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn seat(&self, id: usize) -> Result<Seat, MonitorError> {
        Ok(Seat::new(id, self.seats)?)
    }

    /// 左右の箸が両方空くまで待ち、2 本同時に取る
    ///
    /// 片方だけ持ったまま待つことはないので、循環待ちによるデッドロックは起きない。
    pub fn acquire_pair(&self, id: usize) -> Result<(), MonitorError> {
        let seat = self.seat(id)?;
        let mut state = self.lock();

        loop {
            if state.sent_away(&seat) {
                debug!(id, "pick up cancelled");
                return Err(MonitorError::Cancelled);
            }
            if state.ring.both_free(&seat) {
                break;
            }

            debug!(id, left = seat.left, right = seat.right, "waiting for chopsticks");
            state = self
                .chopsticks
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        state.ring.take(&seat);
        state.meals += 1;
        debug!(id, left = seat.left, right = seat.right, "picked up chopsticks");
        Ok(())
    }

    /// 箸を置き、待っている全員を起こす
    pub fn release_pair(&self, id: usize) -> Result<(), MonitorError> {
        let seat = self.seat(id)?;
        let mut state = self.lock();

        if !state.ring.held_by(&seat) {
            error!(id, left = seat.left, right = seat.right, "put down chopsticks it does not hold");
            return Err(MonitorError::PairNotHeld {
                id,
                left: seat.left,
                right: seat.right,
            });
        }

        state.ring.put(&seat);
        self.chopsticks.notify_all();
        Ok(())
    }

    /// 誰も話していなくなるまで待ち、発言権を取る
    pub fn acquire_talk(&self, id: usize) -> Result<(), MonitorError> {
        let seat = self.seat(id)?;
        let mut state = self.lock();

        loop {
            if state.sent_away(&seat) {
                debug!(id, "request to talk cancelled");
                return Err(MonitorError::Cancelled);
            }
            if state.floor.is_free() {
                break;
            }

            debug!(id, speaker = state.floor.holder, "waiting for the floor");
            state = self.floor.wait(state).unwrap_or_else(PoisonError::into_inner);
        }

        state.floor.holder = Some(id);
        state.talks += 1;
        Ok(())
    }

    pub fn release_talk(&self, id: usize) -> Result<(), MonitorError> {
        self.seat(id)?;
        let mut state = self.lock();

        if state.floor.holder != Some(id) {
            error!(id, speaker = state.floor.holder, "ended a talk it was not giving");
            return Err(MonitorError::FloorNotHeld { id });
        }

        state.floor.holder = None;
        self.floor.notify_all();
        Ok(())
    }

    /// 哲学者 `id` の待機中・これから待機する acquire_* だけを Cancelled で返させる
    ///
    /// 他の哲学者はそのまま食事を続けられる。release_* は引き続き使える。
    pub fn dismiss(&self, id: usize) -> Result<(), MonitorError> {
        let seat = self.seat(id)?;
        let mut state = self.lock();
        if !state.dismissed[seat.id - 1] {
            state.dismissed[seat.id - 1] = true;
            debug!(id, "philosopher dismissed");
        }
        // 誰が待っているかは区別できないので全員起こす
        self.chopsticks.notify_all();
        self.floor.notify_all();
        Ok(())
    }

    /// 卓全体のキャンセル。全員の acquire_* が Cancelled で返る
    ///
    /// release_* はキャンセル後も使えるので、持っているものは普通に返却できる。
    /// 1 人だけ帰すときは [`Monitor::dismiss`] を使う。
    pub fn cancel(&self) {
        let mut state = self.lock();
        if !state.cancelled {
            state.cancelled = true;
            debug!("monitor cancelled");
        }
        self.chopsticks.notify_all();
        self.floor.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    pub fn snapshot(&self) -> TableSnapshot {
        let state = self.lock();
        TableSnapshot {
            held: state.ring.held_indices(),
            holders: state.ring.holders().to_vec(),
            floor: state.floor.holder(),
            meals: state.meals,
            talks: state.talks,
            cancelled: state.cancelled,
        }
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::{mpsc, Arc},
        thread,
        time::Duration,
    };

    use super::*;

    const SETTLE: Duration = Duration::from_millis(100);

    #[test]
    fn test_empty_table() {
        assert_eq!(
            Monitor::new(0).unwrap_err(),
            MonitorError::Seat(SeatError::EmptyTable)
        );
    }

    #[test]
    fn test_pair_round_trip() {
        let monitor = Monitor::new(4).unwrap();
        monitor.acquire_pair(4).unwrap();
        assert_eq!(monitor.snapshot().held, vec![0, 3]);

        // 隣に座っていない 2 は同時に食べられる
        monitor.acquire_pair(2).unwrap();
        assert_eq!(monitor.snapshot().held, vec![0, 1, 2, 3]);

        monitor.release_pair(4).unwrap();
        monitor.release_pair(2).unwrap();
        let snapshot = monitor.snapshot();
        assert!(snapshot.held.is_empty());
        assert_eq!(snapshot.meals, 2);
    }

    #[test]
    fn test_single_philosopher() {
        let monitor = Monitor::new(1).unwrap();
        for _ in 0..3 {
            monitor.acquire_pair(1).unwrap();
            assert_eq!(monitor.snapshot().held, vec![0]);
            monitor.release_pair(1).unwrap();
            assert!(monitor.snapshot().held.is_empty());
        }
        assert_eq!(monitor.snapshot().meals, 3);
    }

    #[test]
    fn test_unknown_philosopher() {
        let monitor = Monitor::new(3).unwrap();
        assert_eq!(
            monitor.acquire_pair(4),
            Err(MonitorError::Seat(SeatError::OutOfRange { id: 4, seats: 3 }))
        );
        assert!(matches!(monitor.acquire_talk(0), Err(MonitorError::Seat(_))));
    }

    #[test]
    fn test_release_not_held() {
        let monitor = Monitor::new(3).unwrap();
        assert_eq!(
            monitor.release_pair(2),
            Err(MonitorError::PairNotHeld {
                id: 2,
                left: 1,
                right: 2
            })
        );

        // 1 が持っている箸を 2 が置くことはできない
        monitor.acquire_pair(1).unwrap();
        assert!(monitor.release_pair(2).is_err());
        assert_eq!(monitor.snapshot().held, vec![0, 1]);

        assert_eq!(
            monitor.release_talk(1),
            Err(MonitorError::FloorNotHeld { id: 1 })
        );
    }

    #[test]
    fn test_neighbour_waits_for_release() {
        let monitor = Arc::new(Monitor::new(2).unwrap());
        monitor.acquire_pair(1).unwrap();

        let (tx, rx) = mpsc::channel();
        let m = monitor.clone();
        let t = thread::spawn(move || {
            m.acquire_pair(2).unwrap();
            tx.send(()).unwrap();
        });

        thread::sleep(SETTLE);
        assert!(rx.try_recv().is_err());

        monitor.release_pair(1).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        t.join().unwrap();
        assert_eq!(monitor.snapshot().held, vec![0, 1]);
    }

    #[test]
    fn test_floor_is_exclusive() {
        let monitor = Arc::new(Monitor::new(3).unwrap());
        monitor.acquire_talk(1).unwrap();

        let (tx, rx) = mpsc::channel();
        let m = monitor.clone();
        let t = thread::spawn(move || {
            m.acquire_talk(3).unwrap();
            tx.send(()).unwrap();
        });

        thread::sleep(SETTLE);
        assert!(rx.try_recv().is_err());
        assert_eq!(monitor.snapshot().floor, Some(1));

        monitor.release_talk(1).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        t.join().unwrap();
        assert_eq!(monitor.snapshot().floor, Some(3));
    }

    #[test]
    fn test_talk_is_independent_of_chopsticks() {
        let monitor = Monitor::new(2).unwrap();
        monitor.acquire_pair(1).unwrap();
        // 箸を持っていない 2 も話せる
        monitor.acquire_talk(2).unwrap();
        monitor.release_talk(2).unwrap();
        monitor.release_pair(1).unwrap();
    }

    #[test]
    fn test_cancel_parked_pair() {
        let monitor = Arc::new(Monitor::new(2).unwrap());
        monitor.acquire_pair(1).unwrap();

        let m = monitor.clone();
        let t = thread::spawn(move || m.acquire_pair(2));

        thread::sleep(SETTLE);
        monitor.cancel();
        assert_eq!(t.join().unwrap(), Err(MonitorError::Cancelled));

        // 待っていた側は何も取っていない
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.held, vec![0, 1]);
        assert_eq!(snapshot.meals, 1);
        assert!(snapshot.cancelled);

        monitor.release_pair(1).unwrap();
        assert!(monitor.snapshot().held.is_empty());
    }

    #[test]
    fn test_cancel_parked_talk() {
        let monitor = Arc::new(Monitor::new(2).unwrap());
        monitor.acquire_talk(1).unwrap();

        let m = monitor.clone();
        let t = thread::spawn(move || m.acquire_talk(2));

        thread::sleep(SETTLE);
        monitor.cancel();
        assert_eq!(t.join().unwrap(), Err(MonitorError::Cancelled));
        assert_eq!(monitor.snapshot().floor, Some(1));
        monitor.release_talk(1).unwrap();
    }

    #[test]
    fn test_dismiss_one_philosopher() {
        let monitor = Arc::new(Monitor::new(3).unwrap());
        monitor.acquire_pair(1).unwrap();
        monitor.acquire_talk(1).unwrap();

        // 2 は箸を、3 は発言権を待っている
        let m = monitor.clone();
        let two = thread::spawn(move || m.acquire_pair(2));
        let m = monitor.clone();
        let three = thread::spawn(move || m.acquire_talk(3));

        thread::sleep(SETTLE);
        monitor.dismiss(2).unwrap();
        assert_eq!(two.join().unwrap(), Err(MonitorError::Cancelled));
        assert!(!monitor.is_cancelled());

        // 3 は帰されていないので、発言権が空けば話せる
        monitor.release_talk(1).unwrap();
        assert_eq!(three.join().unwrap(), Ok(()));
        assert_eq!(monitor.snapshot().floor, Some(3));

        monitor.release_pair(1).unwrap();
        assert_eq!(monitor.acquire_pair(2), Err(MonitorError::Cancelled));
        monitor.acquire_pair(3).unwrap();
        assert_eq!(monitor.snapshot().held, vec![0, 2]);

        assert!(matches!(monitor.dismiss(4), Err(MonitorError::Seat(_))));
    }

    #[test]
    fn test_acquire_after_cancel() {
        let monitor = Monitor::new(3).unwrap();
        monitor.cancel();
        assert!(monitor.is_cancelled());
        assert_eq!(monitor.acquire_pair(1), Err(MonitorError::Cancelled));
        assert_eq!(monitor.acquire_talk(1), Err(MonitorError::Cancelled));
        assert!(monitor.snapshot().held.is_empty());
    }
}
