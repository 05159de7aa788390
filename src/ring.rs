use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeatError {
    #[error("a table needs at least one seat")]
    EmptyTable,
    #[error("philosopher {id} has no seat at a table of {seats}")]
    OutOfRange { id: usize, seats: usize },
}

/// 哲学者 `id` (1..=n) が使う左右の箸の番号
///
/// 左は `(id - 1) % n`、右は `id % n`。n = 1 のときは両方 0 になる。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seat {
    pub id: usize,
    pub left: usize,
    pub right: usize,
}

impl Seat {
    pub fn new(id: usize, seats: usize) -> Result<Self, SeatError> {
        if seats == 0 {
            return Err(SeatError::EmptyTable);
        }
        if id == 0 || id > seats {
            return Err(SeatError::OutOfRange { id, seats });
        }

        Ok(Seat {
            id,
            left: (id - 1) % seats,
            right: id % seats,
        })
    }

    /// 重複を除いた箸の番号
    pub fn indices(&self) -> impl Iterator<Item = usize> {
        let right = (self.left != self.right).then_some(self.right);
        std::iter::once(self.left).chain(right)
    }
}

/// 円卓に並んだ箸。Some(id) なら哲学者 id が持っている
#[derive(Debug, Clone)]
pub struct ResourceRing {
    holders: Vec<Option<usize>>,
}

impl ResourceRing {
    pub fn new(len: usize) -> Self {
        ResourceRing {
            holders: vec![None; len],
        }
    }

    pub fn is_free(&self, index: usize) -> bool {
        self.holders[index].is_none()
    }

    pub fn holder(&self, index: usize) -> Option<usize> {
        self.holders[index]
    }

    pub fn both_free(&self, seat: &Seat) -> bool {
        seat.indices().all(|i| self.is_free(i))
    }

    pub fn held_by(&self, seat: &Seat) -> bool {
        seat.indices().all(|i| self.holders[i] == Some(seat.id))
    }

    // 呼び出し側で both_free を確認済みであること
    pub fn take(&mut self, seat: &Seat) {
        for i in seat.indices() {
            debug_assert!(self.holders[i].is_none(), "chopstick {i} taken twice");
            self.holders[i] = Some(seat.id);
        }
    }

    // 呼び出し側で held_by を確認済みであること
    pub fn put(&mut self, seat: &Seat) {
        for i in seat.indices() {
            debug_assert_eq!(self.holders[i], Some(seat.id));
            self.holders[i] = None;
        }
    }

    pub fn holders(&self) -> &[Option<usize>] {
        &self.holders
    }

    pub fn held_count(&self) -> usize {
        self.holders.iter().filter(|h| h.is_some()).count()
    }

    pub fn held_indices(&self) -> Vec<usize> {
        self.holders
            .iter()
            .enumerate()
            .filter_map(|(i, h)| h.map(|_| i))
            .collect()
    }
}
