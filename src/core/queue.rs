use super::error::QueueFull;
use super::state::JobId;

pub const MAX_QUEUE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    Top = 0,
    Middle = 1,
    Bottom = 2,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Top, Level::Middle, Level::Bottom];

    pub fn index(self) -> usize {
        self as usize
    }

    // Bottom-level overruns stay at the bottom.
    pub fn demoted(self) -> Level {
        match self {
            Level::Top => Level::Middle,
            Level::Middle | Level::Bottom => Level::Bottom,
        }
    }
}

/// Bounded FIFO ring of job ids.
#[derive(Debug, Clone)]
pub struct LevelQueue {
    slots: Box<[JobId]>,
    head: usize,
    len: usize,
}

impl Default for LevelQueue {
    fn default() -> Self {
        Self::new(MAX_QUEUE)
    }
}

impl LevelQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![0; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    pub fn enqueue(&mut self, job: JobId) -> Result<(), QueueFull> {
        if self.is_full() {
            return Err(QueueFull {
                job,
                capacity: self.capacity(),
            });
        }
        let tail = (self.head + self.len) % self.slots.len();
        self.slots[tail] = job;
        self.len += 1;
        Ok(())
    }

    pub fn dequeue(&mut self) -> Option<JobId> {
        if self.is_empty() {
            return None;
        }
        let job = self.slots[self.head];
        self.head = (self.head + 1) % self.slots.len();
        self.len -= 1;
        Some(job)
    }

    /// Front to back.
    pub fn iter(&self) -> impl Iterator<Item = JobId> + '_ {
        (0..self.len).map(move |i| self.slots[(self.head + i) % self.slots.len()])
    }

    pub fn contains(&self, job: JobId) -> bool {
        self.iter().any(|queued| queued == job)
    }
}

/// The three MLFQ levels. Pops strictly by level, FIFO within a level.
#[derive(Debug, Clone, Default)]
pub struct LevelSet {
    levels: [LevelQueue; 3],
}

impl LevelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, level: Level, job: JobId) -> Result<(), QueueFull> {
        self.levels[level.index()].enqueue(job)
    }

    pub fn pop(&mut self) -> Option<(Level, JobId)> {
        Level::ALL.into_iter().find_map(|level| {
            self.levels[level.index()]
                .dequeue()
                .map(|job| (level, job))
        })
    }

    pub fn queue(&self, level: Level) -> &LevelQueue {
        &self.levels[level.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(LevelQueue::is_empty)
    }

    pub fn len(&self) -> usize {
        self.levels.iter().map(LevelQueue::len).sum()
    }

    pub fn level_of(&self, job: JobId) -> Option<Level> {
        Level::ALL
            .into_iter()
            .find(|level| self.levels[level.index()].contains(job))
    }

    pub fn iter(&self) -> impl Iterator<Item = JobId> + '_ {
        self.levels.iter().flat_map(LevelQueue::iter)
    }

    /// Move everything in the middle and then the bottom level to the top,
    /// behind whatever is already there. Returns the moved jobs in order.
    pub fn boost(&mut self) -> Result<Vec<JobId>, QueueFull> {
        let mut moved = Vec::new();
        for level in [Level::Middle, Level::Bottom] {
            while let Some(job) = self.levels[level.index()].dequeue() {
                self.levels[Level::Top.index()].enqueue(job)?;
                moved.push(job);
            }
        }
        Ok(moved)
    }
}
