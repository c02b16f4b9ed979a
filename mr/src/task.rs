use std::time::{Duration, Instant};

/// Ordered so that a status can only be moved forward with [`Task::complete`].
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum TaskStatus {
    Idle,
    InProgress,
    Completed,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub enum TaskKind {
    Map,
    Reduce,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Phase {
    Mapping,
    Reducing,
    Done,
}

impl Phase {
    /// The kind of task that may be assigned while in this phase.
    pub fn task_kind(self) -> Option<TaskKind> {
        match self {
            Phase::Mapping => Some(TaskKind::Map),
            Phase::Reducing => Some(TaskKind::Reduce),
            Phase::Done => None,
        }
    }
}

/// Coordinator-side record of one unit of work.
#[derive(Debug, Clone)]
pub struct Task {
    kind: TaskKind,
    index: usize,
    status: TaskStatus,
    assigned_at: Option<Instant>,
    attempts: u32,
    split: Option<String>,
}

impl Task {
    pub fn new_map(index: usize, split: String) -> Task {
        Task {
            kind: TaskKind::Map,
            index,
            status: TaskStatus::Idle,
            assigned_at: None,
            attempts: 0,
            split: Some(split),
        }
    }

    pub fn new_reduce(index: usize) -> Task {
        Task {
            kind: TaskKind::Reduce,
            index,
            status: TaskStatus::Idle,
            assigned_at: None,
            attempts: 0,
            split: None,
        }
    }

    pub fn get_kind(&self) -> TaskKind {
        self.kind
    }

    pub fn get_index(&self) -> usize {
        self.index
    }

    pub fn get_status(&self) -> TaskStatus {
        self.status
    }

    pub fn get_split(&self) -> Option<&str> {
        self.split.as_deref()
    }

    pub fn get_attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the task can be handed out: never started, or held past `timeout`.
    pub fn is_assignable(&self, now: Instant, timeout: Duration) -> bool {
        match self.status {
            TaskStatus::Idle => true,
            TaskStatus::InProgress => self.is_timed_out(now, timeout),
            TaskStatus::Completed => false,
        }
    }

    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        self.status == TaskStatus::InProgress
            && self
                .assigned_at
                .map_or(true, |at| now.saturating_duration_since(at) >= timeout)
    }

    /// Starts a new attempt and returns its number (the first attempt is 1).
    pub fn assign(&mut self, now: Instant) -> u32 {
        debug_assert!(self.status != TaskStatus::Completed);
        self.status = TaskStatus::InProgress;
        self.assigned_at = Some(now);
        self.attempts += 1;
        self.attempts
    }

    /// Marks an in-progress task completed. Returns `false` and leaves the
    /// task untouched if it was not in progress.
    pub fn complete(&mut self) -> bool {
        if self.status != TaskStatus::InProgress {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.assigned_at = None;
        true
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// The registered bytes of one intermediate partition.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IntermediateFile {
    pub map_index: usize,
    pub reduce_index: usize,
    pub name: String,
    pub content: Vec<u8>,
}

/// What a worker is told to do next.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TaskDescriptor {
    Map {
        index: usize,
        attempt: u32,
        split: String,
        n_reduce: usize,
    },
    Reduce {
        index: usize,
        n_reduce: usize,
        files: Vec<IntermediateFile>,
    },
    /// Every eligible task is held by another worker; ask again shortly.
    Wait,
    /// The job is done.
    Exit,
}

impl TaskDescriptor {
    pub fn kind(&self) -> Option<TaskKind> {
        match self {
            TaskDescriptor::Map { .. } => Some(TaskKind::Map),
            TaskDescriptor::Reduce { .. } => Some(TaskKind::Reduce),
            TaskDescriptor::Wait | TaskDescriptor::Exit => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[test]
    fn test_status_order() {
        assert!(TaskStatus::Idle < TaskStatus::InProgress);
        assert!(TaskStatus::InProgress < TaskStatus::Completed);
    }

    #[test]
    fn test_task_lifecycle() {
        let now = Instant::now();
        let mut task = Task::new_map(0, "pg-0.txt".to_string());
        assert!(task.is_assignable(now, TIMEOUT));
        assert!(!task.complete());
        assert_eq!(task.get_status(), TaskStatus::Idle);

        assert_eq!(task.assign(now), 1);
        assert!(!task.is_assignable(now + Duration::from_secs(1), TIMEOUT));
        assert!(task.is_assignable(now + TIMEOUT, TIMEOUT));

        assert!(task.complete());
        assert!(!task.complete());
        assert!(task.is_completed());
        assert!(!task.is_assignable(now + TIMEOUT * 10, TIMEOUT));
    }

    #[test]
    fn test_reassignment_counts_attempts() {
        let now = Instant::now();
        let mut task = Task::new_reduce(3);
        task.assign(now);
        assert!(task.is_timed_out(now + TIMEOUT, TIMEOUT));
        assert_eq!(task.assign(now + TIMEOUT), 2);
        assert!(!task.is_timed_out(now + TIMEOUT, TIMEOUT));
        assert_eq!(task.get_attempts(), 2);
        assert_eq!(task.get_split(), None);
    }

    #[test]
    fn test_phase_task_kind() {
        assert_eq!(Phase::Mapping.task_kind(), Some(TaskKind::Map));
        assert_eq!(Phase::Reducing.task_kind(), Some(TaskKind::Reduce));
        assert_eq!(Phase::Done.task_kind(), None);
    }
}
