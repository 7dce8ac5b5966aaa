//! Task Management
//!
//! Tasks own an address space and a roster of threads; they are the unit
//! of resource ownership, while threads are the unit of scheduling. Task 0
//! is the system task and lives for the lifetime of the kernel.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::string::String;
use alloc::vec::Vec;
use core::any::Any;

use crate::config::MAX_TASKS;
use crate::errno::{Errno, KResult};
use crate::thread::{Priority, ThreadEntry, ThreadFlags, Tid};
use crate::Kernel;

/// Task ID type
pub type TaskId = u32;

/// The system task, owner of the bootstrap thread and kernel services
pub const SYSTEM_TASK: TaskId = 0;

/// Aggregate task state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created, no thread has run yet
    New,
    /// At least one thread has been scheduled
    Running,
    /// Last live thread terminated or the task was exited explicitly
    Exited,
}

/// Task flags
#[derive(Debug, Clone, Copy)]
pub struct TaskFlags(pub u32);

impl TaskFlags {
    pub const NONE: u32 = 0;
    /// Kernel-owned task
    pub const SYSTEM: u32 = 1 << 0;
}

/// Handle to the page-table root of a task's address space. Every task in
/// this kernel shares the boot address space; the handle exists so an MMU
/// rework has a place to put per-task roots.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressSpace {
    pub page_table_root: u64,
}

/// Task Control Block
pub struct Task {
    /// Task ID
    pub id: TaskId,
    /// Human-readable name
    pub name: String,
    /// Parent task ID (self for the system task)
    pub parent: TaskId,
    /// Aggregate state
    pub state: TaskState,
    /// Task flags
    pub flags: TaskFlags,
    /// Exit code, defined once the task is exited
    pub exit_code: i32,
    /// Ticks accumulated by threads that already retired
    pub cpu_ticks: u64,
    /// Address-space handle
    pub address_space: AddressSpace,
    /// Live threads owned by this task
    pub threads: Vec<Tid>,
    /// Threads parked in `join_task`
    joiners: VecDeque<Tid>,
    /// Driver-private payload
    payload: Option<Box<dyn Any + Send>>,
}

impl Task {
    pub(crate) fn new(id: TaskId, name: &str, parent: TaskId, flags: TaskFlags, space: AddressSpace) -> Self {
        Self {
            id,
            name: String::from(name),
            parent,
            state: TaskState::New,
            flags,
            exit_code: 0,
            cpu_ticks: 0,
            address_space: space,
            threads: Vec::new(),
            joiners: VecDeque::new(),
            payload: None,
        }
    }
}

/// Snapshot of one task for diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: String,
    pub parent: TaskId,
    pub state: TaskState,
    pub exit_code: i32,
    pub thread_count: usize,
    pub cpu_ticks: u64,
}

/// Task table behind the task spinlock
pub(crate) struct TaskTable {
    pub tasks: BTreeMap<TaskId, Task>,
    pub next_id: TaskId,
}

impl TaskTable {
    pub(crate) fn new() -> Self {
        Self { tasks: BTreeMap::new(), next_id: 1 }
    }
}

impl Kernel {
    /// Create an empty task. Its first thread is supplied separately via
    /// [`Kernel::spawn_main_thread`].
    pub fn create_task(&self, name: &str, parent: TaskId, flags: TaskFlags) -> KResult<TaskId> {
        let mut tasks = self.tasks.acquire(self.platform());
        if tasks.tasks.len() >= MAX_TASKS {
            return Err(Errno::Resource);
        }
        let space = match tasks.tasks.get(&parent) {
            Some(p) => p.address_space,
            None => return Err(Errno::NotFound),
        };

        let id = tasks.next_id;
        tasks.next_id += 1;
        tasks.tasks.insert(id, Task::new(id, name, parent, flags, space));

        crate::log_debug!("[TASK] created task {} '{}' (parent {})", id, name, parent);
        Ok(id)
    }

    /// Create the initial thread of a task
    pub fn spawn_main_thread(
        &self,
        task: TaskId,
        entry: ThreadEntry,
        arg: u64,
        stack_size: usize,
        priority: Priority,
    ) -> KResult<Tid> {
        let name = {
            let tasks = self.tasks.acquire(self.platform());
            match tasks.tasks.get(&task) {
                None => return Err(Errno::NotFound),
                Some(t) if t.state == TaskState::Exited => return Err(Errno::Invalid),
                Some(t) if !t.threads.is_empty() => return Err(Errno::Busy),
                Some(t) => t.name.clone(),
            }
        };
        self.create_thread_in(
            task,
            entry,
            arg,
            stack_size,
            priority,
            ThreadFlags(ThreadFlags::MAIN),
            &name,
        )
    }

    /// Exit a task: every one of its threads is terminated with `code`.
    /// Never returns if the caller's own task is the target.
    pub fn exit_task(&self, task: TaskId, code: i32) -> KResult<()> {
        if task == SYSTEM_TASK {
            return Err(Errno::Invalid);
        }

        let victims = {
            let mut tasks = self.tasks.acquire(self.platform());
            let t = match tasks.tasks.get_mut(&task) {
                Some(t) => t,
                None => return Err(Errno::NotFound),
            };
            if t.state == TaskState::Exited {
                return Ok(());
            }
            t.state = TaskState::Exited;
            t.exit_code = code;
            core::mem::take(&mut t.threads)
        };

        let me = self.current_thread_id();
        let mut self_dies = false;
        for tid in &victims {
            if *tid == me {
                self_dies = true;
            } else {
                self.kill_thread(*tid, code);
            }
        }

        self.wake_task_joiners(task);
        crate::log_debug!("[TASK] task {} exited with code {}", task, code);

        if self_dies {
            self.exit_thread(code);
        }
        Ok(())
    }

    /// Park until the task exits, then observe the exit code and reap the
    /// record. The first joiner wins; later joiners see not-found.
    pub fn join_task(&self, task: TaskId) -> KResult<i32> {
        if task == SYSTEM_TASK {
            return Err(Errno::Invalid);
        }
        let me = self.current_thread_id();

        loop {
            {
                let mut tasks = self.tasks.acquire(self.platform());
                let state = match tasks.tasks.get(&task) {
                    None => return Err(Errno::NotFound),
                    Some(t) => t.state,
                };
                if state == TaskState::Exited {
                    let record = tasks.tasks.remove(&task).unwrap();
                    return Ok(record.exit_code);
                }
                if let Some(t) = tasks.tasks.get_mut(&task) {
                    if !t.joiners.contains(&me) {
                        t.joiners.push_back(me);
                    }
                }
            }
            self.block_current();
        }
    }

    /// Look up one task
    pub fn find_task(&self, task: TaskId) -> KResult<TaskInfo> {
        let tasks = self.tasks.acquire(self.platform());
        tasks.tasks.get(&task).map(task_info).ok_or(Errno::NotFound)
    }

    /// Look up a task by name (first match in id order)
    pub fn find_task_by_name(&self, name: &str) -> KResult<TaskId> {
        let tasks = self.tasks.acquire(self.platform());
        tasks
            .tasks
            .values()
            .find(|t| t.name == name)
            .map(|t| t.id)
            .ok_or(Errno::NotFound)
    }

    /// Snapshot every task in id order
    pub fn list_tasks(&self) -> Vec<TaskInfo> {
        let tasks = self.tasks.acquire(self.platform());
        tasks.tasks.values().map(task_info).collect()
    }

    /// Number of task records
    pub fn task_count(&self) -> usize {
        self.tasks.acquire(self.platform()).tasks.len()
    }

    /// Attach a driver-private payload to a task
    pub fn set_task_payload(&self, task: TaskId, payload: Box<dyn Any + Send>) -> KResult<()> {
        let mut tasks = self.tasks.acquire(self.platform());
        match tasks.tasks.get_mut(&task) {
            Some(t) => {
                t.payload = Some(payload);
                Ok(())
            }
            None => Err(Errno::NotFound),
        }
    }

    /// Remove and return a task's payload
    pub fn take_task_payload(&self, task: TaskId) -> KResult<Option<Box<dyn Any + Send>>> {
        let mut tasks = self.tasks.acquire(self.platform());
        match tasks.tasks.get_mut(&task) {
            Some(t) => Ok(t.payload.take()),
            None => Err(Errno::NotFound),
        }
    }

    /// Add a freshly created thread to its task's roster
    pub(crate) fn attach_thread_to_task(&self, task: TaskId, tid: Tid) -> KResult<()> {
        let mut tasks = self.tasks.acquire(self.platform());
        match tasks.tasks.get_mut(&task) {
            None => Err(Errno::NotFound),
            Some(t) if t.state == TaskState::Exited => Err(Errno::Invalid),
            Some(t) => {
                t.threads.push(tid);
                Ok(())
            }
        }
    }

    /// Remove an exiting thread from its task. The last live thread takes
    /// the task with it: the task becomes exited with the thread's code.
    pub(crate) fn detach_thread_from_task(&self, task: TaskId, tid: Tid, code: i32) {
        let wake = {
            let mut tasks = self.tasks.acquire(self.platform());
            match tasks.tasks.get_mut(&task) {
                None => false,
                Some(t) => {
                    t.threads.retain(|id| *id != tid);
                    if t.threads.is_empty() && t.state != TaskState::Exited {
                        t.state = TaskState::Exited;
                        t.exit_code = code;
                        true
                    } else {
                        false
                    }
                }
            }
        };
        if wake {
            self.wake_task_joiners(task);
        }
    }

    /// First schedule of any thread moves the task to running
    pub(crate) fn mark_task_running(&self, task: TaskId) {
        let mut tasks = self.tasks.acquire(self.platform());
        if let Some(t) = tasks.tasks.get_mut(&task) {
            if t.state == TaskState::New {
                t.state = TaskState::Running;
            }
        }
    }

    fn wake_task_joiners(&self, task: TaskId) {
        let joiners: VecDeque<Tid> = {
            let mut tasks = self.tasks.acquire(self.platform());
            match tasks.tasks.get_mut(&task) {
                Some(t) => core::mem::take(&mut t.joiners),
                None => VecDeque::new(),
            }
        };
        for tid in joiners {
            self.wake_thread(tid);
        }
    }

    /// Fold a retired thread's tick count into its task
    pub(crate) fn charge_task_cpu(&self, task: TaskId, ticks: u64) {
        let mut tasks = self.tasks.acquire(self.platform());
        if let Some(t) = tasks.tasks.get_mut(&task) {
            t.cpu_ticks = t.cpu_ticks.saturating_add(ticks);
        }
    }
}

fn task_info(t: &Task) -> TaskInfo {
    TaskInfo {
        id: t.id,
        name: t.name.clone(),
        parent: t.parent,
        state: t.state,
        exit_code: t.exit_code,
        thread_count: t.threads.len(),
        cpu_ticks: t.cpu_ticks,
    }
}
