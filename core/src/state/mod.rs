//! # 状态管理模块
//!
//! 负责 plan 运行过程中的会话快照、事件日志和检查点。
//!
//! ## 设计原则
//!
//! 1. **单写者**：所有变更经由 `StateManager` 的写锁串行化
//! 2. **整体覆盖**：会话快照每次完整重写（临时文件 + rename）
//! 3. **事件驱动**：状态变更追加到事件日志并广播给订阅者
//! 4. **故障恢复**：检查点记录已完成的层和任务，悬空的会话指针表示崩溃

pub mod checkpoint;
pub mod events;
pub mod manager;
pub mod query;
pub mod session;
pub mod snapshot;
pub mod transitions;
pub mod types;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use events::EventLog;
pub use manager::StateManager;
pub use query::{pending_blockers, status_report, BlockReason, Blocker, StatusReport};
pub use session::{Session, SessionStats, SessionStatus};
pub use transitions::{StateTransition, TransitionError};
pub use types::{EventRecord, StateEvent, TaskStatus};
