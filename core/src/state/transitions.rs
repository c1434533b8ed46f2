//! 任务状态转换规则和验证

use super::types::TaskStatus;
use thiserror::Error;

/// 状态转换错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Cannot transition from terminal state {state}")]
    FromTerminalState { state: String },
}

/// 状态转换
pub struct StateTransition;

impl StateTransition {
    /// 验证任务状态转换是否合法
    pub fn validate(from: &TaskStatus, to: &TaskStatus) -> Result<(), TransitionError> {
        // 已完成的任务永远不会被重新执行
        if matches!(from, TaskStatus::Completed) {
            return Err(TransitionError::FromTerminalState {
                state: from.label().to_string(),
            });
        }

        let is_valid = match (from, to) {
            (TaskStatus::Pending, TaskStatus::Ready) => true,
            (TaskStatus::Ready, TaskStatus::Executing) => true,
            (TaskStatus::Executing, TaskStatus::Reviewing) => true,
            (TaskStatus::Reviewing, TaskStatus::Completed) => true,

            // 任何非终态都可以失败
            (f, TaskStatus::Failed { .. }) if !f.is_terminal() => true,

            // 重新运行：失败或中断的任务回到 Pending
            (TaskStatus::Failed { .. }, TaskStatus::Pending) => true,
            (f, TaskStatus::Pending) if f.is_in_flight() => true,

            _ => false,
        };

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition {
                from: from.label().to_string(),
                to: to.label().to_string(),
            })
        }
    }

    /// 获取下一个正常推进的状态
    pub fn next(current: &TaskStatus) -> Option<TaskStatus> {
        match current {
            TaskStatus::Pending => Some(TaskStatus::Ready),
            TaskStatus::Ready => Some(TaskStatus::Executing),
            TaskStatus::Executing => Some(TaskStatus::Reviewing),
            TaskStatus::Reviewing => Some(TaskStatus::Completed),
            TaskStatus::Completed | TaskStatus::Failed { .. } => None,
        }
    }

    /// 获取状态的可读描述
    pub fn description(status: &TaskStatus) -> &'static str {
        match status {
            TaskStatus::Pending => "等待调度",
            TaskStatus::Ready => "等待资源锁",
            TaskStatus::Executing => "执行中",
            TaskStatus::Reviewing => "评审中",
            TaskStatus::Completed => "已完成",
            TaskStatus::Failed { .. } => "已失败",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_path_is_valid() {
        let mut status = TaskStatus::Pending;
        while let Some(next) = StateTransition::next(&status) {
            assert!(StateTransition::validate(&status, &next).is_ok());
            status = next;
        }
        assert_eq!(status, TaskStatus::Completed);
    }

    #[test]
    fn test_skipping_steps_is_invalid() {
        assert!(StateTransition::validate(&TaskStatus::Pending, &TaskStatus::Executing).is_err());
        assert!(StateTransition::validate(&TaskStatus::Ready, &TaskStatus::Completed).is_err());
    }

    #[test]
    fn test_any_active_state_can_fail() {
        for from in [
            TaskStatus::Pending,
            TaskStatus::Ready,
            TaskStatus::Executing,
            TaskStatus::Reviewing,
        ] {
            assert!(StateTransition::validate(&from, &TaskStatus::failed("x")).is_ok());
        }
    }

    #[test]
    fn test_completed_is_final() {
        let err = StateTransition::validate(&TaskStatus::Completed, &TaskStatus::Pending).unwrap_err();
        assert!(matches!(err, TransitionError::FromTerminalState { .. }));
    }

    #[test]
    fn test_failed_and_interrupted_reset_to_pending() {
        assert!(StateTransition::validate(&TaskStatus::failed("x"), &TaskStatus::Pending).is_ok());
        assert!(StateTransition::validate(&TaskStatus::Executing, &TaskStatus::Pending).is_ok());
        assert!(StateTransition::validate(&TaskStatus::failed("x"), &TaskStatus::Ready).is_err());
    }
}
