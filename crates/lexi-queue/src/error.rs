use thiserror::Error;

/// Failures raised while building a queue or loading its configuration.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("no tokio runtime available to host the queue worker")]
    NoRuntime,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("config validation failed: {}", .0.join(", "))]
    Invalid(Vec<String>),
}

/// Outcome of a task that did not complete successfully.
#[derive(Debug, Error)]
pub enum TaskError<E> {
    /// The operation itself returned an error; the value is handed back untouched.
    #[error("task failed: {0}")]
    Failed(E),
    /// The task never settled: its body panicked or the runtime dropped it.
    #[error("task abandoned before it settled")]
    Abandoned,
}

impl<E> TaskError<E> {
    pub fn is_failed(&self) -> bool {
        matches!(self, TaskError::Failed(_))
    }

    pub fn is_abandoned(&self) -> bool {
        matches!(self, TaskError::Abandoned)
    }

    /// Returns the operation's own error, if that is why the task failed.
    pub fn into_failure(self) -> Option<E> {
        match self {
            TaskError::Failed(err) => Some(err),
            TaskError::Abandoned => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_joins_messages() {
        let err = QueueError::Invalid(vec!["a is bad".into(), "b is worse".into()]);
        assert_eq!(
            err.to_string(),
            "config validation failed: a is bad, b is worse"
        );
    }

    #[test]
    fn into_failure_returns_operation_error() {
        let err: TaskError<&str> = TaskError::Failed("boom");
        assert!(err.is_failed());
        assert_eq!(err.into_failure(), Some("boom"));
        let abandoned: TaskError<&str> = TaskError::Abandoned;
        assert!(abandoned.is_abandoned());
        assert_eq!(abandoned.into_failure(), None);
    }
}
