use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    Failure,
    InvalidArgs,
    ExecutableNotFound,
    Interrupted,
    Tool(i32),
}

impl ExitCode {
    pub const fn as_i32(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::Failure => 1,
            ExitCode::InvalidArgs => 2,
            ExitCode::ExecutableNotFound => 127,
            ExitCode::Interrupted => 130,
            ExitCode::Tool(code) => code,
        }
    }
}

#[derive(Debug)]
pub struct ExitError {
    pub code: ExitCode,
    pub err: anyhow::Error,
}

impl ExitError {
    pub fn new(code: ExitCode, err: anyhow::Error) -> Self {
        Self { code, err }
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.err.fmt(f)
    }
}

impl std::error::Error for ExitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.err.as_ref())
    }
}

pub fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(exit) = err.downcast_ref::<ExitError>() {
        return exit.code.as_i32();
    }
    ExitCode::Failure.as_i32()
}

pub fn invalid_args(message: impl Into<String>) -> anyhow::Error {
    ExitError::new(ExitCode::InvalidArgs, anyhow::anyhow!(message.into())).into()
}

pub fn invalid_args_err(err: anyhow::Error) -> anyhow::Error {
    ExitError::new(ExitCode::InvalidArgs, err).into()
}

pub fn not_found(program: &str, hint: &str) -> anyhow::Error {
    ExitError::new(
        ExitCode::ExecutableNotFound,
        anyhow::anyhow!("{program} command not found. {hint}"),
    )
    .into()
}

pub fn malformed_output(message: impl Into<String>) -> anyhow::Error {
    ExitError::new(ExitCode::Failure, anyhow::anyhow!(message.into())).into()
}

pub fn selection(message: impl Into<String>) -> anyhow::Error {
    ExitError::new(ExitCode::Failure, anyhow::anyhow!(message.into())).into()
}

pub fn interrupted() -> anyhow::Error {
    ExitError::new(ExitCode::Interrupted, anyhow::anyhow!("interrupted")).into()
}

pub fn tool_failed(code: i32, message: impl Into<String>) -> anyhow::Error {
    let code = if code == 0 {
        ExitCode::Failure
    } else {
        ExitCode::Tool(code)
    };
    ExitError::new(code, anyhow::anyhow!(message.into())).into()
}

/// Returns true when `err` is a missing-executable error, however deeply it
/// was wrapped with context.
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<ExitError>()
            .is_some_and(|e| e.code == ExitCode::ExecutableNotFound)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_defaults_to_failure_for_plain_errors() {
        let err = anyhow::anyhow!("boom");
        assert_eq!(exit_code(&err), 1);
    }

    #[test]
    fn exit_code_reads_wrapped_exit_error() {
        assert_eq!(exit_code(&invalid_args("bad")), 2);
        assert_eq!(exit_code(&not_found("k8sgpt", "install it")), 127);
        assert_eq!(exit_code(&interrupted()), 130);
        assert_eq!(exit_code(&tool_failed(3, "x")), 3);
        assert_eq!(exit_code(&tool_failed(0, "x")), 1);
    }

    #[test]
    fn is_not_found_sees_through_context() {
        let err = not_found("kubectl", "install it").context("running executor");
        assert!(is_not_found(&err));
        assert!(!is_not_found(&anyhow::anyhow!("other")));
    }
}
