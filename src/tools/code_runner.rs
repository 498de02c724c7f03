//! Snippet execution tool.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::process::Command;

use super::{parse_args, Tool, ToolError};

/// Languages `code_runner` accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Javascript,
}

impl Language {
    fn interpreter(self) -> (&'static str, &'static str) {
        match self {
            Self::Python => ("python3", "-c"),
            Self::Javascript => ("node", "-e"),
        }
    }
}

/// Captured output of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Run a python or javascript snippet in a throwaway directory.
pub struct CodeRunner {
    timeout: Duration,
}

#[derive(Deserialize)]
struct RunArgs {
    language: Language,
    code: String,
}

impl CodeRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Execute `code`. The child is killed if it outlives the timeout.
    pub async fn run(&self, language: Language, code: &str) -> Result<RunOutput, ToolError> {
        let (program, flag) = language.interpreter();
        let workdir = tempfile::tempdir().map_err(|e| ToolError::Runtime {
            exit_code: None,
            stderr: format!("Failed to create working directory: {}", e),
        })?;

        tracing::info!("Running {:?} snippet ({} bytes)", language, code.len());

        let mut child = Command::new(program)
            .arg(flag)
            .arg(code)
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::Runtime {
                exit_code: None,
                stderr: format!("Failed to start {}: {}", program, e),
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let collect = async {
            let (out, err) = tokio::join!(read_all(stdout), read_all(stderr));
            let status = child.wait().await;
            (out, err, status)
        };

        let outcome = tokio::time::timeout(self.timeout, collect).await;
        let (stdout, stderr, status) = match outcome {
            Ok(done) => done,
            Err(_) => {
                if let Err(e) = child.start_kill() {
                    tracing::warn!("Failed to kill timed out {} process: {}", program, e);
                }
                let _ = child.wait().await;
                return Err(ToolError::Timeout(self.timeout));
            }
        };

        let status = status.map_err(|e| ToolError::Runtime {
            exit_code: None,
            stderr: format!("Failed to wait for {}: {}", program, e),
        })?;

        if !status.success() {
            return Err(ToolError::Runtime {
                exit_code: status.code(),
                stderr,
            });
        }

        Ok(RunOutput {
            stdout,
            stderr,
            exit_code: status.code().unwrap_or(0),
        })
    }
}

async fn read_all<R>(pipe: Option<R>) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;

    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            tracing::warn!("Failed to read process output: {}", e);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[async_trait]
impl Tool for CodeRunner {
    fn name(&self) -> &str {
        "code_runner"
    }

    fn description(&self) -> &str {
        "Code runner that executes python and javascript snippets and returns stdout, stderr and the exit code. Execution is limited to a few seconds."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "language": {
                    "type": "string",
                    "enum": ["python", "javascript"],
                    "description": "Programming language of the snippet"
                },
                "code": {
                    "type": "string",
                    "description": "The code to execute"
                }
            },
            "required": ["language", "code"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: RunArgs = parse_args(args)?;
        let output = self.run(args.language, &args.code).await?;
        Ok(json!(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn runner() -> CodeRunner {
        CodeRunner::new(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn python_prints_result() {
        let output = runner().run(Language::Python, "print(2+2)").await.unwrap();
        assert!(output.stdout.contains('4'));
        assert_eq!(output.exit_code, 0);
    }

    #[tokio::test]
    async fn nonzero_exit_carries_stderr() {
        let err = runner()
            .run(Language::Python, "import sys\nsys.stderr.write('boom')\nsys.exit(3)")
            .await
            .unwrap_err();
        match err {
            ToolError::Runtime { exit_code, stderr } => {
                assert_eq!(exit_code, Some(3));
                assert!(stderr.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn infinite_loop_times_out() {
        let started = Instant::now();
        let err = runner()
            .run(Language::Python, "while True:\n    pass")
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::Timeout(d) if d == Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(8));
    }

    #[tokio::test]
    async fn unsupported_language_is_invalid_arguments() {
        let err = runner()
            .execute(json!({"language": "ruby", "code": "puts 1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn execute_returns_structured_output() {
        let value = runner()
            .execute(json!({"language": "python", "code": "print('hi')"}))
            .await
            .unwrap();
        assert_eq!(value["stdout"], "hi\n");
        assert_eq!(value["exit_code"], 0);
    }
}
