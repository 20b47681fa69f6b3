use secrecy::ExposeSecret;
use tokio::process::Command;

use super::error::CommandError;
use super::{Invocation, ProcessRunner, execute};

/// Runs the tools through `<runtime> exec` inside the database container.
///
/// `exec` does not inherit the caller environment, so the invocation
/// environment is passed as explicit `-e KEY=VALUE` flags.
pub struct ContainerProcessRunner {
    runtime: String,
    container_id: String,
}

impl ContainerProcessRunner {
    pub fn new(runtime: String, container_id: String) -> Self {
        Self {
            runtime,
            container_id,
        }
    }

    pub(super) fn exec_args(&self, invocation: &Invocation) -> Vec<String> {
        let tool_args = invocation
            .container_args
            .as_ref()
            .unwrap_or(&invocation.args);

        let mut args = vec!["exec".to_owned()];
        for (key, value) in &invocation.env {
            args.push("-e".to_owned());
            args.push(format!("{key}={}", value.expose_secret()));
        }
        args.extend(["-i".to_owned(), self.container_id.to_owned()]);
        args.push(invocation.tool.to_owned());
        args.extend(tool_args.iter().cloned());
        args
    }
}

#[async_trait::async_trait]
impl ProcessRunner for ContainerProcessRunner {
    async fn run(&self, invocation: Invocation) -> Result<String, CommandError> {
        tracing::debug!(
            runtime = %self.runtime,
            container = %self.container_id,
            tool = %invocation.tool,
            args = ?invocation.container_args.as_ref().unwrap_or(&invocation.args),
            "Running tool in container"
        );

        let mut command = Command::new(&self.runtime);
        command.args(self.exec_args(&invocation));

        execute(command, &invocation).await
    }
}
