use secrecy::ExposeSecret;
use tokio::process::Command;

use super::error::CommandError;
use super::{Invocation, ProcessRunner, execute};

/// Runs the tools as local processes with the credentials in their environment.
pub struct DirectProcessRunner;

#[async_trait::async_trait]
impl ProcessRunner for DirectProcessRunner {
    async fn run(&self, invocation: Invocation) -> Result<String, CommandError> {
        tracing::debug!(tool = %invocation.tool, args = ?invocation.args, "Running tool");

        let mut command = Command::new(&invocation.tool);
        command.args(&invocation.args).envs(
            invocation
                .env
                .iter()
                .map(|(key, value)| (key, value.expose_secret())),
        );

        execute(command, &invocation).await
    }
}
