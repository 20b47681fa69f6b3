//! Construction and execution of external tool invocations.
//!
//! Arguments are declared as templates like `--host=:host -d :database`. The
//! template is split on whitespace into argument tokens first and the
//! `:name` placeholders are substituted afterwards, so a substituted value is
//! always exactly one argument and is never interpreted by a shell.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use secrecy::SecretString;
use tokio::process::Command;

use self::container::ContainerProcessRunner;
use self::direct::DirectProcessRunner;
use self::error::CommandError;
use crate::config::core_config::ContainerConfig;

pub mod container;
pub mod direct;
pub mod error;

#[cfg(test)]
mod test;

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait::async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Runs the invocation to completion and returns its captured stdout.
    ///
    /// A non-zero exit is an error unless the invocation tolerates failure.
    async fn run(&self, invocation: Invocation) -> Result<String, CommandError>;
}

pub fn process_runner_from_config(container: Option<&ContainerConfig>) -> Arc<dyn ProcessRunner> {
    match container.and_then(|config| config.container_id().map(|id| (config, id))) {
        Some((config, container_id)) => Arc::new(ContainerProcessRunner::new(
            config.runtime.to_owned(),
            container_id.to_owned(),
        )),
        None => Arc::new(DirectProcessRunner),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandParams(BTreeMap<String, String>);

impl CommandParams {
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CommandParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StdoutTarget {
    #[default]
    Capture,
    File(PathBuf),
}

/// Fully resolved invocation, ready to be handed to a [`ProcessRunner`].
#[derive(Debug, Clone)]
pub struct Invocation {
    pub tool: String,
    pub args: Vec<String>,
    /// Arguments to use instead of `args` when running inside a container.
    pub container_args: Option<Vec<String>>,
    pub env: BTreeMap<String, SecretString>,
    pub stdin: Option<PathBuf>,
    pub stdout: StdoutTarget,
    pub tolerate_failure: bool,
}

#[derive(Debug, Clone)]
pub struct CommandLine {
    tool: String,
    template: ArgTemplate,
    container_template: Option<ArgTemplate>,
    extra_args: Vec<String>,
    env: BTreeMap<String, SecretString>,
    stdin: Option<PathBuf>,
    stdout: StdoutTarget,
    tolerate_failure: bool,
}

impl CommandLine {
    pub fn new(tool: impl Into<String>, template: &str) -> Self {
        Self {
            tool: tool.into(),
            template: ArgTemplate::parse(template),
            container_template: None,
            extra_args: vec![],
            env: BTreeMap::new(),
            stdin: None,
            stdout: StdoutTarget::Capture,
            tolerate_failure: false,
        }
    }

    /// Alternative template used when the tool runs inside a container,
    /// typically because host paths are not visible there.
    pub fn container_template(mut self, template: &str) -> Self {
        self.container_template = Some(ArgTemplate::parse(template));
        self
    }

    /// Literal arguments appended after the template, never parsed for placeholders.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs(mut self, env: BTreeMap<String, SecretString>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn stdin(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = StdoutTarget::File(path.into());
        self
    }

    pub fn tolerate_failure(mut self) -> Self {
        self.tolerate_failure = true;
        self
    }

    pub fn build(&self, params: &CommandParams) -> Result<Invocation, CommandError> {
        let args = self.resolve(&self.template, params)?;
        let container_args = self
            .container_template
            .as_ref()
            .map(|template| self.resolve(template, params))
            .transpose()?;

        Ok(Invocation {
            tool: self.tool.to_owned(),
            args,
            container_args,
            env: self.env.clone(),
            stdin: self.stdin.clone(),
            stdout: self.stdout.clone(),
            tolerate_failure: self.tolerate_failure,
        })
    }

    fn resolve(
        &self,
        template: &ArgTemplate,
        params: &CommandParams,
    ) -> Result<Vec<String>, CommandError> {
        let mut args = template.resolve(params).map_err(|placeholder| {
            CommandError::UnresolvedPlaceholder {
                tool: self.tool.to_owned(),
                placeholder,
            }
        })?;
        args.extend(self.extra_args.iter().cloned());
        Ok(args)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ArgTemplate {
    tokens: Vec<Vec<Segment>>,
}

impl ArgTemplate {
    fn parse(template: &str) -> Self {
        Self {
            tokens: template.split_whitespace().map(parse_token).collect(),
        }
    }

    /// Returns the name of the first placeholder without a value on failure.
    fn resolve(&self, params: &CommandParams) -> Result<Vec<String>, String> {
        self.tokens
            .iter()
            .map(|segments| {
                segments
                    .iter()
                    .try_fold(String::new(), |mut arg, segment| {
                        match segment {
                            Segment::Literal(literal) => arg.push_str(literal),
                            Segment::Placeholder(name) => {
                                arg.push_str(params.get(name).ok_or_else(|| name.to_owned())?)
                            }
                        }
                        Ok::<_, String>(arg)
                    })
            })
            .collect()
    }
}

fn parse_token(token: &str) -> Vec<Segment> {
    let mut segments = vec![];
    let mut literal = String::new();
    let mut chars = token.chars().peekable();

    while let Some(c) = chars.next() {
        let starts_placeholder = c == ':'
            && chars
                .peek()
                .is_some_and(|next| next.is_ascii_lowercase() || *next == '_');

        if !starts_placeholder {
            literal.push(c);
            continue;
        }

        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            if !(next.is_ascii_alphanumeric() || next == '_') {
                break;
            }
            name.push(next);
            chars.next();
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Placeholder(name));
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    segments
}

/// Spawns `command` with the stdio wiring of `invocation` and waits for it.
pub(crate) async fn execute(
    mut command: Command,
    invocation: &Invocation,
) -> Result<String, CommandError> {
    let tool = &invocation.tool;
    let io_error = |source| CommandError::Io {
        tool: tool.to_owned(),
        source,
    };

    command.kill_on_drop(true).stderr(Stdio::piped());

    match &invocation.stdin {
        Some(path) => {
            let file = tokio::fs::File::open(path).await.map_err(io_error)?;
            command.stdin(file.into_std().await);
        }
        None => {
            command.stdin(Stdio::null());
        }
    }

    match &invocation.stdout {
        StdoutTarget::Capture => {
            command.stdout(Stdio::piped());
        }
        StdoutTarget::File(path) => {
            let file = tokio::fs::File::create(path).await.map_err(io_error)?;
            command.stdout(file.into_std().await);
        }
    }

    let output = match command.spawn() {
        Ok(child) => child.wait_with_output().await.map_err(io_error),
        Err(source) => Err(CommandError::Spawn {
            tool: tool.to_owned(),
            source,
        }),
    };

    let output = match output {
        Ok(output) if output.status.success() => output,
        Ok(output) if !invocation.tolerate_failure => {
            return Err(CommandError::Failed {
                tool: tool.to_owned(),
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Err(error) if !invocation.tolerate_failure => return Err(error),
        Ok(output) => {
            tracing::warn!(%tool, exit_code = ?output.status.code(), "Ignoring failed tool run");
            output
        }
        Err(error) => {
            tracing::warn!(%tool, %error, "Ignoring failed tool run");
            return Ok(String::new());
        }
    };

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
