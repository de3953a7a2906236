use std::fs::File;
use std::os::unix::io::{FromRawFd, IntoRawFd};
use std::path::Path;
use std::process::{Child, Command, Stdio};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use common::id::ActorId;
use common::Config;
use errors::Result;

/// Build the command line for a worker process from the configured argv
/// template. The sockets and cluster addresses travel in the
/// environment, so the template stays free of positional plumbing.
pub fn worker_command(config: &Config, actor: Option<&ActorId>) -> Result<Command> {
    if config.worker_command.is_empty() {
        bail!("no worker command configured, cannot spawn workers");
    }
    let mut command = Command::new(&config.worker_command[0]);
    command
        .args(&config.worker_command[1..])
        .env("SLEET_SCHEDULER_SOCKET", &config.scheduler_socket)
        .env("SLEET_STORE_SOCKET", &config.store_socket)
        .env("SLEET_MANAGER_SOCKET", &config.manager_socket)
        .env("SLEET_REDIS_ADDRESS", &config.redis_address)
        .env("SLEET_NODE_IP", &config.node_ip);
    if let Some(actor) = actor {
        command.env("SLEET_ACTOR_ID", format!("{}", actor));
    }
    Ok(command)
}

/// A spawned worker subprocess that has not necessarily registered yet.
/// Wrapper over `std::process::Child` with a name used for its log
/// files in the log directory.
pub struct Process {
    name: String,
    child: Child,
}

impl Process {
    pub fn spawn(log_dir: &Path, name: &str, command: &mut Command) -> Result<Self> {
        let log_out = File::create(log_dir.join(format!("{}.out", name)))?.into_raw_fd();
        let log_err = File::create(log_dir.join(format!("{}.err", name)))?.into_raw_fd();

        let log_out_pipe = unsafe { Stdio::from_raw_fd(log_out) };
        let log_err_pipe = unsafe { Stdio::from_raw_fd(log_err) };

        command.stdout(log_out_pipe);
        command.stderr(log_err_pipe);

        Ok(Self {
            name: name.to_string(),
            child: command.spawn()?,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// SIGKILL and reap; the process is gone when this returns.
    pub fn kill(&mut self) -> Result<()> {
        self.child.kill()?;
        self.child.wait()?;
        debug!("process '{}' killed", self.name);
        Ok(())
    }

    /// SIGTERM; the process may linger while it shuts down.
    pub fn terminate(&mut self) -> Result<()> {
        kill(Pid::from_raw(self.child.id() as i32), Signal::SIGTERM)
            .map_err(|e| format!("cannot signal process '{}': {}", self.name, e))?;
        self.child.try_wait()?;
        Ok(())
    }
}
