//! Shared test support: a scripted connector that stands in for the SSH
//! transport, and fixtures built on it.


use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use crate::{
    config::{Device, Inventory},
    ssh::{ConnectionParams, Connector, RunOptions, Session, SshError},
};

/// One command as seen by a scripted session.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RecordedCommand {
    pub host: String,
    pub command: String,
    pub expect_string: Option<String>,
}

#[derive(Default)]
struct ScriptState {
    responses: HashMap<(String, String), String>,
    failing_opens: HashSet<String>,
    failing_open_attempts: HashSet<usize>,
    failing_commands: HashSet<(String, String)>,
    command_delay: Option<Duration>,
    opened: Vec<ConnectionParams>,
    commands: Vec<RecordedCommand>,
    closed: usize,
    active: usize,
    max_active: usize,
}

/// Replies to `(host, command)` pairs from a script; unscripted commands
/// return empty output. Clones share their script and their records.
#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    state: Arc<Mutex<ScriptState>>,
}

impl MockConnector {
    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn respond(&self, host: &str, command: &str, output: &str) -> &Self {
        self.lock()
            .responses
            .insert((host.to_string(), command.to_string()), output.to_string());
        self
    }

    pub fn fail_open(&self, host: &str) -> &Self {
        self.lock().failing_opens.insert(host.to_string());
        self
    }

    /// The `attempt`th open (counting from 1, across all hosts) is refused
    pub fn fail_nth_open(&self, attempt: usize) -> &Self {
        self.lock().failing_open_attempts.insert(attempt);
        self
    }

    pub fn fail_command(&self, host: &str, command: &str) -> &Self {
        self.lock()
            .failing_commands
            .insert((host.to_string(), command.to_string()));
        self
    }

    /// Every command takes this long to answer
    pub fn delay_commands(&self, delay: Duration) -> &Self {
        self.lock().command_delay = Some(delay);
        self
    }

    pub fn opened_params(&self) -> Vec<ConnectionParams> {
        self.lock().opened.clone()
    }

    pub fn closed_sessions(&self) -> usize {
        self.lock().closed
    }

    /// Highest number of sessions that were open at the same time
    pub fn max_concurrent_sessions(&self) -> usize {
        self.lock().max_active
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.lock().commands.clone()
    }

    pub fn times_run(&self, host: &str, command: &str) -> usize {
        self.lock()
            .commands
            .iter()
            .filter(|c| c.host == host && c.command == command)
            .count()
    }
}

impl Connector for MockConnector {
    type Session = MockSession;

    #[allow(clippy::manual_async_fn)]
    fn open(
        &self,
        params: &ConnectionParams,
    ) -> impl std::future::Future<Output = Result<MockSession, SshError>> + Send {
        let params = params.clone();
        let connector = self.clone();
        async move {
            let mut state = connector.lock();
            state.opened.push(params.clone());
            let attempt = state.opened.len();
            if state.failing_opens.contains(&params.host)
                || state.failing_open_attempts.contains(&attempt)
            {
                return Err(SshError::Connection(format!(
                    "{}: connection refused",
                    params.address()
                )));
            }
            state.active += 1;
            state.max_active = state.max_active.max(state.active);
            drop(state);
            Ok(MockSession {
                host: params.host,
                connector,
            })
        }
    }
}

pub(crate) struct MockSession {
    host: String,
    connector: MockConnector,
}

impl Session for MockSession {
    #[allow(clippy::manual_async_fn)]
    fn run(
        &mut self,
        command: &str,
        options: &RunOptions,
    ) -> impl std::future::Future<Output = Result<String, SshError>> + Send {
        let command = command.to_string();
        let expect_string = options.expect_string.clone();
        async move {
            let delay = {
                let mut state = self.connector.lock();
                state.commands.push(RecordedCommand {
                    host: self.host.clone(),
                    command: command.clone(),
                    expect_string,
                });
                state.command_delay
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let state = self.connector.lock();
            let key = (self.host.clone(), command);
            if state.failing_commands.contains(&key) {
                return Err(SshError::Command(format!("'{}' failed on {}", key.1, key.0)));
            }
            Ok(state.responses.get(&key).cloned().unwrap_or_default())
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn close(self) -> impl std::future::Future<Output = ()> + Send {
        async move {
            let mut state = self.connector.lock();
            state.closed += 1;
            state.active = state.active.saturating_sub(1);
        }
    }
}

pub(crate) fn fixture_device(name: &str, host: &str) -> Device {
    Device::new(Some(name), host, "cisco_ios")
}

/// Site `hq`: an NX-OS central switch at 10.0.0.1 and three access switches.
/// `sw-access-3` is listed under a name that differs from its CDP name, and
/// `sw-lobby` carries a host equal to another switch's CDP name.
pub(crate) const FIXTURE_INVENTORY: &str = r#"
connection_defaults:
  username: netops
  password: hunter2
  device_type: cisco_ios
sites:
  - name: hq
    description: Headquarters
    central_switch:
      host: 10.0.0.1
      device_type: cisco_nxos
    access_switches:
      - name: sw-floor1
        host: 10.0.0.4
      - name: closet-b
        host: 10.0.0.5
        rack: B2
      - name: sw-lobby
        host: sw-access-7
  - name: branch
    central_switch:
      host: 10.1.0.1
"#;

pub(crate) fn fixture_inventory() -> Inventory {
    match Inventory::from_yaml(FIXTURE_INVENTORY) {
        Ok(inventory) => inventory,
        Err(err) => panic!("fixture inventory should parse: {err}"),
    }
}
