use parking_lot::Mutex;
use reminder_core::{CommandRegistry, CommandSpec, HostError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Commands typed on a line-oriented console.
#[derive(Debug, Default)]
pub struct ConsoleCommands {
    registered: Mutex<Vec<CommandSpec>>,
}

impl ConsoleCommands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registered(&self) -> Vec<CommandSpec> {
        self.registered.lock().clone()
    }

    /// Maps typed input to a registered command key. Accepts the key, the
    /// label, or the key's first word (`rescan` for `rescan-reminders`).
    pub fn resolve(&self, input: &str) -> Option<String> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        let registered = self.registered.lock();
        registered
            .iter()
            .find(|spec| {
                spec.key.eq_ignore_ascii_case(input)
                    || spec.label.eq_ignore_ascii_case(input)
                    || spec
                        .key
                        .split(['-', ':', ' '])
                        .next()
                        .is_some_and(|word| word.eq_ignore_ascii_case(input))
            })
            .map(|spec| spec.key.clone())
    }

    /// Forwards resolved command keys from `input` until it closes.
    pub async fn forward<R>(&self, input: R, commands: mpsc::Sender<String>)
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    warn!(%err, "command input failed");
                    break;
                }
            };
            match self.resolve(&line) {
                Some(key) => {
                    if commands.send(key).await.is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => println!("unknown command: {}", line.trim()),
            }
        }
        debug!("command input closed");
    }
}

impl CommandRegistry for ConsoleCommands {
    fn register(&self, spec: CommandSpec) -> Result<(), HostError> {
        let mut registered = self.registered.lock();
        if registered.iter().any(|known| known.key == spec.key) {
            return Err(HostError::Rejected(format!(
                "command {} is already registered",
                spec.key
            )));
        }
        info!(key = %spec.key, kind = ?spec.kind, "command registered");
        registered.push(spec);
        Ok(())
    }
}
