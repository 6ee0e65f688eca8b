//! Line-oriented console transport.
//!
//! Each input line is `<user_id> <message>`. A message starting with `@` is a button
//! press carrying the rest as payload, `#YYYY-MM-DD` is a calendar pick, anything else is
//! typed text (slash commands included). Replies are printed as `<user_id> > <text>`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;
use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bot::{ConversationMachine, Event};
use crate::logutil::escape_log;
use crate::metrics;
use crate::storage::UserId;

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Parse one console line. Blank lines and `;` comments yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<(UserId, Event)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(';') {
        return Ok(None);
    }
    let (id, message) = line
        .split_once(char::is_whitespace)
        .ok_or_else(|| "expected '<user_id> <message>'".to_string())?;
    let user_id: UserId = id
        .parse()
        .map_err(|_| format!("invalid user id '{}'", escape_log(id)))?;
    let message = message.trim();

    let event = if let Some(data) = message.strip_prefix('@') {
        Event::Choice(data.trim().to_string())
    } else if let Some(date) = message.strip_prefix('#') {
        let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|_| format!("invalid date '{}', use #YYYY-MM-DD", escape_log(date)))?;
        Event::Date(date)
    } else {
        Event::from_text(message)
    };
    Ok(Some((user_id, event)))
}

struct UserQueue {
    tx: mpsc::UnboundedSender<Event>,
    worker: JoinHandle<()>,
}

/// Hands each user's events to a worker task of their own, so one slow conversation never
/// holds up another while a single user's events keep their order. Rendered reply lines go
/// to `output`.
pub struct UserQueues {
    machine: Arc<ConversationMachine>,
    output: mpsc::UnboundedSender<String>,
    queues: HashMap<UserId, UserQueue>,
}

impl UserQueues {
    pub fn new(machine: Arc<ConversationMachine>, output: mpsc::UnboundedSender<String>) -> Self {
        Self {
            machine,
            output,
            queues: HashMap::new(),
        }
    }

    pub fn dispatch(&mut self, user_id: UserId, event: Event) {
        let event = match self.queues.get(&user_id) {
            Some(queue) => match queue.tx.send(event) {
                Ok(()) => return,
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };
        let queue = self.spawn_worker(user_id);
        if queue.tx.send(event).is_err() {
            warn!("console: worker for user {} exited early", user_id);
        }
        self.queues.insert(user_id, queue);
    }

    fn spawn_worker(&self, user_id: UserId) -> UserQueue {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let machine = self.machine.clone();
        let output = self.output.clone();
        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                for directive in machine.handle(user_id, event).await {
                    for text_line in directive.render_plain().lines() {
                        let _ = output.send(format!("{} > {}", user_id, text_line));
                    }
                }
            }
        });
        UserQueue { tx, worker }
    }

    /// Stop the workers of users whose conversation state was pruned. Queued events are
    /// still handled before a worker exits.
    pub fn retire_pruned(&mut self) -> usize {
        let before = self.queues.len();
        let sessions = self.machine.sessions();
        self.queues.retain(|user_id, _| sessions.contains(*user_id));
        before - self.queues.len()
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Let every worker drain its queue, then return.
    pub async fn shutdown(self) {
        for (user_id, queue) in self.queues {
            drop(queue.tx);
            if let Err(e) = queue.worker.await {
                warn!("console: worker for user {} failed: {}", user_id, e);
            }
        }
    }
}

/// Read events from stdin until EOF or Ctrl-C.
pub async fn run(machine: Arc<ConversationMachine>, max_idle: chrono::Duration) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut prune = tokio::time::interval(PRUNE_INTERVAL);
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        while let Some(line) = out_rx.recv().await {
            println!("{}", line);
        }
    });
    let mut queues = UserQueues::new(machine.clone(), out_tx);
    info!("Console transport ready; type '<user_id> <message>'");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Console input closed");
                    break;
                };
                match parse_line(&line) {
                    Ok(Some((user_id, event))) => queues.dispatch(user_id, event),
                    Ok(None) => {}
                    Err(e) => warn!("console: {}", e),
                }
            }
            _ = prune.tick() => {
                let pruned = machine.prune_idle(max_idle);
                let retired = queues.retire_pruned();
                if pruned > 0 || retired > 0 {
                    debug!(
                        "pruned {} idle conversations, retired {} workers, {} still active",
                        pruned,
                        retired,
                        machine.sessions().active_count()
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    queues.shutdown().await;
    if let Err(e) = printer.await {
        warn!("console: output task failed: {}", e);
    }
    info!(
        "console stopped with {} conversations in a workflow",
        machine.sessions().active_count()
    );
    for (slug, c) in metrics::workflow_counters_snapshot() {
        info!(
            "workflow.totals workflow={} entries={} exits={} active={} peak={}",
            slug, c.entries, c.exits, c.currently_active, c.concurrent_peak
        );
    }
    Ok(())
}
