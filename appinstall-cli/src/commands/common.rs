//! Following a record until its transfer settles.

use std::sync::mpsc as std_mpsc;
use std::sync::Arc;

use appinstall::events::{InstallEvent, SubscriptionId, Topic};
use appinstall::manager::download::format_bytes;
use appinstall::manager::{InstallRecord, InstallState, InstallStateMachine, ManagerError};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Event subscription opened before a command runs, so no event is missed.
pub struct Watch {
    subscription: SubscriptionId,
    events: mpsc::UnboundedReceiver<InstallEvent>,
}

impl Watch {
    pub fn open(machine: &InstallStateMachine) -> Self {
        let (subscription, events) = machine.bus().subscribe_channel(Topic::All);
        Self {
            subscription,
            events,
        }
    }

    /// Render progress for `record` until it leaves the active states.
    ///
    /// Ctrl-C pauses the transfer instead of killing the process, so the
    /// download can be resumed later from where it stopped.
    pub fn follow(
        mut self,
        runner: &CliRunner,
        machine: &Arc<InstallStateMachine>,
        record: InstallRecord,
    ) -> Result<InstallRecord, CliError> {
        let (interrupt_tx, interrupt_rx) = std_mpsc::channel::<()>();
        ctrlc::set_handler(move || {
            let _ = interrupt_tx.send(());
        })
        .map_err(|e| CliError::Signal(e.to_string()))?;

        let (ctrlc_tx, mut ctrlc_rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            while interrupt_rx.recv().is_ok() {
                if ctrlc_tx.send(()).is_err() {
                    break;
                }
            }
        });

        let id = record.id().clone();
        let bar = progress_bar(&record);
        let mut state = record.state();

        let outcome = runner.block_on(async {
            while state.is_active() {
                tokio::select! {
                    Some(()) = ctrlc_rx.recv() => {
                        bar.set_message("pausing");
                        return machine.pause(&id).await.map_err(CliError::from);
                    }
                    event = self.events.recv() => match event {
                        Some(InstallEvent::Removed { id: removed }) if removed == id => break,
                        Some(event) if event.id() == &id => {
                            if let Some(next) = apply(&bar, event) {
                                state = next;
                            }
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
            machine
                .record(&id)
                .ok_or_else(|| CliError::from(ManagerError::NotFound { id: id.clone() }))
        });

        machine.bus().unsubscribe(self.subscription);
        match &outcome {
            Ok(record) if record.state() == InstallState::Ready => bar.finish_with_message("done"),
            Ok(record) => bar.abandon_with_message(record.state().to_string()),
            Err(_) => bar.abandon(),
        }
        outcome
    }
}

fn progress_bar(record: &InstallRecord) -> ProgressBar {
    let bar = match record.bytes_total() {
        Some(total) => ProgressBar::new(total),
        None => ProgressBar::new_spinner(),
    };
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner} {bar:40.cyan/blue} {bytes}/{total_bytes} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    bar.set_position(record.bytes_transferred());
    bar.set_message(record.state().to_string());
    bar
}

/// Update the bar from one event. Returns the new state on a state change.
fn apply(bar: &ProgressBar, event: InstallEvent) -> Option<InstallState> {
    match event {
        InstallEvent::Progress {
            bytes_transferred,
            bytes_total,
            ..
        } => {
            if let Some(total) = bytes_total {
                bar.set_length(total);
            }
            bar.set_position(bytes_transferred);
            None
        }
        InstallEvent::StateChanged { current, .. } => {
            bar.set_message(current.to_string());
            Some(current)
        }
        InstallEvent::Added { .. }
        | InstallEvent::IconUpdated { .. }
        | InstallEvent::Removed { .. } => None,
    }
}

/// One-line outcome for a record after a command.
pub fn report(record: &InstallRecord) {
    let state = record.state();
    let label = match state {
        InstallState::Ready => style(state.to_string()).green(),
        InstallState::Paused => style(state.to_string()).yellow(),
        InstallState::Error | InstallState::Unrecoverable => style(state.to_string()).red(),
        InstallState::Pending | InstallState::Downloading => style(state.to_string()).cyan(),
    };
    println!("{} {}", label, record.name());
    println!("  id: {}", record.id());

    match state {
        InstallState::Paused => println!(
            "  stopped at {}; continue with: appinstall resume {}",
            format_bytes(record.bytes_transferred()),
            record.id()
        ),
        InstallState::Error => {
            if let Some(kind) = record.last_error() {
                println!("  {} ({})", kind.message_key(), kind);
            }
            println!("  retry with: appinstall resume {}", record.id());
        }
        InstallState::Unrecoverable => {
            if let Some(kind) = record.last_error() {
                println!("  {} ({})", kind.message_key(), kind);
            }
            println!("  remove with: appinstall uninstall {}", record.id());
        }
        _ => {}
    }
}
