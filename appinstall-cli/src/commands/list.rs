//! `appinstall list`.

use appinstall::manager::download::format_bytes;
use appinstall::manager::{Affordance, InstallRecord, InstallState};

use crate::error::CliError;
use crate::runner::CliRunner;

const HEADERS: [&str; 5] = ["NAME", "STATE", "PROGRESS", "ACTION", "ID"];

pub fn run() -> Result<(), CliError> {
    let runner = CliRunner::new()?;
    runner.log_startup("list");

    let machine = runner.open_machine()?;
    let records = machine.records();
    if records.is_empty() {
        println!("No applications installed.");
        return Ok(());
    }

    let rows: Vec<[String; 5]> = records.iter().map(row).collect();
    print!("{}", format_table(&rows));
    Ok(())
}

fn row(record: &InstallRecord) -> [String; 5] {
    let state = match (record.state(), record.last_error()) {
        (InstallState::Error | InstallState::Unrecoverable, Some(kind)) => {
            format!("{} ({})", record.state(), kind.message_key())
        }
        (state, _) => state.to_string(),
    };
    [
        record.name().to_string(),
        state,
        progress(record),
        action(record.affordance()).to_string(),
        record.id().to_string(),
    ]
}

fn progress(record: &InstallRecord) -> String {
    match (record.state(), record.bytes_total()) {
        (InstallState::Ready, _) if record.package_url().is_none() => "-".to_string(),
        (_, Some(total)) => format!(
            "{} / {}",
            format_bytes(record.bytes_transferred()),
            format_bytes(total)
        ),
        (_, None) if record.bytes_transferred() > 0 => format_bytes(record.bytes_transferred()),
        (_, None) => "-".to_string(),
    }
}

fn action(affordance: Affordance) -> &'static str {
    match affordance {
        Affordance::Launch => "launch",
        Affordance::CancelDownload => "cancel",
        Affordance::Resume => "resume",
        Affordance::Uninstall => "uninstall",
    }
}

fn format_table(rows: &[[String; 5]]) -> String {
    let mut widths = HEADERS.map(str::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let line = |cells: Vec<&str>, out: &mut String| {
        let padded: Vec<String> = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect();
        out.push_str(padded.join("  ").trim_end());
        out.push('\n');
    };

    line(HEADERS.to_vec(), &mut out);
    let rules: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    line(rules.iter().map(String::as_str).collect(), &mut out);
    for row in rows {
        line(row.iter().map(String::as_str).collect(), &mut out);
    }
    out
}
