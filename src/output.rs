use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, ShowResult, SyncResult};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_sync(result: &SyncResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_show(result: &ShowResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Plain status lines on stdout.
pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn print_sync(result: &SyncResult) {
        println!("Destination: {}", result.destination);
        println!("Window: {}", result.window);
        println!("Fetched entries: {}", result.fetched);
        println!("Already present: {}", result.existing);
        println!("New entries: {}", result.new_entries.len());
        println!("Written: {}", result.written);
        if !result.failures.is_empty() {
            println!("Failed: {}", result.failures.len());
            for failure in &result.failures {
                println!("  entry {}: {}", failure.entry_id, failure.message);
            }
        }
    }

    pub fn print_show(result: &ShowResult) {
        println!("{} ({} rows)", result.destination, result.rows.len());
        for row in &result.rows {
            let date = row
                .date
                .map(|date| date.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{}\t{}\t{}\t{}\t{}\t{}",
                row.id,
                date,
                row.hours.unwrap_or(0.0),
                row.client.as_deref().unwrap_or("-"),
                row.project.as_deref().unwrap_or("-"),
                row.task.as_deref().unwrap_or("-"),
            );
        }
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => println!("{} ({} ms)", event.message, elapsed.as_millis()),
            None => println!("{}", event.message),
        }
    }
}
