use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use muxfwd_tunnel::{ForwardEvent, StatsSnapshot};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct EventOutput<'a> {
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

pub fn print_event(event: &ForwardEvent, format: OutputFormat) {
    let out = match event {
        ForwardEvent::StreamOpened(id) => EventOutput {
            event: "stream-opened",
            stream_id: Some(*id),
            detail: None,
        },
        ForwardEvent::StreamClosed(id) => EventOutput {
            event: "stream-closed",
            stream_id: Some(*id),
            detail: None,
        },
        ForwardEvent::Ready => EventOutput {
            event: "ready",
            stream_id: None,
            detail: None,
        },
        ForwardEvent::Killed => EventOutput {
            event: "killed",
            stream_id: None,
            detail: None,
        },
        ForwardEvent::FatalError(err) => EventOutput {
            event: "fatal-error",
            stream_id: None,
            detail: Some(err.to_string()),
        },
    };
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            let mut line = format!("event={}", out.event);
            if let Some(id) = out.stream_id {
                line.push_str(&format!(" stream={id}"));
            }
            if let Some(detail) = &out.detail {
                line.push_str(&format!(" detail={detail:?}"));
            }
            println!("{line}");
        }
    }
}

#[derive(Serialize)]
struct StatsOutput {
    streams_opened: u64,
    streams_closed: u64,
    streams_refused: u64,
    frames_discarded: u64,
    bytes_to_transport: u64,
    bytes_from_transport: u64,
}

impl From<&StatsSnapshot> for StatsOutput {
    fn from(stats: &StatsSnapshot) -> Self {
        Self {
            streams_opened: stats.streams_opened,
            streams_closed: stats.streams_closed,
            streams_refused: stats.streams_refused,
            frames_discarded: stats.frames_discarded,
            bytes_to_transport: stats.bytes_to_transport,
            bytes_from_transport: stats.bytes_from_transport,
        }
    }
}

pub fn print_stats(stats: &StatsSnapshot, format: OutputFormat) {
    let out = StatsOutput::from(stats);
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METRIC", "VALUE"])
                .add_row(vec!["streams opened".to_string(), out.streams_opened.to_string()])
                .add_row(vec!["streams closed".to_string(), out.streams_closed.to_string()])
                .add_row(vec!["streams refused".to_string(), out.streams_refused.to_string()])
                .add_row(vec![
                    "frames discarded".to_string(),
                    out.frames_discarded.to_string(),
                ])
                .add_row(vec![
                    "bytes to transport".to_string(),
                    out.bytes_to_transport.to_string(),
                ])
                .add_row(vec![
                    "bytes from transport".to_string(),
                    out.bytes_from_transport.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "streams: {} opened, {} closed, {} refused",
                out.streams_opened, out.streams_closed, out.streams_refused
            );
            println!(
                "frames discarded: {}; bytes: {} out, {} in",
                out.frames_discarded, out.bytes_to_transport, out.bytes_from_transport
            );
        }
    }
}
