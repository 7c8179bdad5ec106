use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use relayrpc_codec::{to_json, Value};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }

    /// Whether stream chunks are printed as they arrive.
    pub fn is_incremental(self) -> bool {
        matches!(self, Self::Pretty | Self::Raw)
    }
}

#[derive(Serialize)]
pub struct CallOutput<'a> {
    pub function: &'a str,
    pub mode: &'a str,
    pub serialization: &'a str,
    pub peer_id: Option<&'a str>,
    pub elapsed_ms: u128,
    pub result: serde_json::Value,
}

pub fn print_call(out: &CallOutput<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FUNCTION", "MODE", "SERIALIZATION", "PEER", "MS", "RESULT"])
                .add_row(vec![
                    out.function.to_string(),
                    out.mode.to_string(),
                    out.serialization.to_string(),
                    out.peer_id.unwrap_or("-").to_string(),
                    out.elapsed_ms.to_string(),
                    out.result.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} ({} {}) -> {} in {}ms",
                out.function, out.mode, out.serialization, out.result, out.elapsed_ms
            );
        }
        OutputFormat::Raw => println!("{}", raw(&out.result)),
    }
}

/// One chunk of a streamed result, printed as it arrives.
pub fn print_chunk(index: usize, chunk: &Value, format: OutputFormat) {
    let rendered = render(chunk);
    match format {
        OutputFormat::Raw => println!("{}", raw(&rendered)),
        _ => println!("[{index}] {rendered}"),
    }
    let _ = std::io::stdout().flush();
}

#[derive(Serialize)]
struct ListeningOutput<'a> {
    event: &'static str,
    endpoint: &'a str,
    functions: Vec<&'a str>,
}

pub fn print_listening(endpoint: &str, functions: Vec<&str>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ListeningOutput {
            event: "listening",
            endpoint,
            functions,
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ENDPOINT", "FUNCTIONS"])
                .add_row(vec![endpoint.to_string(), functions.join(", ")]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("listening on {endpoint} ({})", functions.join(", ")),
        OutputFormat::Raw => println!("{endpoint}"),
    }
    let _ = std::io::stdout().flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

/// A JSON view of a value. Kinds JSON cannot hold are shown by their
/// display form.
pub fn render(value: &Value) -> serde_json::Value {
    match value {
        Value::Array(items) | Value::Set(items) => {
            serde_json::Value::Array(items.iter().map(render).collect())
        }
        Value::Object(entries) => serde_json::Value::Object(
            entries
                .iter()
                .map(|(key, item)| (key.clone(), render(item)))
                .collect(),
        ),
        Value::Map(entries) => serde_json::Value::Array(
            entries
                .iter()
                .map(|(key, item)| serde_json::Value::Array(vec![render(key), render(item)]))
                .collect(),
        ),
        Value::Url(url) => serde_json::Value::String(url.as_str().to_string()),
        other => to_json(other).unwrap_or_else(|_| serde_json::Value::String(other.to_string())),
    }
}

fn raw(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
