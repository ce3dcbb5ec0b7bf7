use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use vfuse_proto::{Attr, DirEntry, Timespec};

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
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
}

#[derive(Serialize)]
struct StatOutput<'a> {
    path: &'a str,
    kind: &'static str,
    mode: String,
    size: u64,
    nlink: u64,
    atime: Timespec,
    mtime: Timespec,
}

#[derive(Serialize)]
struct EntryOutput<'a> {
    name: &'a str,
    kind: &'static str,
    mode: String,
}

#[derive(Serialize)]
struct ListOutput<'a> {
    path: &'a str,
    entries: Vec<EntryOutput<'a>>,
}

#[derive(Serialize)]
struct LinkOutput<'a> {
    path: &'a str,
    target: &'a str,
}

#[derive(Serialize)]
struct DataOutput<'a> {
    path: &'a str,
    size: usize,
    data: String,
}

pub fn print_attr(path: &str, attr: &Attr, format: OutputFormat) {
    let out = StatOutput {
        path,
        kind: file_kind(attr.mode),
        mode: format!("{:o}", attr.mode),
        size: attr.size,
        nlink: attr.nlink,
        atime: attr.atime,
        mtime: attr.mtime,
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = new_table(vec!["PATH", "KIND", "MODE", "SIZE", "NLINK", "MTIME"]);
            table.add_row(vec![
                out.path.to_string(),
                out.kind.to_string(),
                out.mode.clone(),
                out.size.to_string(),
                out.nlink.to_string(),
                format_time(out.mtime),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("File Info:");
            println!("  Path:     {}", out.path);
            println!("  Kind:     {}", out.kind);
            println!("  Mode:     {}", out.mode);
            println!("  Size:     {}", out.size);
            println!("  Links:    {}", out.nlink);
            println!("  Accessed: {}", format_time(out.atime));
            println!("  Modified: {}", format_time(out.mtime));
        }
        OutputFormat::Raw => println!("{}", out.size),
    }
}

pub fn print_entries(path: &str, entries: &[DirEntry], format: OutputFormat) {
    let out = ListOutput {
        path,
        entries: entries
            .iter()
            .map(|entry| EntryOutput {
                name: &entry.name,
                kind: file_kind(entry.mode),
                mode: format!("{:o}", entry.mode),
            })
            .collect(),
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = new_table(vec!["NAME", "KIND", "MODE"]);
            for entry in &out.entries {
                table.add_row(vec![
                    entry.name.to_string(),
                    entry.kind.to_string(),
                    entry.mode.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for entry in &out.entries {
                println!("{:>7} {:<9} {}", entry.mode, entry.kind, entry.name);
            }
        }
        OutputFormat::Raw => {
            for entry in &out.entries {
                println!("{}", entry.name);
            }
        }
    }
}

pub fn print_link(path: &str, target: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&LinkOutput { path, target }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["PATH", "TARGET"]);
            table.add_row(vec![path.to_string(), target.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{path} -> {target}"),
        OutputFormat::Raw => println!("{target}"),
    }
}

pub fn print_data(path: &str, data: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&DataOutput {
            path,
            size: data.len(),
            data: payload_preview(data),
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["PATH", "SIZE", "DATA"]);
            table.add_row(vec![
                path.to_string(),
                data.len().to_string(),
                payload_preview(data),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => print_raw(data),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Short name for the `S_IF*` bits of `mode`.
pub fn file_kind(mode: u32) -> &'static str {
    match mode & 0o170000 {
        0o040000 => "dir",
        0o100000 => "file",
        0o120000 => "symlink",
        0o010000 => "fifo",
        0o020000 => "char",
        0o060000 => "block",
        0o140000 => "socket",
        _ => "unknown",
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn format_time(ts: Timespec) -> String {
    format!("{}.{:09}", ts.sec, ts.nsec)
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}
