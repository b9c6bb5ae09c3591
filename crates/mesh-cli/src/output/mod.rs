//! Output formatting utilities for the CLI
//!
//! Colored status lines, the rendering of orchestrator events, and the
//! tables shown by `mesh clusters` and `mesh watch`.

use std::time::{SystemTime, UNIX_EPOCH};

use crossterm::style::{Color, Stylize};
use tabled::{settings::Style, Table, Tabled};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use mesh_core::config::ClusterMap;
use mesh_orchestrator::pipeline::ClusterTpuMetrics;
use mesh_orchestrator::FanOutEvent;

/// How an event line is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Success,
    Error,
    Warning,
    Info,
}

/// Format a list of clusters as an ASCII table
pub fn format_clusters(clusters: &ClusterMap) -> String {
    if clusters.is_empty() {
        return "No clusters configured".to_string();
    }

    #[derive(Tabled)]
    struct ClusterRow {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "USER")]
        user: String,
        #[tabled(rename = "PORT")]
        port: u16,
        #[tabled(rename = "HOSTS")]
        count: usize,
        #[tabled(rename = "ADDRESSES")]
        addresses: String,
    }

    let rows: Vec<ClusterRow> = clusters
        .iter()
        .map(|c| ClusterRow {
            name: c.name.clone(),
            user: c.user.clone(),
            port: c.port,
            count: c.hosts.len(),
            addresses: c
                .hosts
                .iter()
                .map(|h| h.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// The line shown for an orchestrator event, if any
pub fn format_event(event: &FanOutEvent) -> Option<(Tone, String)> {
    match event {
        // Commands print their own header
        FanOutEvent::Started { .. } => None,
        FanOutEvent::HostProgress { host, message } => {
            Some((Tone::Success, format!("[{}] {}", host, message)))
        }
        FanOutEvent::HostSucceeded { host, operation } => {
            Some((Tone::Success, format!("[{}] {} completed", host, operation)))
        }
        FanOutEvent::HostFailed {
            host,
            operation,
            reason,
        } => Some((Tone::Error, format!("[{}] {} failed: {}", host, operation, reason))),
        FanOutEvent::Interrupted => Some((
            Tone::Warning,
            "Interrupt received, cancelling all hosts...".to_string(),
        )),
        FanOutEvent::Finished {
            failures: 0, ..
        } => None,
        FanOutEvent::Finished {
            operation,
            failures,
            total,
        } => Some((
            Tone::Warning,
            format!("{} failed on {} of {} hosts", operation, failures, total),
        )),
    }
}

pub fn print_event(event: &FanOutEvent) {
    if let Some((tone, line)) = format_event(event) {
        match tone {
            Tone::Success => print_success(&line),
            Tone::Error => print_error(&line),
            Tone::Warning => print_warning(&line),
            Tone::Info => print_info(&line),
        }
    }
}

/// Print events until every sender is dropped
pub fn spawn_event_printer(mut rx: UnboundedReceiver<FanOutEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    })
}

/// Color for a utilization percentage
pub fn utilization_color(pct: f64) -> Color {
    if pct >= 90.0 {
        Color::Red
    } else if pct >= 70.0 {
        Color::Yellow
    } else if pct >= 40.0 {
        Color::Green
    } else {
        Color::Cyan
    }
}

/// Activity label for a host's average utilization
pub fn status_label(utilization: f64) -> &'static str {
    if utilization >= 80.0 {
        "● active"
    } else if utilization >= 10.0 {
        "◐ partial"
    } else {
        "○ idle"
    }
}

/// Print the cluster-wide block of the watch dashboard
pub fn print_summary(m: &ClusterTpuMetrics) {
    let memory_pct = m.memory_utilization_pct();

    println!("{}", "Cluster Summary".bold().with(Color::Cyan));
    println!("  Total Chips:     {}", m.total_chips.to_string().bold());
    println!(
        "  Avg Utilization: {}",
        format!("{:.1}%", m.avg_utilization).with(utilization_color(m.avg_utilization))
    );
    println!(
        "  Memory Usage:    {:.1} / {:.1} GB ({})",
        m.used_memory_gb,
        m.total_memory_gb,
        format!("{:.1}%", memory_pct).with(utilization_color(memory_pct))
    );
    let mut hosts = format!(
        "  Active Hosts:    {} / {}",
        m.active_hosts.to_string().with(Color::Green),
        m.total_hosts()
    );
    if m.error_hosts > 0 {
        let label = if m.error_hosts == 1 { "error" } else { "errors" };
        hosts.push_str(&format!(
            " ({})",
            format!("{} {}", m.error_hosts, label).with(Color::Red)
        ));
    }
    println!("{}\n", hosts);
}

/// Per-host table of the watch dashboard, sorted by host
pub fn format_host_table(m: &ClusterTpuMetrics) -> String {
    if m.hosts.is_empty() {
        return "No hosts".to_string();
    }

    #[derive(Tabled)]
    struct HostRow {
        #[tabled(rename = "HOST")]
        host: String,
        #[tabled(rename = "CHIPS")]
        chips: String,
        #[tabled(rename = "TYPE")]
        chip_type: String,
        #[tabled(rename = "UTIL")]
        util: String,
        #[tabled(rename = "MEMORY")]
        memory: String,
        #[tabled(rename = "STATUS")]
        status: String,
    }

    let rows: Vec<HostRow> = m
        .hosts
        .iter()
        .map(|(host, metrics)| match &metrics.error {
            Some(error) => HostRow {
                host: host.to_string(),
                chips: "-".to_string(),
                chip_type: "-".to_string(),
                util: "-".to_string(),
                memory: "-".to_string(),
                status: error.clone(),
            },
            None => {
                let util = metrics.avg_utilization();
                HostRow {
                    host: host.to_string(),
                    chips: metrics.chip_count.to_string(),
                    chip_type: metrics.chip_type.clone(),
                    util: format!("{:.1}%", util),
                    memory: format!(
                        "{:.1}/{:.1} GB",
                        metrics.memory_usage_gb(),
                        metrics.total_memory_gb()
                    ),
                    status: status_label(util).to_string(),
                }
            }
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Current time of day, UTC
pub fn wall_clock() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let day = secs % 86_400;
    format!("{:02}:{:02}:{:02} UTC", day / 3600, day % 3600 / 60, day % 60)
}

/// Clear the terminal and move the cursor home
pub fn clear_screen() {
    use crossterm::{cursor::MoveTo, terminal::Clear, terminal::ClearType};

    let _ = crossterm::execute!(std::io::stdout(), Clear(ClearType::All), MoveTo(0, 0));
}

/// Print a bold section header
pub fn print_header(msg: &str) {
    use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetAttribute(Attribute::Bold),
        SetForegroundColor(Color::Cyan),
        Print("==> "),
        Print(msg),
        SetAttribute(Attribute::Reset),
        ResetColor,
        Print("\n")
    );
}

/// Print a success message in green with a checkmark prefix
///
/// Outputs to stdout with green coloring for positive feedback to the user.
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
///
/// Outputs to stderr with red coloring for error feedback to the user.
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow with a warning symbol prefix
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan with an info symbol prefix
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
