//! TUI rendering with ratatui
//!
//! Layout: title bar, status line, device panel, last-sync panel, help
//! bar, with the permission prompt rendered as a centered dialog on top.

use crate::watcher::Status;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use std::time::Duration;

use super::app::{App, LastSync};

/// Main render function
pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Length(3), // Status line
            Constraint::Min(9),    // Device panel
            Constraint::Length(4), // Last sync panel
            Constraint::Length(3), // Help bar
        ])
        .split(frame.area());

    render_title_bar(frame, app, chunks[0]);
    render_status(frame, app, chunks[1]);
    render_device_panel(frame, app, chunks[2]);
    render_sync_panel(frame, app, chunks[3]);
    render_help_bar(frame, app, chunks[4]);

    if let Some(device) = app.prompt() {
        render_permission_dialog(frame, device);
    }
}

/// Render the title bar (top panel)
fn render_title_bar(frame: &mut Frame, app: &App, area: Rect) {
    let uptime = format_duration(app.uptime());

    let title_text = vec![
        Span::styled("Uptime: ", Style::default().fg(Color::DarkGray)),
        Span::styled(uptime, Style::default().fg(Color::Green)),
    ];

    let title = Paragraph::new(Line::from(title_text))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" USB Sync Host ")
                .title_alignment(Alignment::Center)
                .border_style(Style::default().fg(Color::Blue)),
        )
        .alignment(Alignment::Center);

    frame.render_widget(title, area);
}

/// Render the status line
fn render_status(frame: &mut Frame, app: &App, area: Rect) {
    let status = app.watcher().status();

    let style = match status {
        Status::Connected(_) | Status::PermissionGranted => Style::default().fg(Color::Green),
        Status::PermissionRequired => Style::default().fg(Color::Yellow),
        Status::PermissionDenied => Style::default().fg(Color::Red),
        Status::NoDevice | Status::Disconnected => Style::default().fg(Color::DarkGray),
    };

    let paragraph = Paragraph::new(Line::from(Span::styled(
        status.to_string(),
        style.add_modifier(Modifier::BOLD),
    )))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Status ")
            .border_style(Style::default().fg(Color::Blue)),
    )
    .alignment(Alignment::Center);

    frame.render_widget(paragraph, area);
}

/// Render the held device's details
fn render_device_panel(frame: &mut Frame, app: &App, area: Rect) {
    let lines = match app.watcher().device() {
        Some(device) => vec![
            detail_line("Node", device.device_node()),
            detail_line(
                "VID:PID",
                format!("{:04x}:{:04x}", device.vendor_id, device.product_id),
            ),
            detail_line(
                "Product",
                device.product.clone().unwrap_or_else(|| "-".to_string()),
            ),
            detail_line(
                "Manufacturer",
                device
                    .manufacturer
                    .clone()
                    .unwrap_or_else(|| "-".to_string()),
            ),
            detail_line(
                "Serial",
                device
                    .serial_number
                    .clone()
                    .unwrap_or_else(|| "-".to_string()),
            ),
            detail_line("Speed", device.speed.to_string()),
            detail_line("Class", format!("{:#04x}", device.class)),
        ],
        None => vec![Line::from(Span::styled(
            "no device held",
            Style::default().fg(Color::DarkGray),
        ))],
    };

    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Device ")
            .border_style(Style::default().fg(Color::Blue)),
    );

    frame.render_widget(paragraph, area);
}

fn detail_line(name: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!("{:>14}: ", name),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw(value),
    ])
}

/// Render the last-sync panel
fn render_sync_panel(frame: &mut Frame, app: &App, area: Rect) {
    let lines = if app.sync_in_flight() {
        vec![Line::from(Span::styled(
            "Sync in progress...",
            Style::default().fg(Color::Yellow),
        ))]
    } else {
        match app.last_sync() {
            LastSync::Idle => vec![Line::from(Span::styled(
                "no sync performed yet",
                Style::default().fg(Color::DarkGray),
            ))],
            LastSync::Transferred { text, len } => vec![
                Line::from(vec![
                    Span::styled("Data Transferred: ", Style::default().fg(Color::Green)),
                    Span::raw(text.clone()),
                ]),
                Line::from(Span::styled(
                    format!("{} bytes", len),
                    Style::default().fg(Color::DarkGray),
                )),
            ],
            LastSync::Failed => vec![Line::from(Span::styled(
                "Data Transfer Failed",
                Style::default().fg(Color::Red),
            ))],
        }
    };

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Sync ")
                .border_style(Style::default().fg(Color::Blue)),
        )
        .wrap(Wrap { trim: false });

    frame.render_widget(paragraph, area);
}

/// Render the help bar (bottom panel)
fn render_help_bar(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![
        Span::styled("[d]", Style::default().fg(Color::Yellow)),
        Span::raw(" Detect USB Device  "),
    ];

    // The sync action is offered only while a permitted device is held
    if app.watcher().sync_visible() {
        spans.push(Span::styled("[s]", Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(" Sync Data  "));
    }

    if app.prompt().is_some() {
        spans.push(Span::styled("[y]/[n]", Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(" Answer prompt  "));
    }

    spans.push(Span::styled("[q]", Style::default().fg(Color::Yellow)));
    spans.push(Span::raw(" Quit"));

    let help = Paragraph::new(Line::from(spans))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Blue)),
        )
        .alignment(Alignment::Center);

    frame.render_widget(help, area);
}

/// Render the permission prompt dialog
fn render_permission_dialog(frame: &mut Frame, device: &common::DeviceInfo) {
    let area = centered_rect(60, 30, frame.area());

    let lines = vec![
        Line::from(""),
        Line::from(Span::raw(format!(
            "Allow access to {}?",
            device.device_node()
        ))),
        Line::from(Span::styled(
            device.label(),
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("[y]", Style::default().fg(Color::Green)),
            Span::raw(" Allow   "),
            Span::styled("[n]", Style::default().fg(Color::Red)),
            Span::raw(" Deny   "),
            Span::styled("[Esc]", Style::default().fg(Color::DarkGray)),
            Span::raw(" Dismiss"),
        ]),
    ];

    let dialog = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" USB Permission Required ")
                .title_alignment(Alignment::Center)
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: false });

    frame.render_widget(Clear, area);
    frame.render_widget(dialog, area);
}

/// Compute a centered rect with the given percentage dimensions
fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

/// Format a duration as H:MM:SS
fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
