/*!
 * BlueDeck TUI Interface
 * Device list, adapter panel and notice popup
 */

use bluedeck_core::{BondState, Device, Notice, Power, SessionState};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, FocusedPanel};

// Conservative color palette
const BLUE: Color = Color::Rgb(100, 149, 237);
const GRAY: Color = Color::Rgb(128, 128, 128);
const WHITE: Color = Color::Rgb(255, 255, 255);
const GREEN: Color = Color::Rgb(34, 139, 34);
const RED: Color = Color::Rgb(220, 20, 60);

pub fn render_ui(f: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(8), Constraint::Length(1)])
        .split(f.area());

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(60), // Devices
            Constraint::Percentage(40), // Adapter + keys
        ])
        .split(rows[0]);

    render_devices_panel(f, chunks[0], app);
    render_adapter_panel(f, chunks[1], app);
    render_status_bar(f, rows[1], app);

    if let Some(notice) = app.view.notice() {
        render_notice(f, notice);
    }
}

fn border_style(app: &App, panel: FocusedPanel) -> Style {
    if app.focused_panel == panel {
        Style::default().fg(BLUE)
    } else {
        Style::default().fg(GRAY)
    }
}

fn render_devices_panel(f: &mut Frame, area: Rect, app: &App) {
    let devices = app.view.devices();
    let title = format!("Devices ({})", devices.len());
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(border_style(app, FocusedPanel::Devices));

    if devices.is_empty() {
        let hint = if app.view.session_state() == SessionState::Active {
            "Searching..."
        } else {
            "No devices. Press [s] to scan"
        };
        let paragraph = Paragraph::new(hint)
            .style(Style::default().fg(GRAY))
            .block(block)
            .alignment(Alignment::Center);
        f.render_widget(paragraph, area);
        return;
    }

    let mut items = Vec::new();
    let mut current_group = None;

    for (i, device) in devices.iter().enumerate() {
        // Registry order already puts paired devices first
        if current_group != Some(device.bond_state) {
            if !items.is_empty() {
                items.push(ListItem::new(Line::from("")));
            }
            items.push(ListItem::new(Line::from(vec![Span::styled(
                format!("━ {} ━", device.bond_state),
                Style::default().fg(BLUE).add_modifier(Modifier::BOLD),
            )])));
            current_group = Some(device.bond_state);
        }
        items.push(device_item(device, i == app.selected_device));
    }

    f.render_widget(List::new(items).block(block), area);
}

fn device_item(device: &Device, selected: bool) -> ListItem<'_> {
    let prefix = if selected { "▶ " } else { "  " };
    let (indicator, color) = match device.bond_state {
        BondState::Paired => ("●", GREEN),
        BondState::Discovered => ("○", GRAY),
    };

    let content = Line::from(vec![
        Span::raw(prefix),
        Span::styled(indicator, Style::default().fg(color)),
        Span::raw(" "),
        Span::styled(device.display_name(), Style::default().fg(WHITE)),
        Span::raw("  "),
        Span::styled(device.address.to_string(), Style::default().fg(GRAY)),
    ]);

    if selected {
        ListItem::new(content).style(Style::default().bg(BLUE).fg(WHITE))
    } else {
        ListItem::new(content)
    }
}

fn render_adapter_panel(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(9), Constraint::Length(11)])
        .split(area);

    let state = app.view.adapter_state();
    let (power_text, power_color) = if !app.view.is_available() {
        ("Unavailable".to_string(), RED)
    } else {
        match state.power {
            Power::On => (state.power.to_string(), GREEN),
            Power::Off => (state.power.to_string(), RED),
        }
    };

    let session = app.view.session_state();
    let session_color = match session {
        SessionState::Active | SessionState::Starting => BLUE,
        SessionState::Aborted => RED,
        _ => WHITE,
    };

    let mut content = vec![
        Line::from(vec![
            Span::styled(&app.adapter_name, Style::default().fg(WHITE).add_modifier(Modifier::BOLD)),
            Span::styled(": Bluetooth Adapter", Style::default().fg(GRAY)),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("Power: ", Style::default().fg(GRAY)),
            Span::styled(power_text, Style::default().fg(power_color)),
        ]),
        Line::from(vec![
            Span::styled("Discovery: ", Style::default().fg(GRAY)),
            Span::styled(format!("{:?}", session), Style::default().fg(session_color)),
        ]),
        Line::from(vec![
            Span::styled("Paired: ", Style::default().fg(GRAY)),
            Span::styled(app.view.registry().paired_count().to_string(), Style::default().fg(WHITE)),
        ]),
    ];
    if state.scanning {
        content.push(Line::from(vec![
            Span::styled("Found so far: ", Style::default().fg(GRAY)),
            Span::styled(app.view.pending().to_string(), Style::default().fg(WHITE)),
        ]));
    }
    if let Some(device) = app.selected() {
        content.push(Line::from(""));
        content.push(Line::from(vec![
            Span::styled("Selected: ", Style::default().fg(GRAY)),
            Span::styled(device.display_name(), Style::default().fg(WHITE)),
        ]));
    }

    let adapter = Paragraph::new(content)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Adapter")
                .border_style(border_style(app, FocusedPanel::Adapter)),
        )
        .alignment(Alignment::Left);
    f.render_widget(adapter, chunks[0]);

    let keys = Paragraph::new(vec![
        Line::from("[s] Scan for Devices"),
        Line::from("[x] Stop Scan"),
        Line::from("[b] Turn Bluetooth On/Off"),
        Line::from("[r] Refresh Power"),
        Line::from("[e] Notice Action"),
        Line::from("[Esc] Dismiss Notice"),
        Line::from("[Tab] Switch Panel"),
        Line::from("[q] Quit"),
    ])
    .style(Style::default().fg(GRAY))
    .block(Block::default().borders(Borders::ALL).title("Keys").border_style(Style::default().fg(GRAY)));
    f.render_widget(keys, chunks[1]);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let status = Paragraph::new(Line::from(vec![
        Span::styled(" BlueDeck ", Style::default().bg(BLUE).fg(WHITE)),
        Span::raw(" "),
        Span::styled(app.view.status(), Style::default().fg(GRAY)),
    ]));
    f.render_widget(status, area);
}

fn render_notice(f: &mut Frame, notice: &Notice) {
    let area = centered_rect(60, 30, f.area());

    let mut content = vec![
        Line::from(Span::styled(&notice.message, Style::default().fg(WHITE))),
        Line::from(""),
        Line::from(Span::styled(
            format!("Raised at {}", notice.raised_at.format("%H:%M:%S")),
            Style::default().fg(GRAY),
        )),
        Line::from(""),
    ];
    if let Some(action) = notice.action {
        content.push(Line::from(vec![
            Span::styled("[e] ", Style::default().fg(BLUE)),
            Span::styled(action.label(), Style::default().fg(WHITE)),
        ]));
    }
    content.push(Line::from(vec![
        Span::styled("[Esc] ", Style::default().fg(BLUE)),
        Span::styled("Dismiss", Style::default().fg(WHITE)),
    ]));

    let popup = Paragraph::new(content)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(notice.title())
                .border_style(Style::default().fg(RED)),
        )
        .wrap(Wrap { trim: true });

    f.render_widget(Clear, area);
    f.render_widget(popup, area);
}

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
