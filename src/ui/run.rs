use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{
    BarChart, Block, Borders, Cell, Clear, Paragraph, Row, Sparkline, Table, Wrap,
};
use ratatui::Terminal;
use std::io;
use std::time::Duration as StdDuration;

use crate::config::AppConfig;
use crate::daykey;
use crate::error::AppError;
use crate::service::{ActivityHub, ActivityState};
use crate::ui::app::{AppState, ChartTab};
use crate::views::{CalendarDay, DashboardViews};

const COLOR_ACCENT: Color = Color::Cyan;
const COLOR_INFO: Color = Color::Green;
const COLOR_MUTED: Color = Color::DarkGray;
const COLOR_HEADER: Color = Color::White;
const COLOR_ERROR: Color = Color::Red;

pub async fn run_tui(cfg: &AppConfig, hub: ActivityHub) -> Result<(), AppError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let loop_result = run_loop(&mut terminal, cfg, &hub).await;

    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    loop_result
}

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    cfg: &AppConfig,
    hub: &ActivityHub,
) -> Result<(), AppError> {
    let mut state = AppState::default();
    let mut handles = hub.mount();
    let tick = StdDuration::from_millis(250);

    while state.running {
        if state.reload_requested {
            state.reload_requested = false;
            // Remount: new generation, stale sweep results get dropped.
            handles = hub.mount();
        }

        let snapshot = hub.snapshot();
        let views = hub.views();
        terminal.draw(|f| render(f, cfg, &state, &snapshot, &views))?;

        if event::poll(tick)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                handle_key(key.code, key.modifiers, &mut state);
            }
        }
    }

    handles.analytics.abort();
    if let Some(events) = handles.events {
        events.abort();
    }

    Ok(())
}

fn handle_key(code: KeyCode, modifiers: KeyModifiers, state: &mut AppState) {
    if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
        state.confirm_quit = true;
        return;
    }

    if state.confirm_quit {
        match code {
            KeyCode::Enter | KeyCode::Char('y') => state.running = false,
            KeyCode::Esc | KeyCode::Char('n') => state.confirm_quit = false,
            _ => {}
        }
        return;
    }

    match code {
        KeyCode::Char('q') => state.confirm_quit = true,
        KeyCode::Char('r') => {
            state.reload_requested = true;
            state.status = "reloading".into();
        }
        KeyCode::Left => state.tab = state.tab.prev(),
        KeyCode::Right | KeyCode::Tab => state.tab = state.tab.next(),
        KeyCode::Char(c @ '1'..='6') => {
            state.tab = ChartTab::ALL[c as usize - '1' as usize];
        }
        _ => {}
    }
}

fn render(
    f: &mut ratatui::Frame,
    cfg: &AppConfig,
    state: &AppState,
    snapshot: &ActivityState,
    views: &DashboardViews,
) {
    let size = f.area();
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
        ])
        .split(size);

    let header = Paragraph::new(format!(
        " cursor-pulse  ·  {}  ·  analytics: {}  ·  events: {} ",
        state.status,
        analytics_status(snapshot),
        events_status(snapshot)
    ))
    .block(Block::default().borders(Borders::ALL).title(" Dashboard "))
    .style(Style::default().fg(COLOR_HEADER));
    f.render_widget(header, root[0]);

    match state.tab {
        ChartTab::RequestsCalendar => render_calendar_card(
            f,
            root[1],
            state.tab.title(),
            snapshot,
            &views.agent_requests,
        ),
        ChartTab::AcceptedLinesCalendar => render_calendar_card(
            f,
            root[1],
            state.tab.title(),
            snapshot,
            &views.accepted_lines,
        ),
        ChartTab::LastSevenDays => render_weekly_card(f, root[1], snapshot, views),
        ChartTab::WeekdayDistribution => render_weekday_card(f, root[1], snapshot, views),
        ChartTab::Tokens => render_tokens_card(f, root[1], cfg, snapshot, views),
        ChartTab::Costs => render_costs_card(f, root[1], cfg, snapshot, views),
    }

    let footer = Paragraph::new(footer_text(state))
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(COLOR_MUTED));
    f.render_widget(footer, root[2]);

    if state.confirm_quit {
        render_confirm_quit(f);
    }
}

fn footer_text(state: &AppState) -> &'static str {
    if state.confirm_quit {
        "Enter/y quit | Esc/n stay"
    } else {
        "Left/Right chart | 1-6 jump | r reload | q quit"
    }
}

fn analytics_status(snapshot: &ActivityState) -> String {
    if let Some(err) = &snapshot.analytics_error {
        return format!("error ({err})");
    }
    if snapshot.analytics_loading {
        return "loading".into();
    }
    match &snapshot.analytics {
        Some(data) => format!("{} days", data.daily_metrics.len()),
        None => "idle".into(),
    }
}

fn events_status(snapshot: &ActivityState) -> String {
    if let Some(err) = &snapshot.events_error {
        return format!("error ({err})");
    }
    if snapshot.events_loading {
        return match snapshot.progress.percent() {
            Some(percent) => format!(
                "{percent}% loaded ({}/{})",
                snapshot.progress.fetched, snapshot.progress.total
            ),
            None => "loading".into(),
        };
    }
    if snapshot.events_from_cache {
        format!("{} events (cached)", snapshot.events.len())
    } else {
        format!("{} events", snapshot.events.len())
    }
}

fn card_block(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .title(format!(" {title} "))
}

fn render_notice(f: &mut ratatui::Frame, area: Rect, title: &str, text: &str, color: Color) {
    let notice = Paragraph::new(text.to_string())
        .block(card_block(title))
        .style(Style::default().fg(color))
        .wrap(Wrap { trim: true });
    f.render_widget(notice, area);
}

fn analytics_gate(snapshot: &ActivityState) -> Option<(String, Color)> {
    if let Some(err) = &snapshot.analytics_error {
        return Some((format!("Error loading data: {err}"), COLOR_ERROR));
    }
    if snapshot.analytics.is_none() {
        return Some(("Loading...".to_string(), COLOR_MUTED));
    }
    None
}

fn render_calendar_card(
    f: &mut ratatui::Frame,
    area: Rect,
    title: &str,
    snapshot: &ActivityState,
    data: &[CalendarDay],
) {
    if let Some((text, color)) = analytics_gate(snapshot) {
        render_notice(f, area, title, &text, color);
        return;
    }
    if data.is_empty() {
        render_notice(f, area, title, "No activity recorded yet.", COLOR_MUTED);
        return;
    }

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(4)])
        .split(area);

    let total: u64 = data.iter().map(|d| d.value).sum();
    let busiest = data
        .iter()
        .max_by_key(|d| d.value)
        .map(|d| format!("{} ({})", d.day, d.value))
        .unwrap_or_else(|| "-".into());
    let summary = Paragraph::new(format!(
        "{total} total  ·  {} active days  ·  busiest {busiest}",
        data.len()
    ))
    .block(card_block(title))
    .style(Style::default().fg(COLOR_INFO).add_modifier(Modifier::BOLD));
    f.render_widget(summary, rows[0]);

    let values: Vec<u64> = data.iter().map(|d| d.value).collect();
    let window = values.len().saturating_sub(rows[1].width.saturating_sub(2) as usize);
    let sparkline = Sparkline::default()
        .block(Block::default().borders(Borders::ALL).title(" Active days "))
        .data(&values[window..])
        .style(Style::default().fg(COLOR_ACCENT));
    f.render_widget(sparkline, rows[1]);
}

fn render_weekday_card(
    f: &mut ratatui::Frame,
    area: Rect,
    snapshot: &ActivityState,
    views: &DashboardViews,
) {
    let title = ChartTab::WeekdayDistribution.title();
    if let Some((text, color)) = analytics_gate(snapshot) {
        render_notice(f, area, title, &text, color);
        return;
    }

    let bars: Vec<(&str, u64)> = views.weekdays.iter().map(|b| (b.day, b.value)).collect();
    let chart = BarChart::default()
        .block(card_block(title))
        .data(&bars)
        .bar_width(7)
        .bar_gap(2)
        .bar_style(Style::default().fg(COLOR_ACCENT))
        .value_style(Style::default().fg(Color::Black).bg(COLOR_ACCENT));
    f.render_widget(chart, area);
}

fn render_weekly_card(
    f: &mut ratatui::Frame,
    area: Rect,
    snapshot: &ActivityState,
    views: &DashboardViews,
) {
    let title = ChartTab::LastSevenDays.title();
    if let Some((text, color)) = analytics_gate(snapshot) {
        render_notice(f, area, title, &text, color);
        return;
    }

    let rows: Vec<Row> = views
        .weekly
        .messages
        .iter()
        .zip(&views.weekly.accepted_lines)
        .map(|(messages, accepted)| {
            Row::new(vec![
                Cell::from(messages.x),
                Cell::from(messages.y.to_string()),
                Cell::from(accepted.y.to_string()),
            ])
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Percentage(34),
            Constraint::Percentage(33),
            Constraint::Percentage(33),
        ],
    )
    .header(
        Row::new(vec!["Day", "Messages", "Accepted Lines"]).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
    )
    .block(card_block(title));
    f.render_widget(table, area);
}

fn events_gate(snapshot: &ActivityState) -> Option<(String, Color)> {
    if let Some(err) = &snapshot.events_error {
        return Some((format!("Error loading usage data: {err}"), COLOR_ERROR));
    }
    if snapshot.events_loading && snapshot.events.is_empty() {
        return Some(("Loading usage events...".to_string(), COLOR_MUTED));
    }
    None
}

fn events_card_title(base: &str, cfg: &AppConfig, snapshot: &ActivityState) -> String {
    let mut title = format!("{base} (last {} days)", cfg.bar_window_days);
    if snapshot.events_loading {
        if let Some(percent) = snapshot.progress.percent() {
            title.push_str(&format!(" ({percent}% loaded)"));
        }
    }
    title
}

fn render_tokens_card(
    f: &mut ratatui::Frame,
    area: Rect,
    cfg: &AppConfig,
    snapshot: &ActivityState,
    views: &DashboardViews,
) {
    let title = events_card_title(ChartTab::Tokens.title(), cfg, snapshot);
    if let Some((text, color)) = events_gate(snapshot) {
        render_notice(f, area, &title, &text, color);
        return;
    }
    if views.tokens.is_empty() {
        render_notice(
            f,
            area,
            &title,
            "No token usage data available for this window.",
            COLOR_MUTED,
        );
        return;
    }
    if views
        .tokens
        .iter()
        .all(|row| row.subscription == 0 && row.usage == 0)
    {
        render_notice(
            f,
            area,
            &title,
            "No token usage recorded for this window.",
            COLOR_MUTED,
        );
        return;
    }

    let rows_area = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(4)])
        .split(area);

    let note = Paragraph::new("Token totals are an approximation.")
        .style(Style::default().fg(COLOR_MUTED))
        .alignment(Alignment::Right);
    f.render_widget(note, rows_area[0]);

    let rows: Vec<Row> = views
        .tokens
        .iter()
        .map(|row| {
            Row::new(vec![
                Cell::from(daykey::month_day(&row.day).to_string()),
                Cell::from(format_tokens(row.subscription)),
                Cell::from(format_tokens(row.usage)),
            ])
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Percentage(34),
            Constraint::Percentage(33),
            Constraint::Percentage(33),
        ],
    )
    .header(
        Row::new(vec!["Day", "Subscription", "Usage-based"]).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
    )
    .block(card_block(&title));
    f.render_widget(table, rows_area[1]);
}

fn render_costs_card(
    f: &mut ratatui::Frame,
    area: Rect,
    cfg: &AppConfig,
    snapshot: &ActivityState,
    views: &DashboardViews,
) {
    let title = events_card_title(ChartTab::Costs.title(), cfg, snapshot);
    if let Some((text, color)) = events_gate(snapshot) {
        render_notice(f, area, &title, &text, color);
        return;
    }
    if views.costs.is_empty() {
        render_notice(
            f,
            area,
            &title,
            "No cost data available for this window.",
            COLOR_MUTED,
        );
        return;
    }
    if views
        .costs
        .iter()
        .all(|row| row.subscription == 0.0 && row.usage == 0.0)
    {
        render_notice(
            f,
            area,
            &title,
            "No costs recorded for this window.",
            COLOR_MUTED,
        );
        return;
    }

    let rows: Vec<Row> = views
        .costs
        .iter()
        .map(|row| {
            Row::new(vec![
                Cell::from(daykey::month_day(&row.day).to_string()),
                Cell::from(format_cents(row.subscription)),
                Cell::from(format_cents(row.usage)),
            ])
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Percentage(34),
            Constraint::Percentage(33),
            Constraint::Percentage(33),
        ],
    )
    .header(
        Row::new(vec!["Day", "Subscription", "Usage-based"]).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
    )
    .block(card_block(&title));
    f.render_widget(table, area);
}

fn render_confirm_quit(f: &mut ratatui::Frame) {
    let area = centered_rect(40, 20, f.area());
    f.render_widget(Clear, area);
    let dialog = Paragraph::new("Quit cursor-pulse?")
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title(" Confirm "))
        .style(Style::default().fg(COLOR_HEADER).add_modifier(Modifier::BOLD));
    f.render_widget(dialog, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn format_tokens(value: u64) -> String {
    if value >= 1_000_000 {
        format!("{:.2}M", value as f64 / 1_000_000.0)
    } else if value >= 1_000 {
        format!("{:.1}k", value as f64 / 1_000.0)
    } else {
        value.to_string()
    }
}

fn format_cents(value: f64) -> String {
    if value >= 100.0 {
        format!("${:.3}", value / 100.0)
    } else {
        format!("{value:.2}¢")
    }
}
