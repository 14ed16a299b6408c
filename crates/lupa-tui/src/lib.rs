// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyModifiers,
    MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use lupa_app::{
    AppCommand, AppEvent, AppState, ChartKind, DrillDownError, DrillDownResult, HistoryEntry,
    HistoryEntryId, OverlayState, RequestId, Snapshot, SnapshotStatus, TabKind, cell_text,
    format_sql, resolve_drill_down,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols;
use ratatui::text::Line;
use ratatui::widgets::{
    Axis, Bar, BarChart, BarGroup, Block, Borders, Cell, Chart, Clear, Dataset, GraphType,
    Paragraph, Row, Table, Tabs,
};
use std::cmp::Ordering;
use std::io;
use std::sync::mpsc::{Receiver, Sender};
use std::thread;
use std::time::Duration;
use time::OffsetDateTime;
use time::macros::format_description;

const HALF_PAGE_ROWS: isize = 10;
const SCROLL_WHEEL_ROWS: isize = 3;
const SPINNER_FRAMES: [&str; 8] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠦", "⠧", "⠇"];
const SORT_ASC_MARK: &str = " ↑";
const SORT_DESC_MARK: &str = " ↓";

pub trait AppRuntime {
    fn archive_snapshot(&mut self, snapshot: &Snapshot);
    fn list_history(&mut self) -> Result<Vec<HistoryEntry>>;
    fn load_history(&mut self, id: &HistoryEntryId) -> Result<Option<Snapshot>>;
    fn delete_history(&mut self, id: &HistoryEntryId) -> Result<bool>;
    fn reload_snapshot(&mut self) -> Result<Option<Snapshot>>;
    fn drill_down_available(&self) -> bool;
    fn spawn_drill_down(
        &mut self,
        request: RequestId,
        query: &str,
        tx: Sender<InternalEvent>,
    ) -> Result<()>;
    fn cancel_drill_down(&mut self, _request: RequestId) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    ClearStatus { token: u64 },
    SnapshotLoaded(Box<Snapshot>),
    SnapshotRejected(String),
    DataFileRemoved,
    HistoryChanged,
    WatcherStalled(String),
    DrillDownFinished {
        request: RequestId,
        outcome: std::result::Result<Box<DrillDownResult>, DrillDownError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SortSpec {
    column: usize,
    direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct LayoutAreas {
    tabs: Rect,
    content: Rect,
    chart: Rect,
    data_rows: Rect,
}

#[derive(Debug, Clone, PartialEq, Default)]
struct ViewData {
    layout: LayoutAreas,
    frame: u32,
    data_scroll: usize,
    home_scroll: usize,
    overlay_sort: Option<SortSpec>,
    overlay_cursor: usize,
    overlay_scroll: usize,
    status_token: u64,
}

pub fn run_app<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    internal_tx: Sender<InternalEvent>,
    internal_rx: Receiver<InternalEvent>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen, EnableMouseCapture)
        .context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::default();
    refresh_history(state, runtime, &mut view_data, &internal_tx);

    let mut result = Ok(());
    loop {
        process_internal_events(state, runtime, &mut view_data, &internal_tx, &internal_rx);

        if let Err(error) = terminal.draw(|frame| render(frame, state, &mut view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = event::poll(Duration::from_millis(120)).context("poll event")?;
        if has_event {
            match event::read().context("read event")? {
                Event::Key(key) => {
                    if handle_key_event(state, runtime, &mut view_data, &internal_tx, key) {
                        break;
                    }
                }
                Event::Mouse(mouse) => {
                    handle_mouse_event(state, runtime, &mut view_data, &internal_tx, mouse);
                }
                Event::Resize(_, _) => {}
                _ => {}
            }
        }

        view_data.frame = view_data.frame.wrapping_add(1);
    }

    if let Some(request) = state.running_request() {
        runtime.cancel_drill_down(request);
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(
        io::stdout(),
        terminal::LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("leave alternate screen")?;
    result
}

fn process_internal_events<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                state.dispatch(AppCommand::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::SnapshotLoaded(snapshot) => {
                let title = snapshot.title.clone();
                let events = state.dispatch(AppCommand::IngestSnapshot(snapshot));
                apply_effects(state, runtime, view_data, tx, events);
                emit_status(state, view_data, tx, format!("new snapshot: {title}"));
            }
            InternalEvent::SnapshotRejected(message) => {
                emit_status(state, view_data, tx, format!("snapshot rejected: {message}"));
            }
            InternalEvent::DataFileRemoved => {
                state.dispatch(AppCommand::ClearData);
                emit_status(state, view_data, tx, "data file removed");
            }
            InternalEvent::HistoryChanged => {
                refresh_history(state, runtime, view_data, tx);
            }
            InternalEvent::WatcherStalled(message) => {
                emit_status(state, view_data, tx, format!("watcher: {message}"));
            }
            InternalEvent::DrillDownFinished { request, outcome } => {
                view_data.overlay_sort = None;
                view_data.overlay_cursor = 0;
                view_data.overlay_scroll = 0;
                let command = match outcome {
                    Ok(result) => AppCommand::FinishDrillDown { request, result },
                    Err(error) => AppCommand::FailDrillDown { request, error },
                };
                state.dispatch(command);
            }
        }
    }
}

fn apply_effects<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    events: Vec<AppEvent>,
) {
    for event in events {
        match event {
            AppEvent::ArchivePrevious(previous) => {
                runtime.archive_snapshot(&previous);
                refresh_history(state, runtime, view_data, tx);
            }
            AppEvent::DrillDownStarted(request) => {
                start_drill_down(state, runtime, view_data, tx, request);
            }
            _ => {}
        }
    }
}

fn refresh_history<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) {
    match runtime.list_history() {
        Ok(entries) => {
            state.dispatch(AppCommand::ReplaceHistory(entries));
        }
        Err(error) => {
            emit_status(state, view_data, tx, format!("history unavailable: {error}"));
        }
    }
}

fn start_drill_down<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    request: RequestId,
) {
    view_data.overlay_sort = None;
    view_data.overlay_cursor = 0;
    view_data.overlay_scroll = 0;

    if !runtime.drill_down_available() {
        state.dispatch(AppCommand::FailDrillDown {
            request,
            error: DrillDownError::Disabled,
        });
        return;
    }

    let resolved = match (state.snapshot.as_ref(), state.selected_row()) {
        (Some(snapshot), Some(row)) => resolve_drill_down(snapshot, row),
        _ => Err(DrillDownError::TemplateMissing),
    };

    match resolved {
        Ok(query) => {
            if let Err(error) = runtime.spawn_drill_down(request, &query, tx.clone()) {
                state.dispatch(AppCommand::FailDrillDown {
                    request,
                    error: DrillDownError::BackendFailure(error.to_string()),
                });
            }
        }
        Err(error) => {
            state.dispatch(AppCommand::FailDrillDown { request, error });
        }
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(4));
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    state.dispatch(AppCommand::SetStatus(message.into()));
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn handle_key_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    if state.help_visible {
        state.dispatch(AppCommand::ToggleHelp);
        return false;
    }

    if state.overlay.is_open() {
        handle_overlay_key(state, runtime, view_data, key);
        return false;
    }

    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('?') => {
            state.dispatch(AppCommand::ToggleHelp);
        }
        KeyCode::Char('r') => {
            reload_snapshot(state, runtime, view_data, internal_tx);
        }
        KeyCode::Left => {
            state.dispatch(AppCommand::PrevTab);
        }
        KeyCode::Right => {
            state.dispatch(AppCommand::NextTab);
        }
        KeyCode::Char(digit) if ('1'..='5').contains(&digit) => {
            let index = (digit as u8 - b'1') as usize;
            if let Some(tab) = TabKind::from_index(index) {
                state.dispatch(AppCommand::SelectTab(tab));
            }
        }
        KeyCode::Up => {
            state.dispatch(AppCommand::MoveSelection(-1));
        }
        KeyCode::Down => {
            state.dispatch(AppCommand::MoveSelection(1));
        }
        KeyCode::PageUp => {
            state.dispatch(AppCommand::MoveSelection(-HALF_PAGE_ROWS));
        }
        KeyCode::PageDown => {
            state.dispatch(AppCommand::MoveSelection(HALF_PAGE_ROWS));
        }
        KeyCode::Home => {
            state.dispatch(AppCommand::JumpSelectionFirst);
        }
        KeyCode::End => {
            state.dispatch(AppCommand::JumpSelectionLast);
        }
        KeyCode::Enter => match state.active_tab {
            TabKind::Home => load_selected_history(state, runtime, view_data, internal_tx),
            TabKind::Data | TabKind::Chart => {
                trigger_drill_down(state, runtime, view_data, internal_tx);
            }
            _ => {}
        },
        KeyCode::Char('x') => {
            if matches!(state.active_tab, TabKind::Data | TabKind::Chart) {
                trigger_drill_down(state, runtime, view_data, internal_tx);
            }
        }
        KeyCode::Char('d') => {
            if state.active_tab == TabKind::Home {
                delete_selected_history(state, runtime, view_data, internal_tx);
            }
        }
        _ => {}
    }
    false
}

fn handle_overlay_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => {
            if let Some(request) = state.running_request() {
                runtime.cancel_drill_down(request);
            }
            state.dispatch(AppCommand::CloseOverlay);
            view_data.overlay_sort = None;
            view_data.overlay_cursor = 0;
            view_data.overlay_scroll = 0;
        }
        KeyCode::Left => {
            view_data.overlay_cursor = view_data.overlay_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            if let OverlayState::Showing(result) = &state.overlay {
                let limit = result.columns.len().saturating_sub(1);
                view_data.overlay_cursor = (view_data.overlay_cursor + 1).min(limit);
            }
        }
        KeyCode::Char('s') | KeyCode::Enter => {
            if matches!(state.overlay, OverlayState::Showing(_)) {
                cycle_overlay_sort(view_data, view_data.overlay_cursor);
            }
        }
        KeyCode::Up => {
            view_data.overlay_scroll = view_data.overlay_scroll.saturating_sub(1);
        }
        KeyCode::Down => {
            scroll_overlay(state, view_data, 1);
        }
        KeyCode::PageUp => {
            view_data.overlay_scroll = view_data
                .overlay_scroll
                .saturating_sub(HALF_PAGE_ROWS as usize);
        }
        KeyCode::PageDown => {
            scroll_overlay(state, view_data, HALF_PAGE_ROWS);
        }
        KeyCode::Home => {
            view_data.overlay_scroll = 0;
        }
        KeyCode::End => {
            if let OverlayState::Showing(result) = &state.overlay {
                view_data.overlay_scroll = result.rows.len().saturating_sub(1);
            }
        }
        _ => {}
    }
}

fn scroll_overlay(state: &AppState, view_data: &mut ViewData, delta: isize) {
    let OverlayState::Showing(result) = &state.overlay else {
        return;
    };
    let limit = result.rows.len().saturating_sub(1);
    view_data.overlay_scroll = view_data
        .overlay_scroll
        .saturating_add(delta.unsigned_abs())
        .min(limit);
}

fn cycle_overlay_sort(view_data: &mut ViewData, column: usize) {
    view_data.overlay_sort = match view_data.overlay_sort {
        Some(SortSpec {
            column: current,
            direction: SortDirection::Asc,
        }) if current == column => Some(SortSpec {
            column,
            direction: SortDirection::Desc,
        }),
        Some(SortSpec {
            column: current,
            direction: SortDirection::Desc,
        }) if current == column => None,
        _ => Some(SortSpec {
            column,
            direction: SortDirection::Asc,
        }),
    };
    view_data.overlay_scroll = 0;
}

fn sorted_overlay_rows(
    result: &DrillDownResult,
    sort: Option<SortSpec>,
) -> Vec<Vec<serde_json::Value>> {
    let mut rows = result.rows.clone();
    if let Some(spec) = sort {
        rows.sort_by(|left, right| {
            let ordering = match (left.get(spec.column), right.get(spec.column)) {
                (Some(left), Some(right)) => cmp_cells(left, right),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            match spec.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
    }
    rows
}

fn cmp_cells(left: &serde_json::Value, right: &serde_json::Value) -> Ordering {
    match (cell_as_f64(left), cell_as_f64(right)) {
        (Some(left), Some(right)) => left.total_cmp(&right),
        _ => cell_text(left)
            .to_ascii_lowercase()
            .cmp(&cell_text(right).to_ascii_lowercase()),
    }
}

fn cell_as_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(number) => number.as_f64(),
        serde_json::Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn reload_snapshot<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    match runtime.reload_snapshot() {
        Ok(Some(snapshot)) => {
            let events = state.dispatch(AppCommand::IngestSnapshot(Box::new(snapshot)));
            apply_effects(state, runtime, view_data, internal_tx, events);
            emit_status(state, view_data, internal_tx, "snapshot reloaded");
        }
        Ok(None) => {
            emit_status(state, view_data, internal_tx, "no data file to reload");
        }
        Err(error) => {
            emit_status(state, view_data, internal_tx, format!("reload failed: {error}"));
        }
    }
}

fn trigger_drill_down<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    if let Some(request) = state.running_request() {
        runtime.cancel_drill_down(request);
    }
    let events = state.dispatch(AppCommand::RequestDrillDown);
    apply_effects(state, runtime, view_data, internal_tx, events);
}

fn load_selected_history<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(entry) = state.history.get(state.selections.home_row) else {
        return;
    };
    let id = entry.id.clone();
    let title = entry.title.clone();

    match runtime.load_history(&id) {
        Ok(Some(snapshot)) => {
            let events = state.dispatch(AppCommand::LoadHistorySnapshot {
                id,
                snapshot: Box::new(snapshot),
            });
            apply_effects(state, runtime, view_data, internal_tx, events);
            emit_status(state, view_data, internal_tx, format!("loaded: {title}"));
        }
        Ok(None) => {
            refresh_history(state, runtime, view_data, internal_tx);
            emit_status(state, view_data, internal_tx, "history entry is gone");
        }
        Err(error) => {
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("history load failed: {error}"),
            );
        }
    }
}

fn delete_selected_history<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(entry) = state.history.get(state.selections.home_row) else {
        return;
    };
    let id = entry.id.clone();
    let title = entry.title.clone();

    match runtime.delete_history(&id) {
        Ok(true) => {
            state.dispatch(AppCommand::RemoveHistoryEntry(id));
            emit_status(state, view_data, internal_tx, format!("deleted: {title}"));
        }
        Ok(false) => {
            refresh_history(state, runtime, view_data, internal_tx);
            emit_status(state, view_data, internal_tx, "history entry is gone");
        }
        Err(error) => {
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("history delete failed: {error}"),
            );
        }
    }
}

fn handle_mouse_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    mouse: MouseEvent,
) {
    if state.help_visible {
        if matches!(mouse.kind, MouseEventKind::Down(_)) {
            state.dispatch(AppCommand::ToggleHelp);
        }
        return;
    }

    if state.overlay.is_open() {
        match mouse.kind {
            MouseEventKind::ScrollUp => {
                view_data.overlay_scroll = view_data
                    .overlay_scroll
                    .saturating_sub(SCROLL_WHEEL_ROWS as usize);
            }
            MouseEventKind::ScrollDown => {
                scroll_overlay(state, view_data, SCROLL_WHEEL_ROWS);
            }
            _ => {}
        }
        return;
    }

    let column = mouse.column;
    let row = mouse.row;
    match mouse.kind {
        MouseEventKind::ScrollUp => {
            state.dispatch(AppCommand::MoveSelection(-SCROLL_WHEEL_ROWS));
        }
        MouseEventKind::ScrollDown => {
            state.dispatch(AppCommand::MoveSelection(SCROLL_WHEEL_ROWS));
        }
        MouseEventKind::Down(MouseButton::Left) => {
            if in_rect(column, row, view_data.layout.tabs) {
                handle_tab_click(state, view_data, column);
            } else if in_rect(column, row, view_data.layout.content) {
                match state.active_tab {
                    TabKind::Data => handle_data_click(state, runtime, view_data, internal_tx, row),
                    TabKind::Chart => {
                        handle_chart_click(state, runtime, view_data, internal_tx, column, row);
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

fn in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_tab_click(state: &mut AppState, view_data: &ViewData, x: u16) {
    let tabs = view_data.layout.tabs;
    let slot = tabs.width / TabKind::ALL.len() as u16;
    if slot == 0 {
        return;
    }
    let index = (x.saturating_sub(tabs.x) / slot) as usize;
    if let Some(tab) = TabKind::from_index(index) {
        state.dispatch(AppCommand::SelectTab(tab));
    }
}

fn handle_data_click<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    y: u16,
) {
    let rows_area = view_data.layout.data_rows;
    if y < rows_area.y {
        return;
    }
    let Some(snapshot) = state.snapshot.as_ref() else {
        return;
    };
    let index = view_data.data_scroll + (y - rows_area.y) as usize;
    if index >= snapshot.rows.len() {
        return;
    }
    if state.selections.data_row == index {
        // Second click on the selected row drills into it.
        trigger_drill_down(state, runtime, view_data, internal_tx);
    } else {
        state.dispatch(AppCommand::SelectIndex(index));
    }
}

fn handle_chart_click<R: AppRuntime>(
    state: &mut AppState,
    _runtime: &mut R,
    view_data: &mut ViewData,
    _internal_tx: &Sender<InternalEvent>,
    x: u16,
    y: u16,
) {
    let chart = view_data.layout.chart;
    if !in_rect(x, y, chart) {
        return;
    }
    let Some(snapshot) = state.snapshot.as_ref() else {
        return;
    };
    let count = snapshot.rows.len();
    if count == 0 {
        return;
    }

    let inner_x = chart.x + 1;
    let inner_width = chart.width.saturating_sub(2);
    if x < inner_x || inner_width == 0 {
        return;
    }
    let relative = (x - inner_x) as usize;

    let index = match snapshot.chart_kind {
        ChartKind::Bar => {
            let slot = (inner_width as usize / count).max(1);
            relative / slot
        }
        ChartKind::Line | ChartKind::Scatter => {
            if count == 1 {
                0
            } else {
                let spacing = inner_width as f64 / (count - 1) as f64;
                (relative as f64 / spacing).round() as usize
            }
        }
    };
    state.dispatch(AppCommand::SelectIndex(index.min(count - 1)));
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &mut ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(frame.area());
    view_data.layout.tabs = layout[0];
    view_data.layout.content = layout[1];

    let selected = TabKind::ALL
        .iter()
        .position(|tab| *tab == state.active_tab)
        .unwrap_or(0);
    let titles = TabKind::ALL
        .iter()
        .enumerate()
        .map(|(index, tab)| format!("{}:{}", index + 1, tab.label()))
        .collect::<Vec<String>>();
    let tabs = Tabs::new(titles)
        .block(Block::default().title("lupa").borders(Borders::ALL))
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .select(selected);
    frame.render_widget(tabs, layout[0]);

    match state.active_tab {
        TabKind::Home => render_home(frame, layout[1], state, view_data),
        TabKind::Query => render_query(frame, layout[1], state, view_data),
        TabKind::Mask => render_mask(frame, layout[1], state),
        TabKind::Data => render_data(frame, layout[1], state, view_data),
        TabKind::Chart => render_chart(frame, layout[1], state, view_data),
    }

    let status = state
        .status_line
        .clone()
        .unwrap_or_else(|| footer_hint(state).to_owned());
    let status_widget = Paragraph::new(status)
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status_widget, layout[2]);

    if state.overlay.is_open() {
        render_overlay(frame, state, view_data);
    }

    if state.help_visible {
        let area = centered_rect(70, 70, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().title("help").borders(Borders::ALL));
        frame.render_widget(help, area);
    }
}

fn footer_hint(state: &AppState) -> &'static str {
    if state.overlay.is_open() {
        return "↑↓ scroll  ←→ column  s sort  esc close";
    }
    match state.active_tab {
        TabKind::Home => "↑↓ select  enter load  d delete  ←→ tabs  ? help  q quit",
        TabKind::Data | TabKind::Chart => {
            "↑↓ select  enter drill down  ←→ tabs  r reload  ? help  q quit"
        }
        _ => "↑↓ scroll  ←→ tabs  1-5 jump  r reload  ? help  q quit",
    }
}

fn help_overlay_text() -> String {
    [
        "←/→, 1-5        switch tab",
        "↑/↓             move selection / scroll",
        "pgup/pgdn       move by ten",
        "home/end        jump to first / last",
        "enter or x      drill into the selected point (data/chart)",
        "enter           load the selected past analysis (home)",
        "d               delete the selected past analysis (home)",
        "s               cycle overlay sort: asc → desc → off",
        "esc             close overlay",
        "r               reload the data file",
        "?               toggle this help",
        "q / ctrl-q      quit",
        "",
        "any key closes this overlay",
    ]
    .join("\n")
}

fn render_home(frame: &mut ratatui::Frame<'_>, area: Rect, state: &AppState, view_data: &mut ViewData) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(7), Constraint::Min(1)])
        .split(area);

    let summary = match state.snapshot.as_ref() {
        Some(snapshot) => {
            let mut lines = vec![
                format!("title: {}", snapshot.title),
                format!(
                    "kind: {}   rows: {}{}",
                    snapshot.chart_kind.as_str(),
                    snapshot.rows.len(),
                    match snapshot.status {
                        SnapshotStatus::Truncated { original_count } => {
                            format!(" (truncated from {original_count})")
                        }
                        SnapshotStatus::Complete => String::new(),
                    }
                ),
                format!("axes: {} × {}", snapshot.x_field, snapshot.y_field),
                format!("received: {}", format_timestamp(snapshot.created_at)),
            ];
            if let Some(database) = &snapshot.database {
                lines.push(format!("database: {database}"));
            }
            lines.join("\n")
        }
        None => format!(
            "{} waiting for a snapshot...",
            SPINNER_FRAMES[(view_data.frame as usize) % SPINNER_FRAMES.len()]
        ),
    };
    let summary_widget = Paragraph::new(summary)
        .block(Block::default().title("current").borders(Borders::ALL));
    frame.render_widget(summary_widget, sections[0]);

    let history_area = sections[1];
    if state.history.is_empty() {
        let empty = Paragraph::new("no archived analyses yet")
            .block(Block::default().title("history").borders(Borders::ALL));
        frame.render_widget(empty, history_area);
        return;
    }

    let visible = history_area.height.saturating_sub(3) as usize;
    view_data.home_scroll = scroll_window(
        view_data.home_scroll,
        state.selections.home_row,
        visible.max(1),
    );

    let header = Row::new(vec!["archived", "title", "rows", "kind"]).style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    );
    let rows: Vec<Row> = state
        .history
        .iter()
        .enumerate()
        .skip(view_data.home_scroll)
        .take(visible.max(1))
        .map(|(index, entry)| {
            let row = Row::new(vec![
                Cell::from(format_timestamp(entry.archived_at)),
                Cell::from(entry.title.clone()),
                Cell::from(entry.row_count.to_string()),
                Cell::from(entry.chart_kind.as_str()),
            ]);
            if index == state.selections.home_row {
                row.style(
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                )
            } else {
                row
            }
        })
        .collect();

    let widths = [
        Constraint::Length(20),
        Constraint::Min(20),
        Constraint::Length(6),
        Constraint::Length(8),
    ];
    let table = Table::new(rows, widths).header(header).block(
        Block::default()
            .title(format!("history ({})", state.history.len()))
            .borders(Borders::ALL),
    );
    frame.render_widget(table, history_area);
}

fn render_query(frame: &mut ratatui::Frame<'_>, area: Rect, state: &AppState, view_data: &ViewData) {
    let Some(snapshot) = state.snapshot.as_ref() else {
        render_waiting(frame, area, view_data, "query");
        return;
    };
    let text = format_sql(&snapshot.query);
    let widget = Paragraph::new(text)
        .scroll((state.selections.query_scroll as u16, 0))
        .block(
            Block::default()
                .title(format!("query: {}", snapshot.title))
                .borders(Borders::ALL),
        );
    frame.render_widget(widget, area);
}

fn render_mask(frame: &mut ratatui::Frame<'_>, area: Rect, state: &AppState) {
    let Some(snapshot) = state.snapshot.as_ref() else {
        let widget = Paragraph::new("waiting for a snapshot...")
            .block(Block::default().title("mask").borders(Borders::ALL));
        frame.render_widget(widget, area);
        return;
    };

    let mut lines = vec![
        format!("x axis ← {}", snapshot.x_field),
        format!("y axis ← {}", snapshot.y_field),
        String::new(),
        "columns:".to_owned(),
    ];
    for column in &snapshot.columns {
        let role = if column == &snapshot.x_field {
            " (x)"
        } else if column == &snapshot.y_field {
            " (y)"
        } else {
            ""
        };
        lines.push(format!("  {column}{role}"));
    }
    if let Some(drill) = &snapshot.drill_down {
        lines.push(String::new());
        lines.push("drill-down:".to_owned());
        if !drill.description.is_empty() {
            lines.push(format!("  {}", drill.description));
        }
        lines.push(format!("  template: {}", drill.query_template));
        for (placeholder, column) in &drill.param_mapping {
            lines.push(format!("  {{{{{placeholder}}}}} ← {column}"));
        }
    }

    let widget = Paragraph::new(lines.join("\n"))
        .block(Block::default().title("mask").borders(Borders::ALL));
    frame.render_widget(widget, area);
}

fn render_data(frame: &mut ratatui::Frame<'_>, area: Rect, state: &AppState, view_data: &mut ViewData) {
    let Some(snapshot) = state.snapshot.as_ref() else {
        render_waiting(frame, area, view_data, "data");
        return;
    };

    let title = match snapshot.status {
        SnapshotStatus::Truncated { original_count } => format!(
            "data ({} of {original_count} rows, truncated)",
            snapshot.rows.len()
        ),
        SnapshotStatus::Complete if snapshot.is_sparse() => {
            format!("data ({} rows, too few to chart well)", snapshot.rows.len())
        }
        SnapshotStatus::Complete => format!("data ({} rows)", snapshot.rows.len()),
    };

    let visible = area.height.saturating_sub(3) as usize;
    view_data.data_scroll = scroll_window(
        view_data.data_scroll,
        state.selections.data_row,
        visible.max(1),
    );
    view_data.layout.data_rows = Rect {
        x: area.x + 1,
        y: area.y + 2,
        width: area.width.saturating_sub(2),
        height: area.height.saturating_sub(3),
    };

    let header = Row::new(
        snapshot
            .columns
            .iter()
            .map(|column| Cell::from(column.clone()))
            .collect::<Vec<Cell>>(),
    )
    .style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    );

    let rows: Vec<Row> = snapshot
        .rows
        .iter()
        .enumerate()
        .skip(view_data.data_scroll)
        .take(visible.max(1))
        .map(|(index, row)| {
            let cells: Vec<Cell> = row.iter().map(|value| Cell::from(cell_text(value))).collect();
            let table_row = Row::new(cells);
            if index == state.selections.data_row {
                table_row.style(
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                )
            } else {
                table_row
            }
        })
        .collect();

    let column_count = snapshot.columns.len().max(1) as u32;
    let widths = vec![Constraint::Ratio(1, column_count); column_count as usize];
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().title(title).borders(Borders::ALL));
    frame.render_widget(table, area);
}

fn render_chart(frame: &mut ratatui::Frame<'_>, area: Rect, state: &AppState, view_data: &mut ViewData) {
    let Some(snapshot) = state.snapshot.as_ref() else {
        render_waiting(frame, area, view_data, "chart");
        return;
    };

    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(3)])
        .split(area);
    view_data.layout.chart = sections[0];

    if snapshot.rows.is_empty() {
        let widget = Paragraph::new("no rows to chart")
            .block(Block::default().title("chart").borders(Borders::ALL));
        frame.render_widget(widget, sections[0]);
        return;
    }

    let selected = state.selections.chart_point.min(snapshot.rows.len() - 1);
    let title = format!("{} ({})", snapshot.title, snapshot.chart_kind.as_str());

    match snapshot.chart_kind {
        ChartKind::Bar => {
            let inner_width = sections[0].width.saturating_sub(2) as usize;
            let slot = (inner_width / snapshot.rows.len()).max(1);
            let bars: Vec<Bar> = snapshot
                .rows
                .iter()
                .enumerate()
                .map(|(index, row)| {
                    let value = snapshot.y_number(row).max(0.0).round() as u64;
                    let label = truncate_label(&snapshot.x_text(row), slot);
                    let style = if index == selected {
                        Style::default().fg(Color::Yellow)
                    } else {
                        Style::default().fg(Color::Cyan)
                    };
                    Bar::default()
                        .value(value)
                        .label(Line::from(label))
                        .style(style)
                })
                .collect();
            let chart = BarChart::default()
                .block(Block::default().title(title).borders(Borders::ALL))
                .data(BarGroup::default().bars(&bars))
                .bar_width(slot.saturating_sub(1).max(1) as u16)
                .bar_gap(1);
            frame.render_widget(chart, sections[0]);
        }
        ChartKind::Line | ChartKind::Scatter => {
            let points: Vec<(f64, f64)> = snapshot
                .rows
                .iter()
                .enumerate()
                .map(|(index, row)| (index as f64, snapshot.y_number(row)))
                .collect();
            let selected_point = [points[selected]];

            let graph_type = if snapshot.chart_kind == ChartKind::Line {
                GraphType::Line
            } else {
                GraphType::Scatter
            };
            let datasets = vec![
                Dataset::default()
                    .name(snapshot.y_field.clone())
                    .marker(symbols::Marker::Braille)
                    .graph_type(graph_type)
                    .style(Style::default().fg(Color::Cyan))
                    .data(&points),
                Dataset::default()
                    .marker(symbols::Marker::Dot)
                    .graph_type(GraphType::Scatter)
                    .style(Style::default().fg(Color::Yellow))
                    .data(&selected_point),
            ];

            let x_max = (snapshot.rows.len() - 1).max(1) as f64;
            let (y_min, y_max) = pad_bounds(snapshot.min_y(), snapshot.max_y());
            let first_label = snapshot.x_text(&snapshot.rows[0]);
            let last_label = snapshot.x_text(&snapshot.rows[snapshot.rows.len() - 1]);

            let chart = Chart::new(datasets)
                .block(Block::default().title(title).borders(Borders::ALL))
                .x_axis(
                    Axis::default()
                        .style(Style::default().fg(Color::DarkGray))
                        .bounds([0.0, x_max])
                        .labels([first_label, last_label]),
                )
                .y_axis(
                    Axis::default()
                        .style(Style::default().fg(Color::DarkGray))
                        .bounds([y_min, y_max])
                        .labels([format!("{y_min:.0}"), format!("{y_max:.0}")]),
                );
            frame.render_widget(chart, sections[0]);
        }
    }

    let detail_row = &snapshot.rows[selected];
    let detail = format!(
        "selected {}/{}: {} = {}, {} = {}",
        selected + 1,
        snapshot.rows.len(),
        snapshot.x_field,
        snapshot.x_text(detail_row),
        snapshot.y_field,
        cell_text(detail_row.get(snapshot.y_index()).unwrap_or(&serde_json::Value::Null)),
    );
    let detail_widget =
        Paragraph::new(detail).block(Block::default().borders(Borders::ALL));
    frame.render_widget(detail_widget, sections[1]);
}

fn render_overlay(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &mut ViewData) {
    let area = centered_rect(85, 80, frame.area());
    frame.render_widget(Clear, area);

    match &state.overlay {
        OverlayState::Closed => {}
        OverlayState::Running(_) => {
            let spinner = SPINNER_FRAMES[(view_data.frame as usize) % SPINNER_FRAMES.len()];
            let widget = Paragraph::new(format!("\n  {spinner} running drill-down query..."))
                .block(
                    Block::default()
                        .title("drill-down")
                        .borders(Borders::ALL)
                        .style(Style::default().fg(Color::Cyan)),
                );
            frame.render_widget(widget, area);
        }
        OverlayState::Failed(error) => {
            let widget = Paragraph::new(format!("\n  {error}\n\n  esc to dismiss")).block(
                Block::default()
                    .title("drill-down failed")
                    .borders(Borders::ALL)
                    .style(Style::default().fg(Color::Red)),
            );
            frame.render_widget(widget, area);
        }
        OverlayState::Showing(result) => {
            let visible = area.height.saturating_sub(3) as usize;
            view_data.overlay_scroll = view_data
                .overlay_scroll
                .min(result.rows.len().saturating_sub(1));

            let header_cells: Vec<Cell> = result
                .columns
                .iter()
                .enumerate()
                .map(|(index, column)| {
                    let mark = match view_data.overlay_sort {
                        Some(SortSpec {
                            column: sorted,
                            direction: SortDirection::Asc,
                        }) if sorted == index => SORT_ASC_MARK,
                        Some(SortSpec {
                            column: sorted,
                            direction: SortDirection::Desc,
                        }) if sorted == index => SORT_DESC_MARK,
                        _ => "",
                    };
                    let style = if index == view_data.overlay_cursor {
                        Style::default()
                            .fg(Color::Yellow)
                            .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
                    } else {
                        Style::default()
                            .fg(Color::Cyan)
                            .add_modifier(Modifier::BOLD)
                    };
                    Cell::from(format!("{column}{mark}")).style(style)
                })
                .collect();
            let header = Row::new(header_cells);

            let sorted = sorted_overlay_rows(result, view_data.overlay_sort);
            let rows: Vec<Row> = sorted
                .iter()
                .skip(view_data.overlay_scroll)
                .take(visible.max(1))
                .map(|row| {
                    Row::new(
                        row.iter()
                            .map(|value| Cell::from(cell_text(value)))
                            .collect::<Vec<Cell>>(),
                    )
                })
                .collect();

            let shown = result.rows.len();
            let title = match result.total_count {
                Some(total) if total > shown => {
                    format!("drill-down ({shown} of {total} rows)")
                }
                _ => format!("drill-down ({shown} rows)"),
            };

            let column_count = result.columns.len().max(1) as u32;
            let widths = vec![Constraint::Ratio(1, column_count); column_count as usize];
            let table = Table::new(rows, widths).header(header).block(
                Block::default()
                    .title(title)
                    .borders(Borders::ALL)
                    .style(Style::default().fg(Color::White)),
            );
            frame.render_widget(table, area);
        }
    }
}

fn render_waiting(frame: &mut ratatui::Frame<'_>, area: Rect, view_data: &ViewData, title: &str) {
    let spinner = SPINNER_FRAMES[(view_data.frame as usize) % SPINNER_FRAMES.len()];
    let widget = Paragraph::new(format!("{spinner} waiting for a snapshot..."))
        .block(Block::default().title(title.to_owned()).borders(Borders::ALL));
    frame.render_widget(widget, area);
}

fn scroll_window(scroll: usize, selected: usize, visible: usize) -> usize {
    if selected < scroll {
        selected
    } else if selected >= scroll + visible {
        selected + 1 - visible
    } else {
        scroll
    }
}

fn truncate_label(label: &str, width: usize) -> String {
    if width == 0 || label.chars().count() <= width {
        return label.to_owned();
    }
    label.chars().take(width.saturating_sub(1)).collect::<String>() + "…"
}

fn pad_bounds(min: f64, max: f64) -> (f64, f64) {
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    if (max - min).abs() < f64::EPSILON {
        return (min - 1.0, max + 1.0);
    }
    (min.min(0.0), max)
}

fn format_timestamp(value: OffsetDateTime) -> String {
    value
        .format(&format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_else(|_| value.unix_timestamp().to_string())
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
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
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::{
        AppRuntime, InternalEvent, SortDirection, SortSpec, ViewData, cycle_overlay_sort,
        handle_key_event, handle_mouse_event, handle_tab_click, process_internal_events,
        scroll_window, sorted_overlay_rows,
    };
    use anyhow::Result;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
    use lupa_app::{
        AppCommand, AppState, DrillDownError, DrillDownResult, HistoryEntry, HistoryEntryId,
        OverlayState, RequestId, Snapshot, TabKind,
    };
    use lupa_testkit::{orders_snapshot, regions_snapshot, timestamp};
    use ratatui::layout::Rect;
    use std::sync::mpsc::{self, Receiver, Sender};

    #[derive(Default)]
    struct TestRuntime {
        archived: Vec<String>,
        history: Vec<HistoryEntry>,
        load_result: Option<Snapshot>,
        delete_result: bool,
        reload_result: Option<Snapshot>,
        available: bool,
        spawned: Vec<(RequestId, String)>,
        cancelled: Vec<RequestId>,
    }

    impl AppRuntime for TestRuntime {
        fn archive_snapshot(&mut self, snapshot: &Snapshot) {
            self.archived.push(snapshot.title.clone());
        }

        fn list_history(&mut self) -> Result<Vec<HistoryEntry>> {
            Ok(self.history.clone())
        }

        fn load_history(&mut self, _id: &HistoryEntryId) -> Result<Option<Snapshot>> {
            Ok(self.load_result.clone())
        }

        fn delete_history(&mut self, _id: &HistoryEntryId) -> Result<bool> {
            Ok(self.delete_result)
        }

        fn reload_snapshot(&mut self) -> Result<Option<Snapshot>> {
            Ok(self.reload_result.clone())
        }

        fn drill_down_available(&self) -> bool {
            self.available
        }

        fn spawn_drill_down(
            &mut self,
            request: RequestId,
            query: &str,
            _tx: Sender<InternalEvent>,
        ) -> Result<()> {
            self.spawned.push((request, query.to_owned()));
            Ok(())
        }

        fn cancel_drill_down(&mut self, request: RequestId) {
            self.cancelled.push(request);
        }
    }

    fn channel() -> (Sender<InternalEvent>, Receiver<InternalEvent>) {
        mpsc::channel()
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn entry(id: &str, title: &str) -> HistoryEntry {
        HistoryEntry {
            id: HistoryEntryId::new(id),
            title: title.to_owned(),
            archived_at: timestamp(100),
            row_count: 2,
            chart_kind: lupa_app::ChartKind::Line,
        }
    }

    fn result_fixture() -> DrillDownResult {
        DrillDownResult {
            columns: vec!["name".to_owned(), "amount".to_owned()],
            rows: vec![
                vec![serde_json::json!("beta"), serde_json::json!(2)],
                vec![serde_json::json!("alpha"), serde_json::json!(30)],
                vec![serde_json::json!("gamma"), serde_json::json!(1)],
            ],
            total_count: Some(3),
        }
    }

    fn pump<R: AppRuntime>(
        state: &mut AppState,
        runtime: &mut R,
        view_data: &mut ViewData,
        tx: &Sender<InternalEvent>,
        rx: &Receiver<InternalEvent>,
    ) {
        process_internal_events(state, runtime, view_data, tx, rx);
    }

    #[test]
    fn snapshot_event_ingests_and_archives_previous() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();
        let (tx, rx) = channel();

        tx.send(InternalEvent::SnapshotLoaded(Box::new(orders_snapshot(
            "first", 3,
        ))))
        .expect("send");
        pump(&mut state, &mut runtime, &mut view_data, &tx, &rx);
        assert!(runtime.archived.is_empty());

        tx.send(InternalEvent::SnapshotLoaded(Box::new(orders_snapshot(
            "second", 3,
        ))))
        .expect("send");
        pump(&mut state, &mut runtime, &mut view_data, &tx, &rx);

        assert_eq!(runtime.archived, vec!["first"]);
        assert_eq!(
            state.snapshot.as_ref().map(|snapshot| snapshot.title.as_str()),
            Some("second")
        );
        assert!(state.status_line.as_deref().unwrap_or("").contains("second"));
    }

    #[test]
    fn rejected_snapshot_keeps_the_previous_one() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();
        let (tx, rx) = channel();

        tx.send(InternalEvent::SnapshotLoaded(Box::new(orders_snapshot(
            "good", 3,
        ))))
        .expect("send");
        tx.send(InternalEvent::SnapshotRejected(
            "malformed snapshot input: missing `rows`".to_owned(),
        ))
        .expect("send");
        pump(&mut state, &mut runtime, &mut view_data, &tx, &rx);

        assert_eq!(
            state.snapshot.as_ref().map(|snapshot| snapshot.title.as_str()),
            Some("good")
        );
        assert!(
            state
                .status_line
                .as_deref()
                .unwrap_or("")
                .contains("rejected")
        );
    }

    #[test]
    fn data_file_removal_clears_and_goes_home() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();
        let (tx, rx) = channel();

        tx.send(InternalEvent::SnapshotLoaded(Box::new(orders_snapshot(
            "only", 3,
        ))))
        .expect("send");
        pump(&mut state, &mut runtime, &mut view_data, &tx, &rx);
        state.dispatch(AppCommand::SelectTab(TabKind::Chart));

        tx.send(InternalEvent::DataFileRemoved).expect("send");
        pump(&mut state, &mut runtime, &mut view_data, &tx, &rx);

        assert!(state.snapshot.is_none());
        assert_eq!(state.active_tab, TabKind::Home);
    }

    #[test]
    fn drill_down_key_resolves_template_and_spawns_query() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime {
            available: true,
            ..TestRuntime::default()
        };
        let mut view_data = ViewData::default();
        let (tx, _rx) = channel();

        state.dispatch(AppCommand::IngestSnapshot(Box::new(orders_snapshot(
            "orders", 3,
        ))));
        state.dispatch(AppCommand::SelectTab(TabKind::Data));
        state.dispatch(AppCommand::MoveSelection(1));

        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Enter));

        assert_eq!(runtime.spawned.len(), 1);
        assert!(runtime.spawned[0].1.contains("month = '2025-02'"));
        assert!(matches!(state.overlay, OverlayState::Running(_)));
    }

    #[test]
    fn drill_down_without_backend_fails_disabled() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();
        let (tx, _rx) = channel();

        state.dispatch(AppCommand::IngestSnapshot(Box::new(orders_snapshot(
            "orders", 3,
        ))));
        state.dispatch(AppCommand::SelectTab(TabKind::Data));
        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char('x')));

        assert!(runtime.spawned.is_empty());
        assert_eq!(state.overlay, OverlayState::Failed(DrillDownError::Disabled));
    }

    #[test]
    fn drill_down_without_template_fails_in_overlay() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime {
            available: true,
            ..TestRuntime::default()
        };
        let mut view_data = ViewData::default();
        let (tx, _rx) = channel();

        state.dispatch(AppCommand::IngestSnapshot(Box::new(regions_snapshot(
            "regions", 3,
        ))));
        state.dispatch(AppCommand::SelectTab(TabKind::Chart));
        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Enter));

        assert!(runtime.spawned.is_empty());
        assert_eq!(
            state.overlay,
            OverlayState::Failed(DrillDownError::TemplateMissing)
        );
    }

    #[test]
    fn retrigger_cancels_prior_request_and_discards_its_result() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime {
            available: true,
            ..TestRuntime::default()
        };
        let mut view_data = ViewData::default();
        let (tx, rx) = channel();

        state.dispatch(AppCommand::IngestSnapshot(Box::new(orders_snapshot(
            "orders", 3,
        ))));
        state.dispatch(AppCommand::SelectTab(TabKind::Data));

        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Enter));
        let first = runtime.spawned[0].0;

        // Close, move, and trigger again before the first result lands.
        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Esc));
        assert_eq!(runtime.cancelled, vec![first]);
        state.dispatch(AppCommand::MoveSelection(1));
        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Enter));
        let second = runtime.spawned[1].0;
        assert_ne!(first, second);

        tx.send(InternalEvent::DrillDownFinished {
            request: first,
            outcome: Err(DrillDownError::BackendFailure("slow".to_owned())),
        })
        .expect("send");
        tx.send(InternalEvent::DrillDownFinished {
            request: second,
            outcome: Ok(Box::new(result_fixture())),
        })
        .expect("send");
        pump(&mut state, &mut runtime, &mut view_data, &tx, &rx);

        assert!(matches!(state.overlay, OverlayState::Showing(_)));
    }

    #[test]
    fn overlay_sort_cycles_asc_desc_off() {
        let mut view_data = ViewData::default();
        cycle_overlay_sort(&mut view_data, 1);
        assert_eq!(
            view_data.overlay_sort,
            Some(SortSpec {
                column: 1,
                direction: SortDirection::Asc,
            })
        );
        cycle_overlay_sort(&mut view_data, 1);
        assert_eq!(
            view_data.overlay_sort,
            Some(SortSpec {
                column: 1,
                direction: SortDirection::Desc,
            })
        );
        cycle_overlay_sort(&mut view_data, 1);
        assert_eq!(view_data.overlay_sort, None);

        cycle_overlay_sort(&mut view_data, 1);
        cycle_overlay_sort(&mut view_data, 0);
        assert_eq!(
            view_data.overlay_sort,
            Some(SortSpec {
                column: 0,
                direction: SortDirection::Asc,
            })
        );
    }

    #[test]
    fn sorted_rows_are_a_copy_in_requested_order() {
        let result = result_fixture();

        let ascending = sorted_overlay_rows(
            &result,
            Some(SortSpec {
                column: 1,
                direction: SortDirection::Asc,
            }),
        );
        let amounts: Vec<String> = ascending
            .iter()
            .map(|row| lupa_app::cell_text(&row[1]))
            .collect();
        assert_eq!(amounts, vec!["1", "2", "30"]);

        let descending = sorted_overlay_rows(
            &result,
            Some(SortSpec {
                column: 0,
                direction: SortDirection::Desc,
            }),
        );
        let names: Vec<String> = descending
            .iter()
            .map(|row| lupa_app::cell_text(&row[0]))
            .collect();
        assert_eq!(names, vec!["gamma", "beta", "alpha"]);

        // The source result keeps file order.
        assert_eq!(lupa_app::cell_text(&result.rows[0][0]), "beta");

        let unsorted = sorted_overlay_rows(&result, None);
        assert_eq!(lupa_app::cell_text(&unsorted[0][0]), "beta");
    }

    #[test]
    fn overlay_sort_key_cycles_on_cursor_column() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime {
            available: true,
            ..TestRuntime::default()
        };
        let mut view_data = ViewData::default();
        let (tx, rx) = channel();

        state.dispatch(AppCommand::IngestSnapshot(Box::new(orders_snapshot(
            "orders", 3,
        ))));
        state.dispatch(AppCommand::SelectTab(TabKind::Data));
        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Enter));
        let request = runtime.spawned[0].0;
        tx.send(InternalEvent::DrillDownFinished {
            request,
            outcome: Ok(Box::new(result_fixture())),
        })
        .expect("send");
        pump(&mut state, &mut runtime, &mut view_data, &tx, &rx);

        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Right));
        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char('s')));
        assert_eq!(
            view_data.overlay_sort,
            Some(SortSpec {
                column: 1,
                direction: SortDirection::Asc,
            })
        );

        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Esc));
        assert_eq!(state.overlay, OverlayState::Closed);
        assert_eq!(view_data.overlay_sort, None);
    }

    #[test]
    fn history_enter_loads_and_d_deletes() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime {
            history: vec![entry("aaa111", "old orders"), entry("bbb222", "older")],
            load_result: Some(orders_snapshot("old orders", 2)),
            delete_result: true,
            ..TestRuntime::default()
        };
        let mut view_data = ViewData::default();
        let (tx, _rx) = channel();

        state.dispatch(AppCommand::ReplaceHistory(runtime.history.clone()));
        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Enter));
        assert_eq!(
            state.snapshot.as_ref().map(|snapshot| snapshot.title.as_str()),
            Some("old orders")
        );

        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char('d')));
        assert_eq!(state.history.len(), 1);
    }

    #[test]
    fn reload_key_ingests_a_fresh_snapshot() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime {
            reload_result: Some(orders_snapshot("manual", 2)),
            ..TestRuntime::default()
        };
        let mut view_data = ViewData::default();
        let (tx, _rx) = channel();

        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char('r')));
        assert_eq!(
            state.snapshot.as_ref().map(|snapshot| snapshot.title.as_str()),
            Some("manual")
        );
    }

    #[test]
    fn quit_keys_end_the_loop() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();
        let (tx, _rx) = channel();

        assert!(handle_key_event(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            key(KeyCode::Char('q')),
        ));
        assert!(handle_key_event(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            KeyEvent::new(KeyCode::Char('q'), KeyModifiers::CONTROL),
        ));
    }

    #[test]
    fn help_opens_and_any_key_closes() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();
        let (tx, _rx) = channel();

        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char('?')));
        assert!(state.help_visible);
        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char('z')));
        assert!(!state.help_visible);
    }

    #[test]
    fn tab_click_selects_by_position() {
        let mut state = AppState::default();
        let view_data = ViewData {
            layout: super::LayoutAreas {
                tabs: Rect::new(0, 0, 50, 3),
                ..super::LayoutAreas::default()
            },
            ..ViewData::default()
        };

        handle_tab_click(&mut state, &view_data, 25);
        assert_eq!(state.active_tab, TabKind::Mask);
        handle_tab_click(&mut state, &view_data, 45);
        assert_eq!(state.active_tab, TabKind::Chart);
    }

    #[test]
    fn data_click_selects_then_drills() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime {
            available: true,
            ..TestRuntime::default()
        };
        let mut view_data = ViewData::default();
        view_data.layout.content = Rect::new(0, 3, 80, 20);
        view_data.layout.data_rows = Rect::new(1, 5, 78, 17);
        let (tx, _rx) = channel();

        state.dispatch(AppCommand::IngestSnapshot(Box::new(orders_snapshot(
            "orders", 5,
        ))));
        state.dispatch(AppCommand::SelectTab(TabKind::Data));

        let click = |col: u16, row: u16| MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column: col,
            row,
            modifiers: KeyModifiers::NONE,
        };

        handle_mouse_event(&mut state, &mut runtime, &mut view_data, &tx, click(10, 7));
        assert_eq!(state.selections.data_row, 2);
        assert!(runtime.spawned.is_empty());

        handle_mouse_event(&mut state, &mut runtime, &mut view_data, &tx, click(10, 7));
        assert_eq!(runtime.spawned.len(), 1);
    }

    #[test]
    fn wheel_scroll_moves_the_selection() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();
        let (tx, _rx) = channel();

        state.dispatch(AppCommand::IngestSnapshot(Box::new(orders_snapshot(
            "orders", 10,
        ))));
        state.dispatch(AppCommand::SelectTab(TabKind::Data));

        let wheel = MouseEvent {
            kind: MouseEventKind::ScrollDown,
            column: 5,
            row: 5,
            modifiers: KeyModifiers::NONE,
        };
        handle_mouse_event(&mut state, &mut runtime, &mut view_data, &tx, wheel);
        assert_eq!(state.selections.data_row, 3);
    }

    #[test]
    fn scroll_window_keeps_the_selection_visible() {
        assert_eq!(scroll_window(0, 3, 10), 0);
        assert_eq!(scroll_window(0, 12, 10), 3);
        assert_eq!(scroll_window(5, 2, 10), 2);
        assert_eq!(scroll_window(3, 7, 10), 3);
    }
}
