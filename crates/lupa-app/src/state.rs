// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};

use crate::ids::{HistoryEntryId, RequestId};
use crate::model::{DrillDownError, DrillDownResult, HistoryEntry, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TabKind {
    Home,
    Query,
    Mask,
    Data,
    Chart,
}

impl TabKind {
    pub const ALL: [Self; 5] = [Self::Home, Self::Query, Self::Mask, Self::Data, Self::Chart];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Query => "query",
            Self::Mask => "mask",
            Self::Data => "data",
            Self::Chart => "chart",
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayState {
    Closed,
    Running(RequestId),
    Showing(Box<DrillDownResult>),
    Failed(DrillDownError),
}

impl OverlayState {
    pub const fn is_open(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOrigin {
    Ingested,
    History(HistoryEntryId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selections {
    pub home_row: usize,
    pub query_scroll: usize,
    pub mask_scroll: usize,
    pub data_row: usize,
    pub chart_point: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub snapshot: Option<Snapshot>,
    pub origin: SnapshotOrigin,
    pub active_tab: TabKind,
    pub selections: Selections,
    pub overlay: OverlayState,
    pub history: Vec<HistoryEntry>,
    pub help_visible: bool,
    pub status_line: Option<String>,
    next_request: RequestId,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            snapshot: None,
            origin: SnapshotOrigin::Ingested,
            active_tab: TabKind::Home,
            selections: Selections::default(),
            overlay: OverlayState::Closed,
            history: Vec::new(),
            help_visible: false,
            status_line: None,
            next_request: RequestId::new(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    IngestSnapshot(Box<Snapshot>),
    ClearData,
    NextTab,
    PrevTab,
    SelectTab(TabKind),
    MoveSelection(isize),
    SelectIndex(usize),
    JumpSelectionFirst,
    JumpSelectionLast,
    RequestDrillDown,
    FinishDrillDown {
        request: RequestId,
        result: Box<DrillDownResult>,
    },
    FailDrillDown {
        request: RequestId,
        error: DrillDownError,
    },
    CloseOverlay,
    ReplaceHistory(Vec<HistoryEntry>),
    LoadHistorySnapshot {
        id: HistoryEntryId,
        snapshot: Box<Snapshot>,
    },
    RemoveHistoryEntry(HistoryEntryId),
    ToggleHelp,
    SetStatus(String),
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    SnapshotReplaced,
    ArchivePrevious(Box<Snapshot>),
    DataCleared,
    TabChanged(TabKind),
    SelectionMoved(TabKind, usize),
    DrillDownStarted(RequestId),
    OverlayChanged,
    HistoryChanged,
    HelpToggled(bool),
    StatusUpdated(String),
    StatusCleared,
}

impl AppState {
    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::IngestSnapshot(snapshot) => self.replace_snapshot(*snapshot, None),
            AppCommand::ClearData => {
                let mut events = Vec::new();
                if self.snapshot.take().is_some() {
                    events.push(AppEvent::DataCleared);
                }
                self.selections = Selections::default();
                self.overlay = OverlayState::Closed;
                if self.active_tab != TabKind::Home {
                    self.active_tab = TabKind::Home;
                    events.push(AppEvent::TabChanged(self.active_tab));
                }
                events
            }
            AppCommand::NextTab => self.rotate_tab(1),
            AppCommand::PrevTab => self.rotate_tab(-1),
            AppCommand::SelectTab(tab) => {
                if self.active_tab == tab {
                    return Vec::new();
                }
                self.active_tab = tab;
                vec![AppEvent::TabChanged(tab)]
            }
            AppCommand::MoveSelection(delta) => self.move_selection(delta),
            AppCommand::SelectIndex(index) => self.jump_selection(index),
            AppCommand::JumpSelectionFirst => self.jump_selection(0),
            AppCommand::JumpSelectionLast => {
                let last = self.selection_limit().saturating_sub(1);
                self.jump_selection(last)
            }
            AppCommand::RequestDrillDown => self.request_drill_down(),
            AppCommand::FinishDrillDown { request, result } => {
                if self.overlay != OverlayState::Running(request) {
                    return Vec::new();
                }
                self.overlay = OverlayState::Showing(result);
                vec![AppEvent::OverlayChanged]
            }
            AppCommand::FailDrillDown { request, error } => {
                if self.overlay != OverlayState::Running(request) {
                    return Vec::new();
                }
                self.overlay = OverlayState::Failed(error);
                vec![AppEvent::OverlayChanged]
            }
            AppCommand::CloseOverlay => {
                if !self.overlay.is_open() {
                    return Vec::new();
                }
                self.overlay = OverlayState::Closed;
                vec![AppEvent::OverlayChanged]
            }
            AppCommand::ReplaceHistory(entries) => {
                self.history = entries;
                let limit = self.history.len().saturating_sub(1);
                self.selections.home_row = self.selections.home_row.min(limit);
                vec![AppEvent::HistoryChanged]
            }
            AppCommand::LoadHistorySnapshot { id, snapshot } => {
                self.replace_snapshot(*snapshot, Some(id))
            }
            AppCommand::RemoveHistoryEntry(id) => {
                let before = self.history.len();
                self.history.retain(|entry| entry.id != id);
                if self.history.len() == before {
                    return Vec::new();
                }
                let limit = self.history.len().saturating_sub(1);
                self.selections.home_row = self.selections.home_row.min(limit);
                vec![AppEvent::HistoryChanged]
            }
            AppCommand::ToggleHelp => {
                self.help_visible = !self.help_visible;
                vec![AppEvent::HelpToggled(self.help_visible)]
            }
            AppCommand::SetStatus(message) => {
                self.status_line = Some(message.clone());
                vec![AppEvent::StatusUpdated(message)]
            }
            AppCommand::ClearStatus => {
                self.status_line = None;
                vec![AppEvent::StatusCleared]
            }
        }
    }

    pub fn running_request(&self) -> Option<RequestId> {
        match self.overlay {
            OverlayState::Running(request) => Some(request),
            _ => None,
        }
    }

    pub fn selected_row(&self) -> Option<usize> {
        let snapshot = self.snapshot.as_ref()?;
        if snapshot.rows.is_empty() {
            return None;
        }
        match self.active_tab {
            TabKind::Data => Some(self.selections.data_row),
            TabKind::Chart => Some(self.selections.chart_point),
            _ => None,
        }
    }

    fn replace_snapshot(
        &mut self,
        snapshot: Snapshot,
        loaded_from: Option<HistoryEntryId>,
    ) -> Vec<AppEvent> {
        let mut events = Vec::new();
        let had_previous = self.snapshot.is_some();
        if let Some(previous) = self.snapshot.take() {
            // A snapshot that came back out of the archive is already there.
            if self.origin == SnapshotOrigin::Ingested {
                events.push(AppEvent::ArchivePrevious(Box::new(previous)));
            }
        }

        self.snapshot = Some(snapshot);
        self.origin = loaded_from.map_or(SnapshotOrigin::Ingested, SnapshotOrigin::History);
        self.selections = Selections::default();
        self.overlay = OverlayState::Closed;
        if !had_previous && self.active_tab != TabKind::Home {
            self.active_tab = TabKind::Home;
            events.push(AppEvent::TabChanged(self.active_tab));
        }
        events.push(AppEvent::SnapshotReplaced);
        events
    }

    fn rotate_tab(&mut self, delta: isize) -> Vec<AppEvent> {
        let tabs = TabKind::ALL;
        let current = tabs
            .iter()
            .position(|tab| *tab == self.active_tab)
            .unwrap_or(0) as isize;
        let len = tabs.len() as isize;
        let next = (current + delta).rem_euclid(len) as usize;
        self.active_tab = tabs[next];
        vec![AppEvent::TabChanged(self.active_tab)]
    }

    fn selection_limit(&self) -> usize {
        match self.active_tab {
            TabKind::Home => self.history.len(),
            TabKind::Query => self
                .snapshot
                .as_ref()
                .map_or(0, |snapshot| crate::format_sql(&snapshot.query).lines().count()),
            TabKind::Mask => self.snapshot.as_ref().map_or(0, mask_line_count),
            TabKind::Data | TabKind::Chart => {
                self.snapshot.as_ref().map_or(0, |snapshot| snapshot.rows.len())
            }
        }
    }

    fn selection_slot(&mut self) -> &mut usize {
        match self.active_tab {
            TabKind::Home => &mut self.selections.home_row,
            TabKind::Query => &mut self.selections.query_scroll,
            TabKind::Mask => &mut self.selections.mask_scroll,
            TabKind::Data => &mut self.selections.data_row,
            TabKind::Chart => &mut self.selections.chart_point,
        }
    }

    fn move_selection(&mut self, delta: isize) -> Vec<AppEvent> {
        let limit = self.selection_limit();
        if limit == 0 {
            return Vec::new();
        }
        let tab = self.active_tab;
        let slot = self.selection_slot();
        let moved = if delta < 0 {
            slot.saturating_sub(delta.unsigned_abs())
        } else {
            slot.saturating_add(delta as usize)
        };
        *slot = moved.min(limit - 1);
        let position = *slot;
        vec![AppEvent::SelectionMoved(tab, position)]
    }

    fn jump_selection(&mut self, target: usize) -> Vec<AppEvent> {
        let limit = self.selection_limit();
        if limit == 0 {
            return Vec::new();
        }
        let tab = self.active_tab;
        let slot = self.selection_slot();
        *slot = target.min(limit - 1);
        let position = *slot;
        vec![AppEvent::SelectionMoved(tab, position)]
    }

    fn request_drill_down(&mut self) -> Vec<AppEvent> {
        if !matches!(self.active_tab, TabKind::Data | TabKind::Chart) {
            return Vec::new();
        }
        let Some(snapshot) = self.snapshot.as_ref() else {
            return Vec::new();
        };
        if snapshot.rows.is_empty() {
            return Vec::new();
        }
        if snapshot.drill_down.is_none() {
            self.overlay = OverlayState::Failed(DrillDownError::TemplateMissing);
            return vec![AppEvent::OverlayChanged];
        }

        let request = self.next_request;
        self.next_request = self.next_request.next();
        self.overlay = OverlayState::Running(request);
        vec![AppEvent::DrillDownStarted(request)]
    }
}

// Upper bound for the mask tab's scroll: axis lines, the column list, and
// the drill-down block when present.
fn mask_line_count(snapshot: &Snapshot) -> usize {
    let drill_lines = snapshot
        .drill_down
        .as_ref()
        .map_or(0, |spec| 4 + spec.param_mapping.len());
    4 + snapshot.columns.len() + drill_lines
}
