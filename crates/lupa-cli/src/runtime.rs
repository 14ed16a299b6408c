// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use lupa_app::{HistoryEntry, HistoryEntryId, RequestId, Snapshot};
use lupa_query::{CancelFlag, Client};
use lupa_store::Store;
use lupa_tui::{AppRuntime, InternalEvent};
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::thread;
use time::OffsetDateTime;
use tracing::{debug, error, warn};

pub struct QueryRuntime<'a> {
    store: &'a Store,
    client: Option<Client>,
    data_path: PathBuf,
    active_entry: Option<HistoryEntryId>,
    in_flight: Option<(RequestId, CancelFlag)>,
}

impl<'a> QueryRuntime<'a> {
    pub fn new(store: &'a Store, client: Option<Client>, data_path: PathBuf) -> Self {
        Self {
            store,
            client,
            data_path,
            active_entry: None,
            in_flight: None,
        }
    }
}

impl AppRuntime for QueryRuntime<'_> {
    fn archive_snapshot(&mut self, snapshot: &Snapshot) {
        // Fire-and-forget: ingestion never waits on archival, and archival
        // failures never reach the user.
        match self.store.append(snapshot, OffsetDateTime::now_utc()) {
            Ok(entry) => {
                debug!(id = %entry.id, title = %entry.title, "snapshot archived");
                if let Err(prune_error) = self.store.prune(self.active_entry.as_ref()) {
                    warn!(%prune_error, "history prune failed");
                }
            }
            Err(append_error) => {
                error!(%append_error, "snapshot archive failed");
            }
        }
        self.active_entry = None;
    }

    fn list_history(&mut self) -> Result<Vec<HistoryEntry>> {
        self.store.list()
    }

    fn load_history(&mut self, id: &HistoryEntryId) -> Result<Option<Snapshot>> {
        let snapshot = self.store.load(id)?;
        if snapshot.is_some() {
            self.active_entry = Some(id.clone());
        }
        Ok(snapshot)
    }

    fn delete_history(&mut self, id: &HistoryEntryId) -> Result<bool> {
        self.store.delete(id)
    }

    fn reload_snapshot(&mut self) -> Result<Option<Snapshot>> {
        let snapshot = crate::watcher::load_snapshot(&self.data_path)?;
        if snapshot.is_some() {
            self.active_entry = None;
        }
        Ok(snapshot)
    }

    fn drill_down_available(&self) -> bool {
        self.client.is_some()
    }

    fn spawn_drill_down(
        &mut self,
        request: RequestId,
        query: &str,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let Some(client) = self.client.clone() else {
            return Err(anyhow::anyhow!("analytical backend is not configured"));
        };

        // One query in flight at a time: a newer request quietly invalidates
        // the previous worker.
        if let Some((_, flag)) = self.in_flight.take() {
            flag.cancel();
        }
        let flag = CancelFlag::new();
        self.in_flight = Some((request, flag.clone()));

        let query = query.to_owned();
        thread::spawn(move || {
            debug!(request = request.get(), "drill-down query started");
            let outcome = client.execute(&query).map(Box::new);
            if flag.is_cancelled() {
                debug!(request = request.get(), "drill-down result discarded");
                return;
            }
            match &outcome {
                Ok(result) => debug!(
                    request = request.get(),
                    rows = result.rows.len(),
                    "drill-down query finished"
                ),
                Err(error) => debug!(request = request.get(), %error, "drill-down query failed"),
            }
            let _ = tx.send(InternalEvent::DrillDownFinished { request, outcome });
        });
        Ok(())
    }

    fn cancel_drill_down(&mut self, request: RequestId) {
        if let Some((in_flight, flag)) = &self.in_flight {
            if *in_flight == request {
                flag.cancel();
                self.in_flight = None;
            }
        }
    }
}
