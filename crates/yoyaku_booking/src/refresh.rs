// --- File: crates/yoyaku_booking/src/refresh.rs ---
//! Background cache warming.
//!
//! A refresh batch walks the studio catalog, then refetches range
//! snapshots for every free-slot room over two consecutive windows
//! (base window per room, plus one program-narrowed window per fully
//! configured program). Tasks fan out through a bounded concurrent
//! stream; individual failures are recorded and never abort the batch.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use yoyaku_common::services::{BookingSystem, ProgramId, Room, RoomId};
use yoyaku_config::RefreshConfig;

use crate::cache::{MasterCache, RangeKey};
use crate::error::BookingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStatus {
    Success,
    Partial,
    Failed,
}

/// Outcome of one refresh batch.
#[derive(Debug, Clone)]
pub struct RefreshReport {
    pub status: RefreshStatus,
    pub refreshed: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// One range snapshot to refetch.
struct RefreshTask {
    room_id: RoomId,
    date_from: NaiveDate,
    date_to: NaiveDate,
    program_id: Option<ProgramId>,
}

pub struct RefreshScheduler {
    system: Arc<dyn BookingSystem>,
    cache: Arc<MasterCache>,
    config: RefreshConfig,
    tz: Tz,
}

impl RefreshScheduler {
    pub fn new(
        system: Arc<dyn BookingSystem>,
        cache: Arc<MasterCache>,
        config: RefreshConfig,
        time_zone: &str,
    ) -> Result<Self, BookingError> {
        let tz: Tz = time_zone
            .parse()
            .map_err(|_| BookingError::Validation(format!("unknown timezone {time_zone}")))?;
        Ok(RefreshScheduler {
            system,
            cache,
            config,
            tz,
        })
    }

    /// Runs one full refresh batch and reports the outcome.
    pub async fn refresh_all(&self) -> RefreshReport {
        let mut errors = Vec::new();
        let tasks = match self.collect_tasks(&mut errors).await {
            Some(tasks) => tasks,
            None => {
                return RefreshReport {
                    status: RefreshStatus::Failed,
                    refreshed: 0,
                    failed: errors.len(),
                    errors,
                }
            }
        };

        let total = tasks.len();
        let results: Vec<Result<(), String>> = stream::iter(tasks)
            .map(|task| self.run_task(task))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut refreshed = 0;
        for result in results {
            match result {
                Ok(()) => refreshed += 1,
                Err(err) => errors.push(err),
            }
        }
        let failed = errors.len();
        let status = if failed == 0 {
            RefreshStatus::Success
        } else if refreshed > 0 {
            RefreshStatus::Partial
        } else {
            RefreshStatus::Failed
        };
        info!(total, refreshed, failed, ?status, "Cache refresh batch finished");
        RefreshReport {
            status,
            refreshed,
            failed,
            errors,
        }
    }

    /// Expands the studio catalog into per-room refresh tasks. Returns
    /// `None` when even the studio list cannot be fetched.
    async fn collect_tasks(&self, errors: &mut Vec<String>) -> Option<Vec<RefreshTask>> {
        let studios = match self.system.list_studios().await {
            Ok(studios) => studios,
            Err(err) => {
                errors.push(format!("list_studios: {err}"));
                return None;
            }
        };

        let today = Utc::now().with_timezone(&self.tz).date_naive();
        let window = Duration::days(self.config.window_days.max(1));
        // Two consecutive windows so the horizon never goes cold between
        // batches.
        let spans = [
            (today, today + window - Duration::days(1)),
            (today + window, today + window * 2 - Duration::days(1)),
        ];

        let mut tasks = Vec::new();
        for studio in &studios {
            if !self.config.studio_filter.is_empty()
                && !self.config.studio_filter.contains(&studio.id)
            {
                continue;
            }
            let rooms: Vec<Room> = match self.system.list_rooms(studio.id).await {
                Ok(rooms) => rooms,
                Err(err) => {
                    errors.push(format!("list_rooms({}): {err}", studio.id));
                    continue;
                }
            };
            let programs = match self.system.list_programs(studio.id).await {
                Ok(programs) => programs,
                Err(err) => {
                    errors.push(format!("list_programs({}): {err}", studio.id));
                    continue;
                }
            };
            self.cache.programs.insert(studio.id, programs.clone());
            self.cache.rooms.insert(studio.id, rooms.clone());

            for room in rooms.iter().filter(|r| r.free_slot_enabled) {
                for &(date_from, date_to) in &spans {
                    tasks.push(RefreshTask {
                        room_id: room.id,
                        date_from,
                        date_to,
                        program_id: None,
                    });
                    for program in programs.iter().filter(|p| p.is_fully_configured()) {
                        tasks.push(RefreshTask {
                            room_id: room.id,
                            date_from,
                            date_to,
                            program_id: Some(program.id),
                        });
                    }
                }
            }
        }
        self.cache.studios.insert((), studios);
        Some(tasks)
    }

    async fn run_task(&self, task: RefreshTask) -> Result<(), String> {
        let snapshots = self
            .system
            .fetch_range_schedule(task.room_id, task.date_from, task.date_to, task.program_id)
            .await
            .map_err(|err| {
                warn!(
                    room_id = task.room_id,
                    from = %task.date_from,
                    to = %task.date_to,
                    program_id = task.program_id,
                    error = %err,
                    "Range refresh failed"
                );
                format!(
                    "range {} {}..{} program {:?}: {err}",
                    task.room_id, task.date_from, task.date_to, task.program_id
                )
            })?;

        // The unnarrowed range doubles as the per-day schedule source.
        if task.program_id.is_none() {
            for snapshot in &snapshots {
                self.cache
                    .schedules
                    .insert((snapshot.room_id, snapshot.date), snapshot.clone());
            }
        }
        self.cache.ranges.insert(
            RangeKey {
                room_id: task.room_id,
                date_from: task.date_from,
                date_to: task.date_to,
                program_id: task.program_id,
            },
            snapshots,
        );
        Ok(())
    }
}
