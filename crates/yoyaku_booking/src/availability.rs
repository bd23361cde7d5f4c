// --- File: crates/yoyaku_booking/src/availability.rs ---
//! Availability resolution.
//!
//! Pure functions over a schedule snapshot: no I/O, no clock access, so
//! the same `(candidates, snapshot, request)` triple always yields the
//! same ordered result. Candidates are examined in pool order and the
//! caller takes the first hit; despite what the upstream's endpoint names
//! suggest, nothing here is randomized.

use chrono::{DateTime, Duration, Utc};

use yoyaku_common::services::{
    BlockKind, Candidate, CandidateId, CandidateKind, ScheduleSnapshot, Seat, StudioId,
};

/// Which candidates a request may be assigned to.
#[derive(Debug, Clone, Default)]
pub enum CandidatePool {
    #[default]
    Unrestricted,
    AllowList(Vec<CandidateId>),
}

impl CandidatePool {
    fn admits(&self, id: CandidateId) -> bool {
        match self {
            CandidatePool::Unrestricted => true,
            CandidatePool::AllowList(ids) => ids.contains(&id),
        }
    }
}

/// A free-slot availability question.
#[derive(Debug, Clone)]
pub struct SlotRequest {
    pub studio_id: StudioId,
    pub start: DateTime<Utc>,
    pub duration: Duration,
    /// Staff-only widening before the appointment.
    pub buffer_before: Duration,
    /// Staff-only widening after the appointment.
    pub buffer_after: Duration,
    pub pool: CandidatePool,
}

impl SlotRequest {
    fn end(&self) -> DateTime<Utc> {
        self.start + self.duration
    }
}

fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && a_end > b_start
}

/// Returns the candidates free for the requested window, in pool order.
///
/// A candidate passes when, in order:
/// 1. the pool restriction admits it;
/// 2. its studio associations are empty (universal) or include the
///    request's studio;
/// 3. staff only: one of its shift windows fully contains the request
///    window. The schedule publishes shifts for staff alone, so a
///    resource is schedulable all day and constrained purely by blocks;
/// 4. no `break`/`derived-buffer` block overlaps the unwidened window
///    (those blocks are pre-widened or hard);
/// 5. no `reservation` block overlaps the buffer-widened window (staff)
///    or the unwidened window (resources).
///
/// An empty result means no candidate is available.
pub fn resolve_candidates(
    candidates: &[Candidate],
    snapshot: &ScheduleSnapshot,
    request: &SlotRequest,
) -> Vec<CandidateId> {
    candidates
        .iter()
        .filter(|candidate| is_available(candidate, snapshot, request))
        .map(|candidate| candidate.id)
        .collect()
}

fn is_available(
    candidate: &Candidate,
    snapshot: &ScheduleSnapshot,
    request: &SlotRequest,
) -> bool {
    if !request.pool.admits(candidate.id) {
        return false;
    }
    if !candidate.studio_ids.is_empty() && !candidate.studio_ids.contains(&request.studio_id) {
        return false;
    }

    // Shift windows exist for staff only; requiring one of a resource
    // would reject every resource unconditionally.
    if candidate.kind == CandidateKind::Staff {
        let contained_in_shift = snapshot.shifts.iter().any(|shift| {
            shift.candidate_id == candidate.id
                && shift.start <= request.start
                && request.end() <= shift.end
        });
        if !contained_in_shift {
            return false;
        }
    }

    // Buffers widen the window only against reservation blocks, and only
    // for staff.
    let (widened_start, widened_end) = match candidate.kind {
        CandidateKind::Staff => (
            request.start - request.buffer_before,
            request.end() + request.buffer_after,
        ),
        CandidateKind::Resource => (request.start, request.end()),
    };

    for block in snapshot
        .blocks
        .iter()
        .filter(|block| block.candidate_id == candidate.id)
    {
        let conflict = match block.kind {
            BlockKind::Break | BlockKind::DerivedBuffer => {
                overlaps(request.start, request.end(), block.start, block.end)
            }
            BlockKind::Reservation => {
                overlaps(widened_start, widened_end, block.start, block.end)
            }
        };
        if conflict {
            return false;
        }
    }
    true
}

/// Seat resolution for fixed-slot sessions.
///
/// Returns the lowest-numbered seat in `seat_pool` that is not in
/// `reserved`, or `None` when every seat is taken. Seat numbers compare
/// numerically when they parse as integers, lexicographically otherwise.
pub fn resolve_seat<'a, I>(seat_pool: &'a [Seat], reserved: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let reserved: Vec<&str> = reserved.into_iter().collect();
    let mut free: Vec<&Seat> = seat_pool
        .iter()
        .filter(|seat| !reserved.contains(&seat.no.as_str()))
        .collect();
    free.sort_by(|a, b| seat_order(&a.no).cmp(&seat_order(&b.no)));
    free.first().map(|seat| seat.no.as_str())
}

fn seat_order(no: &str) -> (u8, u64, String) {
    match no.parse::<u64>() {
        Ok(n) => (0, n, String::new()),
        Err(_) => (1, 0, no.to_string()),
    }
}
