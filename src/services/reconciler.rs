//! Слияние мест карты с состоянием блокировок.
//!
//! Никакого I/O и никаких аллокаций сверх вектора результата.

use crate::models::{BaseStatus, DisplayStatus, MergedSeatView, Ownership, Seat, SeatOverride, SessionId};
use crate::services::lock_store::LockView;

pub fn reconcile<'a>(seats: &'a [Seat], view: &LockView, observer: &SessionId) -> Vec<MergedSeatView<'a>> {
    seats.iter().map(|seat| merge_seat(seat, view, observer)).collect()
}

pub fn merge_seat<'a>(seat: &'a Seat, view: &LockView, observer: &SessionId) -> MergedSeatView<'a> {
    match view.get(&seat.id) {
        Some(SeatOverride::Locked(lock)) => MergedSeatView {
            seat,
            status: DisplayStatus::Selected,
            ownership: if lock.owner == *observer {
                Ownership::Mine
            } else {
                Ownership::Other
            },
            locked_by: Some(lock.owner),
            locked_at: Some(lock.locked_at),
        },
        Some(SeatOverride::Settled(status)) => unlocked(seat, display(*status)),
        None => {
            let status = match seat.base_status {
                // не в сети — свободным не показываем
                BaseStatus::Available if !view.is_live() => DisplayStatus::Unknown,
                other => display(other),
            };
            unlocked(seat, status)
        }
    }
}

fn unlocked(seat: &Seat, status: DisplayStatus) -> MergedSeatView<'_> {
    MergedSeatView {
        seat,
        status,
        ownership: Ownership::None,
        locked_by: None,
        locked_at: None,
    }
}

fn display(status: BaseStatus) -> DisplayStatus {
    match status {
        BaseStatus::Available => DisplayStatus::Available,
        BaseStatus::Sold => DisplayStatus::Sold,
        BaseStatus::Reserved => DisplayStatus::Reserved,
        BaseStatus::Voided => DisplayStatus::Voided,
    }
}

/// Помнит, для каких версий блокировок и карты последний раз считался вид.
#[derive(Debug, Default, Clone, Copy)]
pub struct ViewTracker {
    last: Option<(u64, u64)>,
}

impl ViewTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` — нужно пересчитать; пара запоминается.
    pub fn needs_update(&mut self, lock_version: u64, seat_generation: u64) -> bool {
        let current = Some((lock_version, seat_generation));
        if self.last == current {
            return false;
        }
        self.last = current;
        true
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
