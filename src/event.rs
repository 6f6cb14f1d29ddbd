// planner/src/event.rs

use tokio::sync::broadcast;

use crate::model::IsoDate;

/// Change notifications for whoever renders the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    /// `None` when the whole map was replaced.
    DaysChanged { changed: Option<Vec<IsoDate>> },
    FocusChanged(IsoDate),
    TodayChanged(IsoDate),
    SelectionChanged,
}

pub type EventSender = broadcast::Sender<StoreEvent>;

pub fn channel() -> EventSender { broadcast::channel(64).0 }

// No receivers is the normal case for headless use.
pub(crate) fn emit(tx: &EventSender, ev: StoreEvent) { let _ = tx.send(ev); }
