// planner/src/lib.rs

pub mod error;
pub mod model;
pub mod date;
pub mod clock;
pub mod decode;
pub mod legacy;
pub mod prune;
pub mod index;
pub mod event;
pub mod focus;
pub mod storage;
pub mod persist;
pub mod day_ops;
pub mod selection;
pub mod config;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock, TokioClock};
pub use config::{Config, ConfigLayer, ConfigManager, Scope};
pub use decode::{decode_planner_days, sanitize_reminder};
pub use error::{Result, StoreError};
pub use event::StoreEvent;
pub use focus::{FocusTracker, WeekView};
pub use index::DaysUpdate;
pub use model::{DayRecord, IsoDate, PlannerDays, Project, Reminder, Selection, Task};
pub use persist::{PersistErrorHook, PersistenceGateway};
pub use prune::{prune_old_days, PruneOptions};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use store::{DayScope, PlannerStore, StoreOptions};
