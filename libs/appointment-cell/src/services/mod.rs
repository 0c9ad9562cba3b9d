pub mod booking;
pub mod conflict;
pub mod identity;
pub mod lifecycle;
pub mod notifications;
pub mod store;

pub use booking::AppointmentBookingService;
pub use conflict::ConflictDetectionService;
pub use identity::{IdentityLookup, InMemoryDirectory, SupabaseIdentityLookup};
pub use lifecycle::AppointmentLifecycleService;
pub use notifications::{
    BroadcastNotifier, CounterKind, NotificationError, NotificationSink, SchedulingEvent,
};
pub use store::{AppointmentStore, InMemoryAppointmentStore, SupabaseAppointmentStore};
