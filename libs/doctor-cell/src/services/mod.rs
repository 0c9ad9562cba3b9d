pub mod availability;
pub mod resolver;
pub mod rules;
pub mod store;

pub use availability::{AvailabilityCalculator, REQUEST_CONFLICT_MARGIN_MINUTES};
pub use resolver::RuleResolver;
pub use rules::ScheduleRuleService;
pub use store::{InMemoryScheduleRuleStore, ScheduleRuleStore, SupabaseScheduleRuleStore};
