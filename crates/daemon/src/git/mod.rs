// Git sync: command worker and the commit/push orchestrator.

pub mod orchestrator;
pub mod worker;
