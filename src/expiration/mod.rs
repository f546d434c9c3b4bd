mod cleaner;

pub use cleaner::start_idle_sweeper;
