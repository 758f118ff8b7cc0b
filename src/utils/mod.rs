pub mod perf;

pub use perf::{StartupTimings, Stopwatch};
