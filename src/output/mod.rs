//! On-disk naming: filename composition and filename length probing

pub mod naming;
pub mod probe;

pub use naming::{compose_stem, normalize, sanitize_dir_name};
pub use probe::{probe_filename_budget, DirProbeTarget, FilenameBudgetProber, ProbeTarget};
