//! Small filesystem helpers with no domain knowledge of repositories,
//! timelines or chunking — the same role `pbs-tools::fs` plays for
//! `pbs-datastore`.

pub mod fs;
