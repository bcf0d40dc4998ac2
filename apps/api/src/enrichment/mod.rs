//! Background enrichment: license detection, vulnerability feeds, the durable job
//! queue and the worker pool that drains it.

pub mod jobs;
pub mod license;
pub mod queue;
pub mod vulns;
pub mod worker;
