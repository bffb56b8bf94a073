pub mod accounts;
pub mod batches;
pub mod queue;
pub mod submissions;
