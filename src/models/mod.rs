pub mod account;
pub mod batch;
pub mod queue_item;
pub mod submission_record;

pub use account::Account;
pub use batch::Batch;
pub use queue_item::QueueItem;
pub use submission_record::SubmissionRecord;
