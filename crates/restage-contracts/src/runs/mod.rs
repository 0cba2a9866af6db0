pub mod feedback;
pub mod receipts;
pub mod summary;
