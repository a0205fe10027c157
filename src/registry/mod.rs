//! Protocol numbering and the filing workflows built on it.

pub mod counter;
pub mod delete;
pub mod error;
pub mod export;
pub mod filing;
pub mod number;
pub mod query;
pub mod replace;

pub use counter::SequenceAllocator;
pub use delete::DeletionReport;
pub use error::FilingError;
pub use filing::{FilingReceipt, FilingRequest, FilingService, FilingStage};
pub use number::ProtocolNumber;
pub use query::{Dashboard, ListFilter, ProtocolDetail, Register};
pub use replace::{ReplaceReceipt, ReplaceRequest};
