mod auto;
mod command;
mod outputs;

pub use auto::AutoApproveReviewer;
pub use command::CommandReviewer;
pub use outputs::OutputsRequiredReviewer;
