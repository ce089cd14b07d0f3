//! Control-flow combinator Nodes: Sequence, Parallel, Transformer,
//! UploadFile, ShareFile.

pub mod file_ops;
pub mod parallel;
pub mod sequence;
pub mod transformer;

pub use file_ops::{ShareFile, UploadFile};
pub use parallel::Parallel;
pub use sequence::Sequence;
pub use transformer::{join_with_space, Transformer};
