//! Matrix module: block-CSR storage and the distributed partitioned matrix.

pub mod bcmap;
pub mod bcsr;
pub mod partmat;

pub use bcmap::BcMap;
pub use bcsr::BcsrMat;
pub use partmat::PartMat;
