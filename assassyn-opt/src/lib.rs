//! Analysis passes that run over a frozen `System` before lowering: the
//! interaction matrix, the external-module registry, and the write-port
//! allocator.

pub mod analysis;

pub use analysis::{
    ArrayAccess, ArrayReadSite, AsyncCallSite, Exposure, ExternalModuleDecl, ExternalPort,
    ExternalRegistry, FifoSite, FinishSite, InteractionMatrix, WritePortAllocator,
};
