pub mod external_registry;
pub mod interaction_matrix;
pub mod write_port_allocator;

pub use external_registry::{ExternalModuleDecl, ExternalPort, ExternalRegistry};
pub use interaction_matrix::{
    ArrayAccess, ArrayReadSite, AsyncCallSite, Exposure, FifoSite, FinishSite, InteractionMatrix,
};
pub use write_port_allocator::WritePortAllocator;
