//! Common module for library exports

pub use crate::cleanup::{Cleanup, CleanupChain, Release};
pub use crate::error::{KestrelError, Result};
pub use crate::metadata::{FileMapping, KernelInfo, MappingHit, ProcessMappings, TargetMetadata};
pub use crate::program::{MockSegment, MockTarget, Program, ProgramBuilder, ProgramConfig, ProgramFlags};
pub use crate::symbols::{Symbol, SymbolIndex};
pub use crate::type_index::{TypeDescriptor, TypeIndex, TypeKind};
pub use crate::types::{Address, Platform, ProcessId};
