//! Typed program: the resolved tree plus per-node and per-export types.

use std::collections::HashMap;

use crate::core::tree::NodeId;
use crate::core::tree::resolved::ResolvedModule;
use crate::core::types::{Type, TypeEnv};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedModule {
    pub module: ResolvedModule,
    pub node_types: HashMap<NodeId, Type>,
    /// Types of the module's exports, served to importers.
    pub env: TypeEnv,
}

impl TypedModule {
    pub fn type_of(&self, id: NodeId) -> Option<&Type> {
        self.node_types.get(&id)
    }
}
