//! Arena index types.
//!
//! The source library represents cross-references (Task↔Storage, Task↔TaskClass,
//! Edge↔Flow) as object pointers with cycles. We re-shape that as an
//! arena-with-indices design: [`System`](crate::system::System) owns flat arrays of
//! tasks, flows, storages and task classes, and every cross-reference is a stable
//! integer id rather than a pointer. Two-pass construction becomes "declare ids,
//! then fill edges by id".

use serde::{Deserialize, Serialize};

macro_rules! index_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

index_type!(TaskId);
index_type!(FlowId);
index_type!(StorageId);
index_type!(TaskClassId);

/// A node referenced from an edge, predicate, or fallback list: either a task or
/// a sub-flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeRef {
    Task(TaskId),
    Flow(FlowId),
}

impl NodeRef {
    pub fn is_task(self) -> bool {
        matches!(self, NodeRef::Task(_))
    }

    pub fn is_flow(self) -> bool {
        matches!(self, NodeRef::Flow(_))
    }
}
