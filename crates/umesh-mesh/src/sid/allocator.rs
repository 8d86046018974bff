use std::collections::BTreeMap;

use umesh_core::{Sid, SidType, Uuid};

use super::bitmap::SidBitmap;
use crate::error::SidError;

/// Upper bound on any allocator's address space, whatever its [`SidType`].
pub const MAX_SID_POOL_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Leaf,
    Router,
}

/// Allocation request: who is asking, and which SID it would like to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId {
    pub uuid: Uuid,
    /// Previously held SID, or [`Sid::INVALID`] for no preference.
    pub sid: Sid,
    pub node_type: NodeType,
    /// SID of the router the node attaches through.
    pub attach_sid: Sid,
}

impl NodeId {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            sid: Sid::INVALID,
            node_type: NodeType::Leaf,
            attach_sid: Sid::INVALID,
        }
    }

    pub fn with_sid(mut self, sid: Sid) -> Self {
        self.sid = sid;
        self
    }
}

/// A node holding a SID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SidNode {
    pub uuid: Uuid,
    pub sid: Sid,
    pub node_type: NodeType,
    pub attach_sid: Sid,
}

/// Bitmap-backed SID allocator for one address space.
///
/// A SID's bit is claimed exactly when a node record holds that SID. SID 0
/// is reserved at init and never handed out.
#[derive(Debug, Clone)]
pub struct SidAllocator {
    sid_type: SidType,
    bitmap: SidBitmap,
    nodes: BTreeMap<Uuid, SidNode>,
}

impl SidAllocator {
    pub fn new(sid_type: SidType) -> Self {
        let space = sid_type.space_size().min(MAX_SID_POOL_SIZE);
        let mut bitmap = SidBitmap::new(space);
        bitmap.claim(0);
        Self {
            sid_type,
            bitmap,
            nodes: BTreeMap::new(),
        }
    }

    pub fn sid_type(&self) -> SidType {
        self.sid_type
    }

    /// Number of SIDs in the space, the reserved SID 0 included.
    pub fn space_size(&self) -> usize {
        self.bitmap.len()
    }

    /// Assign a SID to `node`.
    ///
    /// A node that already holds a SID keeps it. Otherwise the requested SID
    /// is claimed when it is free, falling back to the lowest free SID.
    pub fn allocate(&mut self, node: &NodeId) -> Result<Sid, SidError> {
        if let Some(existing) = self.nodes.get(&node.uuid) {
            return Ok(existing.sid);
        }

        let requested = node
            .sid
            .is_unique()
            .then_some(node.sid.0 as usize)
            .filter(|&index| self.bitmap.claim(index));
        let claimed = requested.or_else(|| {
            let index = self.bitmap.first_free()?;
            self.bitmap.claim(index).then_some(index)
        });

        let Some(index) = claimed else {
            tracing::warn!(
                uuid = %node.uuid,
                sid_type = ?self.sid_type,
                nodes = self.nodes.len(),
                "sid: address space exhausted"
            );
            return Err(SidError::OutOfSpace(self.sid_type));
        };

        let sid = Sid(index as u16);
        self.nodes.insert(
            node.uuid,
            SidNode {
                uuid: node.uuid,
                sid,
                node_type: node.node_type,
                attach_sid: node.attach_sid,
            },
        );
        tracing::debug!(uuid = %node.uuid, %sid, "sid: allocated");
        Ok(sid)
    }

    /// Release the SID held by `uuid`. Unknown nodes are ignored.
    pub fn free(&mut self, uuid: &Uuid) -> Option<Sid> {
        let node = self.nodes.remove(uuid)?;
        self.bitmap.release(node.sid.0 as usize);
        tracing::debug!(%uuid, sid = %node.sid, "sid: freed");
        Some(node.sid)
    }

    pub fn get_allocated_number(&self) -> usize {
        self.nodes.len()
    }

    pub fn lookup(&self, uuid: &Uuid) -> Option<&SidNode> {
        self.nodes.get(uuid)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SidNode> {
        self.nodes.values()
    }

    /// SIDs currently held by nodes, ascending.
    pub fn allocated_sids(&self) -> impl Iterator<Item = Sid> + '_ {
        self.bitmap
            .iter_claimed()
            .filter(|&index| index != 0)
            .map(|index| Sid(index as u16))
    }

    pub fn free_count(&self) -> usize {
        self.bitmap.len() - self.bitmap.count_claimed()
    }

    /// Drop every record and return to the freshly initialized state.
    pub fn deinit(&mut self) {
        self.nodes.clear();
        self.bitmap.clear();
        self.bitmap.claim(0);
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    #[derive(Debug, Clone)]
    enum Op {
        Allocate { uuid: u64, sid: Option<u16> },
        Free { uuid: u64 },
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (0u64..64, proptest::option::of(0u16..300))
                .prop_map(|(uuid, sid)| Op::Allocate { uuid, sid }),
            1 => (0u64..64).prop_map(|uuid| Op::Free { uuid }),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn claimed_bits_match_node_records(ops in proptest::collection::vec(op(), 1..200)) {
            let mut alloc = SidAllocator::new(SidType::ShortRandom);
            for op in ops {
                match op {
                    Op::Allocate { uuid, sid } => {
                        let mut request = NodeId::new(Uuid::from_u64(uuid));
                        if let Some(sid) = sid {
                            request.sid = Sid(sid);
                        }
                        let _ = alloc.allocate(&request);
                    }
                    Op::Free { uuid } => {
                        alloc.free(&Uuid::from_u64(uuid));
                    }
                }

                let claimed: BTreeSet<Sid> = alloc.allocated_sids().collect();
                let held: Vec<Sid> = alloc.nodes().map(|n| n.sid).collect();
                let held_set: BTreeSet<Sid> = held.iter().copied().collect();
                prop_assert_eq!(held.len(), held_set.len());
                prop_assert_eq!(&claimed, &held_set);
                prop_assert_eq!(alloc.get_allocated_number(), held.len());
            }
        }
    }
}
