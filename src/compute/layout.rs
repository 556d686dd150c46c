// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Packing buffers into as few allocations as possible.

/// One buffer to place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Request {
    pub memory_type: usize,
    pub size: u64,
    pub alignment: u64,
}

/// An allocation to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Block {
    pub memory_type: usize,
    pub size: u64,
}

/// Where one buffer went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Placement {
    pub block: usize,
    pub offset: u64,
}

fn align_up(value: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    value.div_ceil(alignment) * alignment
}

/**
First-fit packing in request order.

A request goes into the first block of its memory type that still has room for it at the
next aligned offset; otherwise it opens a new block.  With no `max_block`, every memory
type ends up in exactly one block.  A request larger than `max_block` gets a block of its own.
*/
pub(crate) fn pack(requests: &[Request], max_block: Option<u64>) -> (Vec<Block>, Vec<Placement>) {
    let mut blocks: Vec<Block> = Vec::new();
    let mut placements = Vec::with_capacity(requests.len());
    for request in requests {
        let fits = |block: &Block| {
            let offset = align_up(block.size, request.alignment);
            let end = offset.saturating_add(request.size);
            max_block.is_none_or(|max| end <= max)
        };
        let existing = blocks
            .iter()
            .position(|b| b.memory_type == request.memory_type && fits(b));
        let placement = match existing {
            Some(index) => {
                let block = &mut blocks[index];
                let offset = align_up(block.size, request.alignment);
                block.size = offset + request.size;
                Placement {
                    block: index,
                    offset,
                }
            }
            None => {
                blocks.push(Block {
                    memory_type: request.memory_type,
                    size: request.size,
                });
                Placement {
                    block: blocks.len() - 1,
                    offset: 0,
                }
            }
        };
        placements.push(placement);
    }
    (blocks, placements)
}
