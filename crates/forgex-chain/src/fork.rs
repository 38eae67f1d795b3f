//! Short-range fork classification and tie-breaking.

use forgex_core::block::Block;

/// How an incoming block relates to the current chain head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkKind {
    /// `previous_block_id == head.id && height == head.height + 1`.
    NormalAppend,
    /// The head itself arrived again.
    SameAsHead,
    /// Consecutive height but a different parent: the peer built on a
    /// different head. Recovery drops both our head and its parent.
    Fork1,
    /// Same height, same parent, different id: two delegates forged
    /// siblings. Recovery drops our head and applies the winner.
    Fork5,
    /// Anything else (older height, far future, unrelated parent).
    Orphan,
}

/// Classify `incoming` against the current head.
pub fn classify(incoming: &Block, head: &Block) -> ForkKind {
    if incoming.id == head.id {
        ForkKind::SameAsHead
    } else if incoming.previous_block_id == head.id && incoming.height == head.height + 1 {
        ForkKind::NormalAppend
    } else if incoming.height == head.height + 1 {
        ForkKind::Fork1
    } else if incoming.height == head.height
        && incoming.previous_block_id == head.previous_block_id
    {
        ForkKind::Fork5
    } else {
        ForkKind::Orphan
    }
}

/// Deterministic sibling tie-break: the older `created_at` wins; on equal
/// timestamps the numerically smaller id wins.
pub fn incoming_wins(incoming: &Block, head: &Block) -> bool {
    incoming.created_at < head.created_at
        || (incoming.created_at == head.created_at && incoming.id < head.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgex_core::constants::BLOCK_VERSION;
    use forgex_core::types::{BlockId, PublicKey, Signature};

    fn block(id: u8, height: u64, prev: u8, created_at: u32) -> Block {
        Block {
            id: BlockId::from_bytes([id; 32]),
            version: BLOCK_VERSION,
            height,
            previous_block_id: BlockId::from_bytes([prev; 32]),
            created_at,
            generator_public_key: PublicKey([0u8; 32]),
            signature: Signature::ZERO,
            transactions: Vec::new(),
            transaction_count: 0,
            amount: 0,
            fee: 0,
            payload_hash: [0u8; 32],
        }
    }

    #[test]
    fn classification_covers_the_short_range_shapes() {
        let head = block(0x10, 5, 0x09, 50);
        assert_eq!(classify(&head, &head), ForkKind::SameAsHead);
        assert_eq!(classify(&block(0x11, 6, 0x10, 60), &head), ForkKind::NormalAppend);
        assert_eq!(classify(&block(0x12, 6, 0x77, 60), &head), ForkKind::Fork1);
        assert_eq!(classify(&block(0x13, 5, 0x09, 50), &head), ForkKind::Fork5);
        assert_eq!(classify(&block(0x14, 4, 0x03, 40), &head), ForkKind::Orphan);
        assert_eq!(classify(&block(0x15, 9, 0x08, 90), &head), ForkKind::Orphan);
    }

    #[test]
    fn older_created_at_wins() {
        let head = block(0x10, 5, 0x09, 50);
        assert!(incoming_wins(&block(0x20, 5, 0x09, 40), &head));
        assert!(!incoming_wins(&block(0x20, 5, 0x09, 60), &head));
    }

    #[test]
    fn equal_timestamps_break_on_smaller_id() {
        // Head ff…, incoming aa… at the same timestamp: incoming wins.
        let head = block(0xff, 5, 0x09, 100);
        assert!(incoming_wins(&block(0xaa, 5, 0x09, 100), &head));
        assert!(!incoming_wins(&head, &block(0xaa, 5, 0x09, 100)));
    }
}
