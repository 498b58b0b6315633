//! # Fork Resolution
//!
//! Competing chains delivered out of order: the node must switch to the
//! branch that links to its head and commit heights strictly in order.

#[cfg(test)]
mod tests {
    use crate::integration::support::*;
    use qc_18_block_sync::{BlockCollection, BlockSyncApi, ChainStore, PendingBlock, SyncEvent};
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use shared_types::{Block, GENESIS_PARENT_HASH};

    #[tokio::test]
    async fn test_switch_carries_descendants_of_promoted_branch() {
        let node = TestNode::new();
        let mut events = node.service.subscribe();
        node.service.start(false).await.unwrap();

        let a1 = block_on(GENESIS_PARENT_HASH, 1, &[], 0);
        node.service.enqueue_block(a1.clone(), peer(1)).unwrap();
        node.wait_for_height(1).await;

        // an unlinked block occupies height 2 while it waits for a transaction
        let stale = block_on([0x77; 32], 2, &[tx(3, 0)], 0);
        let fork = extend(a1.hash(), 1, 2, 5);
        node.service.enqueue_block(stale.clone(), peer(2)).unwrap();
        node.service.enqueue_block(fork[1].clone(), peer(3)).unwrap();
        node.service.enqueue_block(fork[0].clone(), peer(3)).unwrap();

        let promoted = next_event_matching(&mut events, |e| {
            matches!(e, SyncEvent::BranchPromoted { .. })
        })
        .await;
        assert_eq!(
            promoted,
            SyncEvent::BranchPromoted {
                first_height: 2,
                len: 2
            }
        );

        node.wait_for_height(3).await;
        assert_eq!(node.chain.head().await.unwrap().hash, fork[1].hash());
        assert_eq!(node.service.pending_count(), 0);
        assert_eq!(node.service.branch_count(), 1);
    }

    #[tokio::test]
    async fn test_shuffled_delivery_commits_in_height_order() {
        let node = TestNode::new();
        let mut events = node.service.subscribe();
        node.service.start(false).await.unwrap();

        let main = extend(GENESIS_PARENT_HASH, 0, 30, 0);
        // a side chain at heights 11..=15 that never links to the head
        let side = extend([0x99; 32], 10, 5, 99);

        let mut deliveries: Vec<Block> = main.iter().chain(side.iter()).cloned().collect();
        deliveries.extend(main.iter().step_by(7).cloned());
        deliveries.shuffle(&mut StdRng::seed_from_u64(7));

        for block in deliveries {
            node.service.enqueue_block(block, peer(1)).unwrap();
        }
        // the gap requests of this test are answered by re-delivery
        for block in &main {
            node.service.enqueue_block(block.clone(), peer(1)).unwrap();
        }

        next_event_matching(&mut events, |e| {
            matches!(e, SyncEvent::BlockCommitted { height: 30, .. })
        })
        .await;
        assert_eq!(node.chain.head().await.unwrap().hash, main[29].hash());

        for (i, block) in main.iter().enumerate() {
            let stored = node.chain.block_by_height(i as u64 + 1).await.unwrap();
            assert_eq!(stored.map(|b| b.hash()), Some(block.hash()));
        }
    }

    #[tokio::test]
    async fn test_committed_heights_strictly_consecutive() {
        let node = TestNode::new();
        let mut events = node.service.subscribe();
        node.service.start(false).await.unwrap();

        let main = extend(GENESIS_PARENT_HASH, 0, 12, 0);
        let mut order: Vec<usize> = (0..main.len()).collect();
        order.shuffle(&mut StdRng::seed_from_u64(21));
        for i in order {
            node.service.enqueue_block(main[i].clone(), peer(2)).unwrap();
        }
        for block in &main {
            node.service.enqueue_block(block.clone(), peer(2)).unwrap();
        }

        let mut heights = Vec::new();
        while heights.last() != Some(&12) {
            let event = next_event_matching(&mut events, |e| {
                matches!(e, SyncEvent::BlockCommitted { .. })
            })
            .await;
            if let SyncEvent::BlockCommitted { height, .. } = event {
                heights.push(height);
            }
        }
        assert_eq!(heights, (1..=12).collect::<Vec<u64>>());
        assert_eq!(node.chain.len(), 12);
    }

    #[tokio::test]
    async fn test_ready_fork_replaces_primary_waiting_on_transactions() {
        let node = TestNode::new();
        let mut events = node.service.subscribe();
        node.service.start(false).await.unwrap();

        // its transaction never arrives
        let waiting = block_on(GENESIS_PARENT_HASH, 1, &[tx(2, 0)], 0);
        node.service.enqueue_block(waiting.clone(), peer(1)).unwrap();
        let network = node.network.clone();
        wait_until(|| network.requested_transactions().len() == 1).await;

        let fork = extend(GENESIS_PARENT_HASH, 0, 2, 3);
        for block in &fork {
            node.service.enqueue_block(block.clone(), peer(2)).unwrap();
        }

        next_event_matching(&mut events, |e| {
            matches!(e, SyncEvent::BlockCommitted { height: 2, .. })
        })
        .await;
        assert_eq!(node.chain.head().await.unwrap().hash, fork[1].hash());
        let service = &node.service;
        wait_until(|| service.outstanding_requests() == (0, 0)).await;
        assert_eq!(node.service.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_superseded_blocks_do_not_pin_request_slots() {
        let node = TestNode::new();
        node.service.start(false).await.unwrap();
        let main = extend(GENESIS_PARENT_HASH, 0, 40, 0);

        // more rivals than request slots; each claims one before losing its height
        let mut parent = GENESIS_PARENT_HASH;
        for (i, block) in main.iter().take(6).enumerate() {
            let height = i as u64 + 1;
            let rival = block_on(parent, height, &[tx(9, height)], 50 + height);
            node.service.enqueue_block(rival, peer(3)).unwrap();
            node.service.enqueue_block(block.clone(), peer(1)).unwrap();
            parent = block.hash();
        }
        for block in &main[6..] {
            node.service.enqueue_block(block.clone(), peer(1)).unwrap();
        }
        node.wait_for_height(40).await;

        let service = &node.service;
        wait_until(|| service.outstanding_requests() == (0, 0)).await;
        assert_eq!(node.service.pending_count(), 0);
        // every rival has fallen out of the retention window
        assert_eq!(node.service.branch_count(), 0);
        assert_eq!(node.network.requested_transactions().len(), 6);
    }

    #[test]
    fn test_collection_splices_parent_arriving_after_child() {
        let x = block_on(GENESIS_PARENT_HASH, 1, &[], 0);
        let rival = block_on(GENESIS_PARENT_HASH, 1, &[], 1);
        let child = block_on(x.hash(), 2, &[], 0);

        let mut store = BlockCollection::new();
        store.add_pending(PendingBlock::new(rival, Vec::new(), None));
        // both land in branch tracking: height 1 is taken, child first
        store.merge_branches(PendingBlock::new(child.clone(), Vec::new(), None));
        store.add_pending(PendingBlock::new(x.clone(), Vec::new(), None));

        assert_eq!(store.branch_count(), 1);
        let branch = store.branches().next().unwrap();
        assert!(branch.is_continuous());
        assert_eq!(branch.first_block_hash(), Some(x.hash()));
        assert_eq!(branch.last_block_hash(), Some(child.hash()));

        let promotion = store
            .promote_checkoutable(0, GENESIS_PARENT_HASH)
            .map(|p| (p.first_height, p.len));
        // the rival still links to genesis, so the primary set is anchored
        assert_eq!(promotion, None);
    }
}
