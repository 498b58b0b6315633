//! # Admission Scenarios
//!
//! End-to-end runs of the sync service over in-memory stores:
//!
//! - **A**: first block on an empty chain is applied
//! - **B**: a re-delivered committed block is abandoned
//! - **C**: a block ahead of the local height is stored and the gap requested
//! - **D**: a child that arrived before its parent runs without another request
//! - **E**: a block missing transactions waits for them
//! - **F**: initial sync finishes exactly once
//! - Rollback: a state-root mismatch leaves no trace

#[cfg(test)]
mod tests {
    use crate::integration::support::*;
    use qc_18_block_sync::adapters::state_root_for;
    use qc_18_block_sync::ports::NetworkRequest;
    use qc_18_block_sync::{
        AbandonReason, BlockExecutor, BlockSyncApi, ChainContext, ChainStore, ExecutionError,
        ExecutionOutcome, PendingBlock, StoreReason, SyncConfig, SyncEvent, SyncPhase,
        SyncSuggestion, TransactionPool, TransactionStatus, TransactionStore, ValidationPipeline,
        ValidationResult,
    };
    use shared_types::{Hash, Transaction, GENESIS_PARENT_HASH};

    async fn context(node: &TestNode) -> ChainContext {
        let head = node.chain.head().await.unwrap();
        ChainContext {
            chain_id: [0; 32],
            head_hash: head.hash,
            head_height: head.height,
        }
    }

    fn pipeline(node: &TestNode) -> ValidationPipeline {
        ValidationPipeline::standard(node.chain.clone(), 8)
    }

    // =========================================================================
    // SCENARIO A: first block applied
    // =========================================================================

    #[tokio::test]
    async fn test_scenario_a_first_block_applied() {
        let node = TestNode::new();
        let b1 = block_on(GENESIS_PARENT_HASH, 1, &[], 0);

        let suggestion = pipeline(&node)
            .validate(&b1, &context(&node).await, None)
            .await;
        assert_eq!(suggestion, SyncSuggestion::Apply);

        node.service.start(false).await.unwrap();
        node.service.enqueue_block(b1.clone(), peer(1)).unwrap();
        node.wait_for_height(1).await;

        assert_eq!(node.chain.head().await.unwrap().hash, b1.hash());
        assert_eq!(node.service.pending_count(), 0);
    }

    // =========================================================================
    // SCENARIO B: re-delivered block abandoned
    // =========================================================================

    #[tokio::test]
    async fn test_scenario_b_redelivered_block_abandoned() {
        let node = TestNode::new();
        let b1 = block_on(GENESIS_PARENT_HASH, 1, &[], 0);
        node.service.start(false).await.unwrap();
        node.service.enqueue_block(b1.clone(), peer(1)).unwrap();
        node.wait_for_height(1).await;

        let verdict = pipeline(&node).evaluate(&b1, &context(&node).await, None).await;
        assert_eq!(verdict.suggestion, SyncSuggestion::Abandon);
        assert!(verdict.contains(ValidationResult::Abandon(AbandonReason::AlreadyExecuted)));

        // a later block proves the duplicate job has been handled
        let b2 = block_on(b1.hash(), 2, &[], 0);
        node.service.enqueue_block(b1.clone(), peer(2)).unwrap();
        node.service.enqueue_block(b2, peer(2)).unwrap();
        node.wait_for_height(2).await;

        assert_eq!(node.service.pending_count(), 0);
        assert_eq!(node.service.branch_count(), 0);
        assert_eq!(node.chain.len(), 2);
    }

    // =========================================================================
    // SCENARIO C: higher height stored, gap requested
    // =========================================================================

    #[tokio::test]
    async fn test_scenario_c_gap_requested_not_executed() {
        let node = TestNode::new();
        let blocks = extend(GENESIS_PARENT_HASH, 0, 3, 0);
        node.service.start(false).await.unwrap();
        node.service.enqueue_block(blocks[0].clone(), peer(1)).unwrap();
        node.wait_for_height(1).await;

        let verdict = pipeline(&node)
            .evaluate(&blocks[2], &context(&node).await, None)
            .await;
        assert_eq!(verdict.suggestion, SyncSuggestion::Store);
        assert_eq!(
            verdict.reason(),
            Some(ValidationResult::Store(StoreReason::HigherHeight))
        );

        node.service.enqueue_block(blocks[2].clone(), peer(7)).unwrap();
        let service = &node.service;
        wait_until(|| service.pending_count() == 1).await;

        assert_eq!(
            node.network.requests(),
            vec![NetworkRequest::Block {
                height: 2,
                peer: peer(7)
            }]
        );
        assert_eq!(node.service.local_height(), 1);
        assert_eq!(node.service.pending_count(), 1);
    }

    // =========================================================================
    // SCENARIO D: child before parent
    // =========================================================================

    #[tokio::test]
    async fn test_scenario_d_child_runs_once_parent_applied() {
        let node = TestNode::new();
        let mut events = node.service.subscribe();
        let x = block_on(GENESIS_PARENT_HASH, 1, &[], 0);
        let b1 = block_on(x.hash(), 2, &[], 0);
        node.service.start(false).await.unwrap();

        node.service.enqueue_block(b1.clone(), peer(1)).unwrap();
        let network = node.network.clone();
        wait_until(|| network.requested_heights() == vec![1]).await;
        assert_eq!(node.service.local_height(), 0);

        node.service.enqueue_block(x.clone(), peer(1)).unwrap();
        next_event_matching(&mut events, |e| {
            matches!(e, SyncEvent::BlockCommitted { height: 2, .. })
        })
        .await;

        assert_eq!(node.network.requested_heights(), vec![1]);
        assert_eq!(node.chain.head().await.unwrap().hash, b1.hash());
        assert_eq!(node.service.local_height(), 2);
    }

    // =========================================================================
    // SCENARIO E: missing transactions
    // =========================================================================

    #[tokio::test]
    async fn test_scenario_e_pending_block_tracks_missing_transactions() {
        let node = TestNode::new();
        let txs: Vec<Transaction> = (0..5).map(|n| tx(1, n)).collect();
        for t in &txs[..3] {
            node.pool.add(t.clone()).await;
        }
        let b1 = block_on(GENESIS_PARENT_HASH, 1, &txs, 0);

        let missing = node.pool.missing_transactions_of(&b1).await;
        let mut pending = PendingBlock::new(b1.clone(), missing, peer(2));
        assert!(!pending.is_synced());
        assert_eq!(pending.missing_count(), 2);
        for t in &txs[3..] {
            pending.remove_transaction(&t.hash());
        }
        assert!(pending.is_synced());

        node.service.start(false).await.unwrap();
        node.service.enqueue_block(b1.clone(), peer(2)).unwrap();
        let network = node.network.clone();
        wait_until(|| network.requested_transactions().len() == 2).await;
        assert_eq!(node.service.outstanding_requests(), (0, 2));
        assert_eq!(node.service.local_height(), 0);

        let queued = node
            .service
            .on_transactions_received(txs[3..].to_vec(), peer(2))
            .await
            .unwrap();
        assert_eq!(queued, 2);
        node.wait_for_height(1).await;

        assert_eq!(node.service.outstanding_requests(), (0, 0));
        assert!(node.pool.is_empty());
        for t in &txs {
            assert!(node.store.result(&t.hash()).await.unwrap().is_some());
        }
    }

    // =========================================================================
    // SCENARIO F: initial sync finishes once
    // =========================================================================

    #[tokio::test]
    async fn test_scenario_f_initial_sync_finishes_once() {
        let node = TestNode::new();
        let mut events = node.service.subscribe();
        let blocks = extend(GENESIS_PARENT_HASH, 0, 101, 0);
        node.service.start(true).await.unwrap();
        assert_eq!(node.service.phase(), SyncPhase::InitialSyncPending);

        node.service.enqueue_block(blocks[99].clone(), peer(9)).unwrap();
        let service = &node.service;
        wait_until(|| service.phase() == SyncPhase::InitialSyncInProgress { target: 100 }).await;
        assert_eq!(node.network.requested_heights(), vec![1, 2, 3, 4]);

        for block in &blocks[..99] {
            node.service.enqueue_block(block.clone(), peer(9)).unwrap();
        }
        let finished =
            next_event_matching(&mut events, |e| matches!(e, SyncEvent::SyncFinished { .. })).await;
        assert_eq!(finished, SyncEvent::SyncFinished { height: 100 });

        node.service.enqueue_block(blocks[100].clone(), peer(9)).unwrap();
        node.wait_for_height(101).await;
        assert_eq!(node.service.phase(), SyncPhase::SteadyState);
        assert!(!drain_events(&mut events)
            .iter()
            .any(|e| matches!(e, SyncEvent::SyncFinished { .. })));
    }

    // =========================================================================
    // ROLLBACK ATOMICITY
    // =========================================================================

    #[tokio::test]
    async fn test_state_root_mismatch_rolls_back_everything() {
        let node = TestNode::new();
        let executor = BlockExecutor::new(
            [0; 32],
            node.chain.clone(),
            node.store.clone(),
            node.pool.clone(),
            node.execution.clone(),
            node.world.clone(),
        );
        executor.start();

        let txs = vec![tx(4, 0), tx(4, 1), tx(5, 0)];
        for t in &txs {
            node.pool.add(t.clone()).await;
        }
        let mut bad = block_on(GENESIS_PARENT_HASH, 1, &txs, 0);
        bad.header.state_root = [0x5a; 32];
        let hashes: Vec<Hash> = txs.iter().map(Transaction::hash).collect();

        let outcome = executor.apply(&bad).await;
        assert_eq!(
            outcome,
            ExecutionOutcome::Failed(ExecutionError::StateRootMismatch {
                expected: [0x5a; 32],
                actual: state_root_for(1, &hashes),
            })
        );

        assert_eq!(node.chain.head().await.unwrap().height, 0);
        assert!(node.chain.is_empty());
        for hash in &hashes {
            assert!(node.pool.contains(hash));
            assert!(node.store.result(hash).await.unwrap().is_none());
            assert!(node.store.transaction(hash).await.unwrap().is_none());
        }
        assert_eq!(node.pool.account_sequence(&[4; 20]), Some(2));
        assert!(node.world.latest().is_none());
        assert!(!node.world.has_open_block());
    }

    #[tokio::test]
    async fn test_failed_block_retried_after_fix() {
        let node = TestNode::with_config(SyncConfig::for_testing());
        let t = tx(6, 0);
        node.pool.add(t.clone()).await;
        let b1 = block_on(GENESIS_PARENT_HASH, 1, &[t.clone()], 0);
        node.execution.set_batch_failure(true);

        node.service.start(false).await.unwrap();
        node.service.enqueue_block(b1.clone(), peer(1)).unwrap();
        let service = &node.service;
        wait_until(|| service.pending_count() == 1).await;
        assert_eq!(node.service.local_height(), 0);
        assert!(node.pool.contains(&t.hash()));

        // any later job re-runs the pending set
        node.execution.set_batch_failure(false);
        node.service.enqueue_transactions(vec![t.hash()]).unwrap();
        node.wait_for_height(1).await;
        assert_eq!(node.chain.head().await.unwrap().hash, b1.hash());
    }

    #[tokio::test]
    async fn test_failed_transaction_still_committed() {
        let node = TestNode::new();
        node.service.start(false).await.unwrap();

        let t = tx(8, 0);
        node.pool.add(t.clone()).await;
        node.execution.fail_transaction(t.hash());
        let b1 = block_on(GENESIS_PARENT_HASH, 1, &[t.clone()], 0);
        node.service.enqueue_block(b1, None).unwrap();
        node.wait_for_height(1).await;

        let result = node.store.result(&t.hash()).await.unwrap().unwrap();
        assert_eq!(result.status, TransactionStatus::Failed);
        assert!(!result.return_value.is_empty());
    }
}
