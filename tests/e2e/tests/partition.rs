//! §8 testable property #5 ("partition"): a node whose only peer is
//! unreachable wins its own auction (no competing bids), but the `JOB_CLAIM`
//! ACK quorum can never be reached, so §4.4.4 applies: execution is aborted,
//! the stake is returned, and the claim is never retracted (peers, had there
//! been any reachable ones, would time the job out on their own).

mod common;

use std::time::Duration;

use mesh_auction::AuctionState;

#[tokio::test]
async fn unreachable_peer_causes_quorum_failure_and_stake_refund() {
    let data_dir = common::tmp_dir("partition");
    let nodes = common::spawn_cluster(&data_dir, &[19901]).await;
    let node = nodes.into_iter().next().unwrap();

    // Register a peer that will never accept the TCP connection, so
    // broadcast_reliable's JOB_CLAIM quorum wait times out with zero acks.
    node.gossip.register_peer(
        "ghost-peer".to_string(),
        "ghost".to_string(),
        "127.0.0.1".to_string(),
        19902,
        String::new(),
    );

    let starting_balance = node.wallet.get_stats().balance;

    let job = common::shell_job("job-partition", "echo hi", 30.0);
    node.submit_job(job.clone());

    // Resolution (2.5s) + quorum timeout (2s) + margin.
    tokio::time::sleep(Duration::from_millis(5500)).await;

    // The claim was staked then unstaked on quorum failure: balance is back
    // to where it started and nothing is left staked against this job.
    let stats = node.wallet.get_stats();
    assert_eq!(stats.balance, starting_balance, "stake must be refunded after quorum failure");
    assert_eq!(stats.staked, 0.0);

    // §4.4.4: the claim itself is never retracted, so the auction is stuck
    // at Claimed rather than reaching Confirmed or being marked Lost.
    assert_eq!(node.auction.job_state(&job.job_id), Some(AuctionState::Claimed));
}
