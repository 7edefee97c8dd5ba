//! `parley relay`.

use eyre::{Result, WrapErr};
use parley_directory::FileDirectoryStore;
use parley_net_p2p::P2pNode;
use parley_node::{NodeBuilder, NodeRole};
use parley_primitives::PeerAddress;
use tracing::info;

use crate::config::ParleyConfig;

/// Run a relay until ctrl-c, printing its addresses as they change.
pub(crate) async fn run(config: ParleyConfig) -> Result<()> {
    let (swarm, handle) =
        P2pNode::new(config.network.p2p_config(true)).wrap_err("failed to start the swarm")?;
    let swarm_task = tokio::spawn(swarm.run());

    let mut builder = NodeBuilder::new(handle.clone())
        .role(NodeRole::Relay)
        .timeouts(config.timeouts.timeouts());
    if let Some(path) = &config.directory.file {
        let store = FileDirectoryStore::open(path)
            .wrap_err_with(|| format!("failed to open directory file {}", path.display()))?;
        info!(path = %path.display(), "Persisting directory");
        builder = builder.directory_store(store);
    }
    let node = builder.build()?;
    println!("Relay {} running", node.peer_id());

    let mut snapshots = node.connectivity().watch();
    let mut printed: Vec<PeerAddress> = Vec::new();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        let addresses = snapshots.borrow_and_update().addresses.clone();
        if addresses != printed {
            println!("Listening on:");
            for addr in &addresses {
                println!("  {addr}");
            }
            printed = addresses;
        }

        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = &mut shutdown => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    node.shutdown().await;
    handle.shutdown().await;
    swarm_task.await?;
    Ok(())
}
