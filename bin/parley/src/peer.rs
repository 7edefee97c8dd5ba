//! `parley peer`.

use eyre::{Result, WrapErr, eyre};
use parley_net_p2p::P2pNode;
use parley_node::NodeBuilder;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{info, warn};

use crate::{config::ParleyConfig, console};

/// Bootstrap to the relay, then run the console until `/quit` or ctrl-c.
pub(crate) async fn run(config: ParleyConfig) -> Result<()> {
    let relay = config
        .peer
        .relay
        .clone()
        .ok_or_else(|| eyre!("no relay configured, pass --relay or set [peer] relay"))?;

    let (swarm, handle) =
        P2pNode::new(config.network.p2p_config(false)).wrap_err("failed to start the swarm")?;
    let swarm_task = tokio::spawn(swarm.run());

    let node = NodeBuilder::new(handle.clone())
        .bootstrap_relay(relay)
        .timeouts(config.timeouts.timeouts())
        .build()?;
    println!("Peer {}", node.peer_id());

    let mut events = node.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(line) = console::describe(&event) {
                        println!("{line}");
                    }
                }
                Err(RecvError::Lagged(missed)) => warn!(missed, "Console missed events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    match node.bootstrap().await {
        Ok(conn) => println!("Relay connected: {conn}"),
        Err(e) => println!("Bootstrap failed: {e}. Retry with /bootstrap"),
    }
    println!("Type /help for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let command = match console::parse(&line) {
                    Ok(command) => command,
                    Err(e) => {
                        println!("{e}");
                        continue;
                    }
                };
                if console::execute(&node, command).await.is_break() {
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
    printer.abort();
    Ok(())
}
