//! Interactive peer console.
//!
//! Lines starting with `/` are commands. Anything else is a chat message for
//! the current direct peer.

use std::ops::ControlFlow;

use parley_net_substrate::Substrate;
use parley_node::{Node, NodeEvent};
use parley_primitives::{AddressError, PeerAddress};

pub(crate) const HELP: &str = "\
Commands:
  /store <ss58>    publish our address under an SS58 key
  /lookup <ss58>   look a key up and dial the address found
  /dial <addr>     dial a multiaddr
  /bootstrap       dial the relay again
  /conns           show open connections
  /addrs           show our addresses
  /help            show this help
  /quit            exit
Any other line is sent as a chat message.";

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Store(String),
    Lookup(String),
    Dial(PeerAddress),
    Bootstrap,
    Conns,
    Addrs,
    Help,
    Quit,
    Chat(String),
    Empty,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ParseError {
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Unknown command /{0}, try /help")]
    Unknown(String),
    #[error("Invalid address: {0}")]
    Address(#[from] AddressError),
}

/// Parse one console line.
pub(crate) fn parse(line: &str) -> Result<Command, ParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Command::Empty);
    }
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Ok(Command::Chat(trimmed.to_string()));
    };

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();
    let command = match (name, arg) {
        ("store", Some(key)) => Command::Store(key.to_string()),
        ("store", None) => return Err(ParseError::Usage("/store <ss58>")),
        ("lookup", Some(key)) => Command::Lookup(key.to_string()),
        ("lookup", None) => return Err(ParseError::Usage("/lookup <ss58>")),
        ("dial", Some(addr)) => Command::Dial(addr.parse()?),
        ("dial", None) => return Err(ParseError::Usage("/dial <multiaddr>")),
        ("bootstrap", _) => Command::Bootstrap,
        ("conns", _) => Command::Conns,
        ("addrs", _) => Command::Addrs,
        ("help", _) => Command::Help,
        ("quit" | "exit", _) => Command::Quit,
        (other, _) => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(command)
}

/// Run one command against the node and print the outcome.
pub(crate) async fn execute<S: Substrate>(node: &Node<S>, command: Command) -> ControlFlow<()> {
    match command {
        Command::Store(key) => match node.publish_address(&key).await {
            Ok(value) => println!("Published {value} under {key}"),
            Err(e) => println!("Publish failed: {e}"),
        },
        Command::Lookup(key) => match node.connect_via_directory(&key).await {
            Ok(None) => println!("{key} is not in the directory"),
            Ok(Some(lookup)) => {
                println!("Found {}", lookup.value);
                match lookup.connection {
                    Ok(conn) => println!("Connected: {conn}"),
                    Err(e) => println!("Dial failed: {e}"),
                }
            }
            Err(e) => println!("Lookup failed: {e}"),
        },
        Command::Dial(addr) => match node.dial(addr).await {
            Ok(conn) => println!("Connected: {conn}"),
            Err(e) => println!("Dial failed: {e}"),
        },
        Command::Bootstrap => match node.bootstrap().await {
            Ok(conn) => println!("Relay connected: {conn}"),
            Err(e) => println!("Bootstrap failed: {e}"),
        },
        Command::Conns => {
            let snapshot = node.snapshot();
            println!("State: {}", snapshot.state);
            if snapshot.connections.is_empty() {
                println!("No open connections");
            }
            for conn in &snapshot.connections {
                println!("  {conn}");
            }
            if let Some(best) = &snapshot.best_peer {
                println!("Best peer: {best}");
            }
        }
        Command::Addrs => {
            let snapshot = node.snapshot();
            if snapshot.addresses.is_empty() {
                println!("No addresses yet");
            }
            for addr in &snapshot.addresses {
                println!("  {addr} ({})", addr.kind());
            }
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => return ControlFlow::Break(()),
        Command::Chat(text) => {
            if let Err(e) = node.send_chat(&text).await {
                println!("Chat failed: {e}");
            }
        }
        Command::Empty => {}
    }
    ControlFlow::Continue(())
}

/// Console line for an event, if it is worth showing.
pub(crate) fn describe(event: &NodeEvent) -> Option<String> {
    let line = match event {
        NodeEvent::StateChanged(state) => format!("State: {state}"),
        NodeEvent::RelayReady(conn) => format!("Relay ready: {}", conn.peer_id),
        NodeEvent::RelayLost => "Lost relay connection".to_string(),
        NodeEvent::ConnectionsChanged(_) => return None,
        NodeEvent::DirectPathChanged {
            best_peer: Some(addr),
            ..
        } => format!("Direct path: {addr}"),
        NodeEvent::DirectPathChanged { best_peer: None, .. } => "No direct path".to_string(),
        NodeEvent::AddressesChanged(addrs) => {
            let mut line = String::from("Direct addresses:");
            for addr in addrs {
                line.push_str("\n  ");
                line.push_str(&addr.to_string());
            }
            line
        }
        NodeEvent::ChatOpened { peer } => format!("Chat open with {peer}"),
        NodeEvent::ChatClosed { peer } => format!("Chat with {peer} closed"),
        NodeEvent::ChatRejected { peer } => {
            format!("Rejected chat from {peer}, already chatting")
        }
        NodeEvent::ChatMessage { peer, text } => format!("<{peer}> {text}"),
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use parley_primitives::PeerId;

    use super::*;

    #[test]
    fn test_plain_text_is_chat() {
        assert_eq!(parse("hello there").unwrap(), Command::Chat("hello there".into()));
        assert_eq!(parse("  indented  ").unwrap(), Command::Chat("indented".into()));
        assert_eq!(parse("").unwrap(), Command::Empty);
        assert_eq!(parse("   ").unwrap(), Command::Empty);
    }

    #[test]
    fn test_commands() {
        let key = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
        assert_eq!(parse(&format!("/store {key}")).unwrap(), Command::Store(key.into()));
        assert_eq!(parse(&format!("/lookup {key}")).unwrap(), Command::Lookup(key.into()));
        assert_eq!(parse("/bootstrap").unwrap(), Command::Bootstrap);
        assert_eq!(parse("/conns").unwrap(), Command::Conns);
        assert_eq!(parse("/addrs").unwrap(), Command::Addrs);
        assert_eq!(parse("/help").unwrap(), Command::Help);
        assert_eq!(parse(" /quit ").unwrap(), Command::Quit);

        let dial = parse("/dial /ip4/10.0.0.2/udp/9000/webrtc-direct").unwrap();
        let addr = assert_matches!(dial, Command::Dial(addr) => addr);
        assert!(addr.is_direct_capable());
    }

    #[test]
    fn test_parse_errors() {
        assert_matches!(parse("/store"), Err(ParseError::Usage(_)));
        assert_matches!(parse("/lookup"), Err(ParseError::Usage(_)));
        assert_matches!(parse("/dial"), Err(ParseError::Usage(_)));
        assert_matches!(parse("/dial nowhere"), Err(ParseError::Address(_)));
        assert_matches!(parse("/frobnicate"), Err(ParseError::Unknown(name)) if name == "frobnicate");
    }

    #[test]
    fn test_describe() {
        let peer = PeerId::random();
        assert_eq!(
            describe(&NodeEvent::ChatMessage {
                peer,
                text: "hi".into()
            }),
            Some(format!("<{peer}> hi"))
        );
        assert_eq!(describe(&NodeEvent::ConnectionsChanged(vec![])), None);
        assert_eq!(
            describe(&NodeEvent::DirectPathChanged {
                available: false,
                best_peer: None
            }),
            Some("No direct path".into())
        );
    }
}
