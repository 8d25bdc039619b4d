//! Read an object from a node's SDO server over SocketCAN.

use canhost_client::{open_socketcan, Network};
use canhost_common::NodeId;
use clap::Parser;

#[derive(Parser)]
struct Options {
    /// The CAN interface to use.
    #[clap(long, short, default_value = "can0")]
    interface: String,

    /// The node id of the SDO server.
    node_id: u8,

    /// The object index to read, in hex.
    #[clap(value_parser = parse_hex_u16)]
    index: u16,

    /// The sub-index to read.
    #[clap(default_value = "0")]
    sub_index: u8,
}

fn parse_hex_u16(input: &str) -> Result<u16, String> {
    let input = input.trim_start_matches("0x");
    u16::from_str_radix(input, 16).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let options = Options::parse();

    let (sender, receiver) = open_socketcan(&options.interface)?;
    let network = Network::new(sender, receiver);
    let node = network.add_node(NodeId::new(options.node_id)?, None);

    let value = node.sdo().read(options.index, options.sub_index).await?;
    println!(
        "{:#06x}:{} = {:02x?}",
        options.index, options.sub_index, value
    );

    Ok(())
}
