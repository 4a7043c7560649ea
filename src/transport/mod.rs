// Transport layer module
// This file wires up the transport implementations used to reach
// Ethereum nodes

pub mod jsonrpc;
