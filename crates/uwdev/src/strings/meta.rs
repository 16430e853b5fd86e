//! JSON sidecar produced by the extractor and consumed by the packer:
//! the Huffman tree and the block directory of the source archive.

use serde::{Deserialize, Serialize};

use crate::codec::CodecError;
use crate::strings::archive::BlockInfo;
use crate::strings::huffman::{HuffNode, HuffmanTree};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PakMetadata {
    pub huffman_nodes: Vec<HuffNode>,
    pub block_infos: Vec<BlockInfo>,
}

impl PakMetadata {
    #[must_use]
    pub fn new(tree: &HuffmanTree, block_infos: Vec<BlockInfo>) -> Self {
        Self {
            huffman_nodes: tree.nodes().to_vec(),
            block_infos,
        }
    }

    pub fn tree(&self) -> Result<HuffmanTree, CodecError> {
        HuffmanTree::new(self.huffman_nodes.clone())
    }
}
