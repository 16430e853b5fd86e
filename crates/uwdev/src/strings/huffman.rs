//! Huffman tree decode/encode over the on-disk node array.
//!
//! Nodes are stored leaf-first with the root last; a child index of 255
//! means "none", and a node with no children is a leaf. Bitstreams are
//! read MSB-first, a `1` bit selecting the right child. The `'|'`
//! symbol terminates a string and is consumed without being emitted.

use std::collections::BTreeMap;

use bitter::BitReader;
use serde::{Deserialize, Serialize};

use crate::codec::CodecError;

pub const NO_CHILD: u8 = 255;
pub const TERMINATOR: char = '|';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HuffNode {
    pub symbol: u8,
    pub parent: u8,
    pub left: u8,
    pub right: u8,
}

impl HuffNode {
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.left == NO_CHILD && self.right == NO_CHILD
    }
}

/// Bit patterns per symbol, derived from the tree shape.
pub type CodeMap = BTreeMap<u8, Vec<bool>>;

#[derive(Debug, Clone)]
pub struct HuffmanTree {
    nodes: Vec<HuffNode>,
}

impl HuffmanTree {
    pub fn new(nodes: Vec<HuffNode>) -> Result<Self, CodecError> {
        if nodes.is_empty() {
            return Err(CodecError::Truncated);
        }
        let count = nodes.len();
        for node in &nodes {
            for child in [node.left, node.right] {
                if child != NO_CHILD && usize::from(child) >= count {
                    return Err(CodecError::InvalidNode {
                        index: usize::from(child),
                        count,
                    });
                }
            }
        }
        Ok(Self { nodes })
    }

    #[must_use]
    pub fn nodes(&self) -> &[HuffNode] {
        &self.nodes
    }

    fn root(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Decode one string, stopping at the `'|'` terminator.
    ///
    /// Running out of bits mid-symbol is an error; the archive always
    /// terminates every string explicitly.
    pub fn decode_string<R: BitReader>(&self, reader: &mut R) -> Result<String, CodecError> {
        let mut out = String::new();
        loop {
            let mut node = self.root();
            while !self.nodes[node].is_leaf() {
                let bit = reader.read_bit().ok_or(CodecError::Truncated)?;
                let next = if bit {
                    self.nodes[node].right
                } else {
                    self.nodes[node].left
                };
                node = usize::from(next);
            }
            let symbol = char::from(self.nodes[node].symbol);
            if symbol == TERMINATOR {
                return Ok(out);
            }
            out.push(symbol);
        }
    }

    /// Walk the tree and collect the bit pattern for every leaf symbol.
    #[must_use]
    pub fn code_map(&self) -> CodeMap {
        let mut codes = CodeMap::new();
        let mut stack = vec![(self.root(), Vec::new())];
        while let Some((index, path)) = stack.pop() {
            let node = &self.nodes[index];
            if node.is_leaf() {
                codes.insert(node.symbol, path);
                continue;
            }
            if node.left != NO_CHILD {
                let mut left_path = path.clone();
                left_path.push(false);
                stack.push((usize::from(node.left), left_path));
            }
            if node.right != NO_CHILD {
                let mut right_path = path;
                right_path.push(true);
                stack.push((usize::from(node.right), right_path));
            }
        }
        codes
    }
}

/// Encode one string, appending the `'|'` terminator and packing the
/// bits MSB-first with zero padding in the final byte.
///
/// Characters outside the tree fall back to the space character's code,
/// matching the original packer; the tree is never extended.
pub fn encode_string(codes: &CodeMap, text: &str) -> Result<Vec<u8>, CodecError> {
    let mut writer = uw_utils::bits::BitWriter::new();
    for ch in text.chars().chain(std::iter::once(TERMINATOR)) {
        let code = u8::try_from(u32::from(ch))
            .ok()
            .and_then(|byte| codes.get(&byte));
        match code {
            Some(bits) => writer.push_bits(bits),
            None => {
                let space = codes
                    .get(&b' ')
                    .ok_or(CodecError::MissingSymbol { symbol: ch })?;
                log::warn!("character {ch:?} not in the huffman tree, encoding as space");
                writer.push_bits(space);
            }
        }
    }
    Ok(writer.finish())
}
