
//! Canonical Huffman entropy coder over byte symbols (§4.3). The tree is
//! serialized structurally rather than as a frequency table: a `0` bit for
//! an internal node (followed by its left and right subtrees) and a `1` bit
//! for a leaf (followed by its 8-bit symbol). Trees may be up to 255 levels
//! deep, so both the serializer and the deserializer walk an explicit stack
//! rather than recursing.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::bitstream::{BitReader, BitWriter};
use crate::error::{Error, Result};

enum Node {
    Leaf(u8),
    Internal(Box<Node>, Box<Node>),
}

/// Min-heap entry. Ties in frequency break on insertion order so that tree
/// shape (and therefore the compressed byte stream) is fully deterministic
/// regardless of hash- or platform-dependent iteration order.
struct Entry {
    freq: u64,
    seq: u32,
    node: Node,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool { self.freq == other.freq && self.seq == other.seq }
}
impl Eq for Entry {}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.freq.cmp(&self.freq).then_with(|| other.seq.cmp(&self.seq))
    }
}

fn build_tree(counts: &[u64; 256]) -> Result<(Node, usize)> {
    let mut heap = BinaryHeap::new();
    let mut seq = 0_u32;

    for symbol in 0..256usize {
        if counts[symbol] > 0 {
            heap.push(Entry { freq: counts[symbol], seq, node: Node::Leaf(symbol as u8) });
            seq += 1;
        }
    }

    let symbol_count = heap.len();
    if symbol_count == 0 {
        return Err(Error::invalid("huffman: cannot build a tree over zero symbols"));
    }

    while heap.len() > 1 {
        let left = heap.pop().unwrap();
        let right = heap.pop().unwrap();
        heap.push(Entry {
            freq: left.freq + right.freq,
            seq,
            node: Node::Internal(Box::new(left.node), Box::new(right.node)),
        });
        seq += 1;
    }

    Ok((heap.pop().unwrap().node, symbol_count))
}

fn write_tree(writer: &mut BitWriter, root: &Node) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        match node {
            Node::Leaf(symbol) => {
                writer.write_bits(1, 1);
                writer.write_bits(8, *symbol as u32);
            }
            Node::Internal(left, right) => {
                writer.write_bits(1, 0);
                stack.push(right);
                stack.push(left);
            }
        }
    }
}

enum ReadFrame {
    AwaitingLeft,
    AwaitingRight(Box<Node>),
}

fn read_tree(reader: &mut BitReader) -> Result<Node> {
    let mut stack: Vec<ReadFrame> = Vec::new();
    let mut completed: Option<Node> = None;

    loop {
        if completed.is_none() {
            let bit = reader.read_bits(1)?;
            if bit == 1 {
                let symbol = reader.read_bits(8)? as u8;
                completed = Some(Node::Leaf(symbol));
            }
            else {
                stack.push(ReadFrame::AwaitingLeft);
                continue;
            }
        }

        match stack.pop() {
            None => return Ok(completed.take().unwrap()),
            Some(ReadFrame::AwaitingLeft) => {
                let left = Box::new(completed.take().unwrap());
                stack.push(ReadFrame::AwaitingRight(left));
            }
            Some(ReadFrame::AwaitingRight(left)) => {
                let right = Box::new(completed.take().unwrap());
                completed = Some(Node::Internal(left, right));
            }
        }
    }
}

/// `(code, bit length)` per symbol, derived by walking the tree with an
/// explicit stack rather than recursion, for the same depth reason as
/// `read_tree`.
fn build_codes(root: &Node) -> [(u32, u8); 256] {
    let mut codes = [(0_u32, 0_u8); 256];
    let mut stack = vec![(root, 0_u32, 0_u8)];

    while let Some((node, code, length)) = stack.pop() {
        match node {
            Node::Leaf(symbol) => codes[*symbol as usize] = (code, length),
            Node::Internal(left, right) => {
                stack.push((right, (code << 1) | 1, length + 1));
                stack.push((left, code << 1, length + 1));
            }
        }
    }

    codes
}

/// Compress `input` into a prelude (symbol count, serialized tree) followed
/// by the Huffman-coded payload. `input` must be non-empty.
pub fn compress(input: &[u8]) -> Result<Vec<u8>> {
    if input.is_empty() {
        return Err(Error::invalid("huffman: cannot compress empty input"));
    }

    let mut counts = [0_u64; 256];
    for &byte in input {
        counts[byte as usize] += 1;
    }

    let (root, symbol_count) = build_tree(&counts)?;

    let mut output = Vec::with_capacity(input.len() / 2 + 4);
    output.push((symbol_count - 1) as u8);

    let mut writer = BitWriter::with_capacity(input.len());
    write_tree(&mut writer, &root);

    if symbol_count > 1 {
        let codes = build_codes(&root);
        for &byte in input {
            let (code, length) = codes[byte as usize];
            writer.write_bits(length as u32, code);
        }
    }

    output.extend_from_slice(&writer.finish());
    Ok(output)
}

/// Decompress a buffer produced by [`compress`]. `expected_len` is the
/// original uncompressed length, carried by the caller (the tile codec
/// header's stream-length fields), since the degenerate single-symbol
/// encoding carries no payload bits to count.
pub fn decompress(compressed: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    if expected_len == 0 {
        return Ok(Vec::new());
    }

    let symbol_count = *compressed.first()
        .ok_or_else(|| Error::integrity("huffman: compressed data is empty"))? as usize + 1;

    let mut reader = BitReader::new(&compressed[1..]);
    let root = read_tree(&mut reader)?;

    if symbol_count == 1 {
        let symbol = match root {
            Node::Leaf(symbol) => symbol,
            Node::Internal(..) => return Err(Error::integrity("huffman: degenerate prelude names more than one symbol")),
        };

        return Ok(vec![symbol; expected_len]);
    }

    let mut output = Vec::with_capacity(expected_len);
    while output.len() < expected_len {
        let mut node = &root;

        loop {
            match node {
                Node::Leaf(symbol) => {
                    output.push(*symbol);
                    break;
                }
                Node::Internal(left, right) => {
                    node = if reader.read_bits(1)? == 0 { left } else { right };
                }
            }
        }
    }

    Ok(output)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip_mixed_frequencies() {
        let input = b"aaaaaaaabbbbccccdddeeef".to_vec();
        let compressed = compress(&input).unwrap();
        let decompressed = decompress(&compressed, input.len()).unwrap();
        assert_eq!(decompressed, input);
    }

    #[test]
    fn round_trip_degenerate_single_symbol() {
        let input = vec![42_u8; 200];
        let compressed = compress(&input).unwrap();
        // prelude byte + serialized single-leaf tree (1 bit + 8 bits, padded) = 2 bytes, no payload
        assert_eq!(compressed.len(), 2);
        let decompressed = decompress(&compressed, input.len()).unwrap();
        assert_eq!(decompressed, input);
    }

    #[test]
    fn round_trip_all_256_symbols_present() {
        let input: Vec<u8> = (0..=255_u8).cycle().take(4096).collect();
        let compressed = compress(&input).unwrap();
        let decompressed = decompress(&compressed, input.len()).unwrap();
        assert_eq!(decompressed, input);
    }

    #[test]
    fn rejects_empty_input() {
        assert!(compress(&[]).is_err());
    }

    #[test]
    fn compresses_skewed_distribution_smaller_than_input() {
        let mut input = vec![0_u8; 1000];
        input.extend(vec![1_u8; 10]);
        let compressed = compress(&input).unwrap();
        assert!(compressed.len() < input.len());
    }
}
