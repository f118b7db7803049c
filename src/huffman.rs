//! Huffman coding of the vocabulary for hierarchical softmax.
//!
//! Frequent words get short codes. Each internal node of the tree owns one
//! row of the hierarchical-softmax table; predicting a word is a sequence
//! of binary decisions, one per node on the path from the root.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Code and decision path for one leaf.
///
/// `path[i]` is the internal node at which decision `code[i]` is taken,
/// starting at the root (`path[0] == num_leaves - 2`). Internal nodes are
/// numbered `0 .. num_leaves - 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HuffmanCode {
    pub code: Vec<u8>,
    pub path: Vec<u32>,
}

impl HuffmanCode {
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Iterate over `(bit, node)` decisions, root first.
    pub fn decisions(&self) -> impl Iterator<Item = (u8, usize)> + '_ {
        self.code
            .iter()
            .zip(&self.path)
            .map(|(&bit, &node)| (bit, node as usize))
    }
}

#[derive(Debug, Clone, Copy)]
struct Node {
    count: u64,
    parent: usize,
    /// which child this node is of its parent (0 or 1)
    bit: u8,
}

/// Leaf order for the first queue: ascending by count.
///
/// The vocabulary is sorted by descending count except for the boundary
/// symbol pinned at index 0, so the reversed order is nearly sorted already
/// and the stable sort here is close to linear.
fn ascending_order(counts: &[u64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..counts.len()).rev().collect();
    order.sort_by_key(|&leaf| counts[leaf]);
    order
}

/// Take the lower-count head of the two queues. Ties go to the leaf queue.
fn pop_min(arena: &[Node], leaves: &mut Range<usize>, internal: &mut Range<usize>) -> usize {
    let take_leaf = match (leaves.is_empty(), internal.is_empty()) {
        (false, false) => arena[leaves.start].count <= arena[internal.start].count,
        (false, true) => true,
        (true, _) => false,
    };
    let queue = if take_leaf { leaves } else { internal };
    let node = queue.start;
    queue.start += 1;
    node
}

/// Build the Huffman tree for `counts` and return each leaf's code, in the
/// same order as `counts`.
///
/// Arena slots `0 .. n` hold the leaves in ascending count order and slots
/// `n .. 2n - 1` the internal nodes in creation order, which is also
/// ascending. Each of the two halves is a queue; merging the cheapest two
/// heads `n - 1` times builds an optimal tree in linear time.
pub fn encode(counts: &[u64]) -> Vec<HuffmanCode> {
    let n = counts.len();
    if n < 2 {
        return vec![HuffmanCode::default(); n];
    }

    let order = ascending_order(counts);
    let mut arena: Vec<Node> = Vec::with_capacity(2 * n - 1);
    arena.extend(order.iter().map(|&leaf| Node {
        count: counts[leaf],
        parent: 0,
        bit: 0,
    }));

    let mut leaves = 0..n;
    let mut internal = n..n;
    for _ in 0..(n - 1) {
        let min1 = pop_min(&arena, &mut leaves, &mut internal);
        let min2 = pop_min(&arena, &mut leaves, &mut internal);
        let id = arena.len();
        arena.push(Node {
            count: arena[min1].count + arena[min2].count,
            parent: 0,
            bit: 0,
        });
        internal.end = id + 1;
        arena[min1].parent = id;
        arena[min2].parent = id;
        arena[min2].bit = 1;
    }

    let root = 2 * n - 2;
    let mut codes = vec![HuffmanCode::default(); n];
    for (slot, &leaf) in order.iter().enumerate() {
        let mut code = vec![];
        let mut path = vec![];
        let mut node = slot;
        while node != root {
            code.push(arena[node].bit);
            let parent = arena[node].parent;
            path.push((parent - n) as u32);
            node = parent;
        }
        code.reverse();
        path.reverse();
        codes[leaf] = HuffmanCode { code, path };
    }
    codes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Reverse;
    use std::collections::BinaryHeap;

    fn is_prefix(a: &[u8], b: &[u8]) -> bool {
        a.len() <= b.len() && b[..a.len()] == *a
    }

    fn weighted_length(counts: &[u64], codes: &[HuffmanCode]) -> u64 {
        counts.iter().zip(codes).map(|(&c, h)| c * h.len() as u64).sum()
    }

    /// Textbook heap-based Huffman cost, for comparison.
    fn reference_cost(counts: &[u64]) -> u64 {
        let mut heap: BinaryHeap<Reverse<u64>> = counts.iter().map(|&c| Reverse(c)).collect();
        let mut cost = 0;
        while heap.len() > 1 {
            let Reverse(a) = heap.pop().unwrap();
            let Reverse(b) = heap.pop().unwrap();
            cost += a + b;
            heap.push(Reverse(a + b));
        }
        cost
    }

    #[test]
    fn two_rarest_merge_first() {
        let counts = [4, 1, 1, 2];
        let codes = encode(&counts);
        assert_eq!(codes[0].len(), 1);
        assert_eq!(codes[3].len(), 2);
        assert_eq!(codes[1].len(), 3);
        assert_eq!(codes[2].len(), 3);
        // siblings: same path, last bit differs
        assert_eq!(codes[1].path, codes[2].path);
        assert_ne!(codes[1].code[2], codes[2].code[2]);
        assert_eq!(weighted_length(&counts, &codes), reference_cost(&counts));
    }

    #[test]
    fn prefix_free_and_paths_consistent() {
        let counts: Vec<u64> = vec![50, 1, 300, 300, 7, 7, 7, 120, 2, 90, 1, 1, 45, 33];
        let codes = encode(&counts);
        let n = counts.len();
        for (i, a) in codes.iter().enumerate() {
            assert_eq!(a.code.len(), a.path.len());
            assert_eq!(a.path[0] as usize, n - 2);
            assert!(a.path.iter().all(|&p| (p as usize) < n - 1));
            for (j, b) in codes.iter().enumerate() {
                if i != j {
                    assert!(!is_prefix(&a.code, &b.code), "code {i} is a prefix of code {j}");
                }
            }
        }
    }

    #[test]
    fn optimal_on_small_inputs() {
        let cases: [&[u64]; 5] = [
            &[1, 1],
            &[10, 1, 1, 1, 1],
            &[5, 5, 5, 5, 5, 5, 5],
            &[0, 100, 50, 25, 12, 6, 3, 1],
            &[1000, 999, 998, 1, 1, 1],
        ];
        for counts in cases {
            let codes = encode(counts);
            assert_eq!(weighted_length(counts, &codes), reference_cost(counts), "{counts:?}");
        }
    }

    #[test]
    fn same_path_node_same_depth() {
        // Two leaves that go through node p must both decide at p at the
        // same depth.
        let codes = encode(&[9, 8, 7, 6, 5, 4, 3, 2, 1]);
        for a in &codes {
            for b in &codes {
                for (d, p) in a.path.iter().enumerate() {
                    if let Some(e) = b.path.iter().position(|q| q == p) {
                        assert_eq!(d, e);
                    }
                }
            }
        }
    }

    #[test]
    fn tiny_vocabularies() {
        assert!(encode(&[]).is_empty());
        assert_eq!(encode(&[5]), vec![HuffmanCode::default()]);
        let two = encode(&[3, 1]);
        assert_eq!(two[0].path, [0]);
        assert_eq!(two[1].path, [0]);
        assert_ne!(two[0].code, two[1].code);
    }
}
