//! Side-by-side line diff for the compare endpoint.
//!
//! Common prefix and suffix are stripped, the middle is aligned with a
//! longest-common-subsequence table, and a run of deletes next to a run of
//! inserts becomes one `replace` block.

use turbofile_core::dto::{DiffLine, DiffTag};

/// Above this many cells the middle section is shown as one replace block.
const MAX_TABLE_CELLS: usize = 16_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal(usize, usize),
    Delete(usize),
    Insert(usize),
}

pub fn side_by_side(left: &str, right: &str) -> Vec<DiffLine> {
    let a: Vec<&str> = left.lines().collect();
    let b: Vec<&str> = right.lines().collect();
    rows(&a, &b, &edit_script(&a, &b))
}

fn edit_script(a: &[&str], b: &[&str]) -> Vec<Op> {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    let (a_mid, b_mid) = (&a[prefix..a.len() - suffix], &b[prefix..b.len() - suffix]);

    let mut ops: Vec<Op> = (0..prefix).map(|i| Op::Equal(i, i)).collect();
    if a_mid.len().saturating_mul(b_mid.len()) > MAX_TABLE_CELLS {
        ops.extend((0..a_mid.len()).map(|i| Op::Delete(prefix + i)));
        ops.extend((0..b_mid.len()).map(|j| Op::Insert(prefix + j)));
    } else {
        ops.extend(lcs_ops(a_mid, b_mid).into_iter().map(|op| match op {
            Op::Equal(i, j) => Op::Equal(prefix + i, prefix + j),
            Op::Delete(i) => Op::Delete(prefix + i),
            Op::Insert(j) => Op::Insert(prefix + j),
        }));
    }
    let (a_tail, b_tail) = (a.len() - suffix, b.len() - suffix);
    ops.extend((0..suffix).map(|k| Op::Equal(a_tail + k, b_tail + k)));
    ops
}

fn lcs_ops(a: &[&str], b: &[&str]) -> Vec<Op> {
    let (n, m) = (a.len(), b.len());
    // table[i][j]: LCS length of a[i..] and b[j..]
    let mut table = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if a[i] == b[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            ops.push(Op::Equal(i, j));
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            ops.push(Op::Delete(i));
            i += 1;
        } else {
            ops.push(Op::Insert(j));
            j += 1;
        }
    }
    ops.extend((i..n).map(Op::Delete));
    ops.extend((j..m).map(Op::Insert));
    ops
}

fn rows(a: &[&str], b: &[&str], ops: &[Op]) -> Vec<DiffLine> {
    let mut out = Vec::with_capacity(ops.len());
    let mut idx = 0;
    while idx < ops.len() {
        if let Op::Equal(i, j) = ops[idx] {
            out.push(DiffLine {
                tag: DiffTag::Equal,
                left_no: Some(i + 1),
                right_no: Some(j + 1),
                left: a[i].to_string(),
                right: b[j].to_string(),
            });
            idx += 1;
            continue;
        }

        let mut deleted = Vec::new();
        let mut inserted = Vec::new();
        while let Some(op) = ops.get(idx) {
            match *op {
                Op::Delete(i) => deleted.push(i),
                Op::Insert(j) => inserted.push(j),
                Op::Equal(..) => break,
            }
            idx += 1;
        }

        // A block with lines on both sides is a replace, padded on the shorter side.
        let tag = match (deleted.is_empty(), inserted.is_empty()) {
            (false, false) => DiffTag::Replace,
            (false, true) => DiffTag::Delete,
            _ => DiffTag::Insert,
        };
        for k in 0..deleted.len().max(inserted.len()) {
            let left = deleted.get(k).copied();
            let right = inserted.get(k).copied();
            out.push(DiffLine {
                tag,
                left_no: left.map(|i| i + 1),
                right_no: right.map(|j| j + 1),
                left: left.map(|i| a[i].to_string()).unwrap_or_default(),
                right: right.map(|j| b[j].to_string()).unwrap_or_default(),
            });
        }
    }
    out
}
