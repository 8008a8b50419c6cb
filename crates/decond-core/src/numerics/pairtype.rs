//! Packed upper-triangular indexing for unordered component-type pairs.
//!
//! For `n` component types the `n*(n+1)/2` unordered pairs are addressed
//! row-major along the upper triangle:
//!
//! ```text
//!       c
//!   | 0  1  2  3
//! --+------------
//! 0 | 0  1  2  3
//! 1 |    4  5  6
//! 2 |       7  8
//! 3 |          9
//! ```
//!
//! Correlation arrays store the `n` auto components first, followed by the
//! packed cross components, for `n + n*(n+1)/2` rows in total.

/// Counts derived from the number of component types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeCounts {
    pub molecule: usize,
    pub pair: usize,
    pub all: usize,
}

pub fn type_counts(molecule_count: usize) -> TypeCounts {
    let pair = molecule_count * (molecule_count + 1) / 2;
    TypeCounts {
        molecule: molecule_count,
        pair,
        all: molecule_count + pair,
    }
}

/// Packed slot of the unordered pair `(i, j)`, independent of argument
/// order. Both indices must be below `molecule_count`.
pub fn pack(i: usize, j: usize, molecule_count: usize) -> usize {
    assert!(
        i < molecule_count && j < molecule_count,
        "pair indices ({i}, {j}) out of range for {molecule_count} types"
    );
    let row = i.min(j);
    let col = i.max(j);
    row * molecule_count + col - row * (row + 1) / 2
}

/// Exact inverse of [`pack`], returning the ordered pair with `i <= j`.
pub fn unpack(packed: usize, molecule_count: usize) -> (usize, usize) {
    let counts = type_counts(molecule_count);
    assert!(
        packed < counts.pair,
        "packed index {packed} out of range for {molecule_count} types"
    );
    let mut row = 0;
    let mut row_offset = 0;
    while row_offset + (molecule_count - row) <= packed {
        row_offset += molecule_count - row;
        row += 1;
    }
    (row, row + (packed - row_offset))
}

/// Charge products per all-type component: `charge[i]^2` for autos, then
/// `charge[i] * charge[j]` for each packed pair.
pub fn charge_products(charge: &[i64]) -> Vec<f64> {
    let counts = type_counts(charge.len());
    let mut products = vec![0.0; counts.all];
    for i in 0..counts.molecule {
        products[i] = (charge[i] * charge[i]) as f64;
        for j in i..counts.molecule {
            products[counts.molecule + pack(i, j, counts.molecule)] =
                (charge[i] * charge[j]) as f64;
        }
    }
    products
}

/// Multiplicity per all-type component: cross pairs between distinct
/// types appear twice in the double sum over types, so they weigh 2.
pub fn cross_weights(molecule_count: usize) -> Vec<f64> {
    let counts = type_counts(molecule_count);
    let mut weights = vec![1.0; counts.all];
    for i in 0..counts.molecule {
        for j in i..counts.molecule {
            weights[counts.molecule + pack(i, j, counts.molecule)] =
                if i == j { 1.0 } else { 2.0 };
        }
    }
    weights
}

/// Number of distinct molecule pairs per packed pair type: `n_i*(n_i - 1)`
/// on the diagonal (a molecule does not pair with itself), `n_i*n_j`
/// off-diagonal.
pub fn pair_populations(num_mol: &[u64]) -> Vec<f64> {
    let counts = type_counts(num_mol.len());
    let mut populations = vec![0.0; counts.pair];
    for i in 0..counts.molecule {
        for j in i..counts.molecule {
            let product = if i == j {
                num_mol[i] * num_mol[i].saturating_sub(1)
            } else {
                num_mol[i] * num_mol[j]
            };
            populations[pack(i, j, counts.molecule)] = product as f64;
        }
    }
    populations
}

#[cfg(test)]
mod tests {
    use super::{charge_products, cross_weights, pack, pair_populations, type_counts, unpack};

    #[test]
    fn pack_matches_row_major_upper_triangle() {
        assert_eq!(pack(0, 0, 4), 0);
        assert_eq!(pack(0, 3, 4), 3);
        assert_eq!(pack(1, 1, 4), 4);
        assert_eq!(pack(2, 3, 4), 8);
        assert_eq!(pack(3, 3, 4), 9);
    }

    #[test]
    fn pack_is_order_insensitive() {
        for n in 1..8 {
            for i in 0..n {
                for j in i..n {
                    assert_eq!(pack(i, j, n), pack(j, i, n));
                }
            }
        }
    }

    #[test]
    fn pack_and_unpack_are_mutual_inverses() {
        for n in 1..8 {
            let mut seen = vec![false; type_counts(n).pair];
            for i in 0..n {
                for j in i..n {
                    let packed = pack(i, j, n);
                    assert!(!seen[packed], "slot {packed} hit twice for n={n}");
                    seen[packed] = true;
                    assert_eq!(unpack(packed, n), (i, j));
                }
            }
            assert!(seen.iter().all(|hit| *hit), "packing not onto for n={n}");
        }
    }

    #[test]
    fn salt_charge_products_and_weights_match_known_values() {
        // NaCl: zz = [1, 1, 1, -1, 1], ww = [1, 1, 1, 2, 1]
        assert_eq!(charge_products(&[1, -1]), vec![1.0, 1.0, 1.0, -1.0, 1.0]);
        assert_eq!(cross_weights(2), vec![1.0, 1.0, 1.0, 2.0, 1.0]);
    }

    #[test]
    fn pair_populations_exclude_self_pairs_on_the_diagonal() {
        assert_eq!(pair_populations(&[3, 5]), vec![6.0, 15.0, 20.0]);
    }

    #[test]
    fn type_counts_follow_triangular_formula() {
        let counts = type_counts(3);
        assert_eq!(counts.molecule, 3);
        assert_eq!(counts.pair, 6);
        assert_eq!(counts.all, 9);
    }
}
