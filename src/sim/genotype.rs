// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Enumerating allele assignments.

/**
An odometer over digits with per-position radices.

The last digit moves fastest.  Iteration starts at all zeros and ends after the
all-maximum state; any zero radix means there are no states at all.

```
use kernels_and_words::sim::MixedRadixCounter;
let states: Vec<Vec<usize>> = MixedRadixCounter::new(vec![2, 3]).collect();
assert_eq!(states.len(), 6);
assert_eq!(states[1], vec![0, 1]);
assert_eq!(states[3], vec![1, 0]);
```
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixedRadixCounter {
    radices: Vec<usize>,
    digits: Vec<usize>,
    done: bool,
}

impl MixedRadixCounter {
    pub fn new(radices: Vec<usize>) -> Self {
        let done = radices.contains(&0);
        MixedRadixCounter {
            digits: vec![0; radices.len()],
            radices,
            done,
        }
    }

    pub fn digits(&self) -> &[usize] {
        &self.digits
    }

    /// Moves to the next state.  Returns false, leaving all digits zero, after the last one.
    pub fn advance(&mut self) -> bool {
        for position in (0..self.digits.len()).rev() {
            self.digits[position] += 1;
            if self.digits[position] < self.radices[position] {
                return true;
            }
            self.digits[position] = 0;
        }
        self.done = true;
        false
    }
}

impl Iterator for MixedRadixCounter {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.done {
            return None;
        }
        let state = self.digits.clone();
        self.advance();
        Some(state)
    }
}

/// Every way of giving each of `haplotypes` individuals one of `alleles` alleles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenotypeSet {
    alleles: usize,
    haplotypes: usize,
    genotypes: Vec<u16>,
}

impl GenotypeSet {
    pub fn new(alleles: u16, haplotypes: usize) -> Self {
        let genotypes = MixedRadixCounter::new(vec![alleles as usize; haplotypes])
            .flatten()
            .map(|a| a as u16)
            .collect();
        GenotypeSet {
            alleles: alleles as usize,
            haplotypes,
            genotypes,
        }
    }

    pub fn alleles(&self) -> usize {
        self.alleles
    }

    pub fn haplotypes(&self) -> usize {
        self.haplotypes
    }

    pub fn len(&self) -> usize {
        self.genotypes.len().checked_div(self.haplotypes).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<&[u16]> {
        let start = index.checked_mul(self.haplotypes)?;
        self.genotypes.get(start..start + self.haplotypes)
    }

    /// Genotypes back to back, `haplotypes` entries each.
    pub fn as_flat(&self) -> &[u16] {
        &self.genotypes
    }
}
