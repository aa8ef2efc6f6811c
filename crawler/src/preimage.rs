// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The preimage table: for every 24-bit prefix, an 8-byte value whose
//! SHA-256 hash starts with that prefix.
//!
//! Kademlia peers serve their `k`-bucket only for FIND_NODE targets whose
//! key shares exactly `k` leading bits with their own key. Synthesizing
//! such targets at crawl time would mean brute-forcing hashes per probe;
//! instead the table is computed once offline and loaded at startup.

use crate::{Error, Result};
use libp2p::PeerId;
use sha2::{Digest, Sha256};
use std::{
    fs::File,
    io::{BufRead, BufReader, Read, Write},
    path::Path,
};

/// Number of prefix bits the table covers.
pub const PREFIX_BITS: u32 = 24;

/// Number of entries in a complete table, `2^24`.
pub const PREIMAGE_COUNT: usize = 1 << PREFIX_BITS;

/// Hard cap on the bucket sweep; also the first out-of-range CPL.
pub const MAX_CPL: u32 = PREFIX_BITS;

/// The Kademlia key of a peer: SHA-256 over its binary identifier.
pub fn kademlia_key(peer: &PeerId) -> [u8; 32] {
    Sha256::digest(peer.to_bytes()).into()
}

/// Immutable lookup from 24-bit key prefix to an 8-byte preimage.
///
/// Loaded once at startup and shared read-only across all workers.
pub struct PreimageTable {
    preimages: Box<[u64]>,
}

impl PreimageTable {
    /// Load a table from its textual form.
    ///
    /// The first line is a header and discarded. Every following line is
    /// `<24-char binary prefix>;<16-hex-char preimage>`. A `.zst` suffix
    /// selects Zstandard decompression. Exactly `2^24` data lines must be
    /// present and cover every prefix.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|err| Error::PreimageMissing(path.into(), err))?;

        let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "zst") {
            Box::new(
                zstd::stream::read::Decoder::new(file)
                    .map_err(|err| Error::PreimageMissing(path.into(), err))?,
            )
        } else {
            Box::new(file)
        };

        Self::parse(BufReader::new(reader))
    }

    fn parse(reader: impl BufRead) -> Result<Self> {
        let mut preimages = vec![0u64; PREIMAGE_COUNT].into_boxed_slice();
        let mut seen = vec![0u64; PREIMAGE_COUNT / 64];
        let mut populated = 0usize;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line_no == 0 {
                // Header line, `hash;preimage`.
                continue;
            }
            if line.is_empty() {
                continue;
            }
            if populated == PREIMAGE_COUNT {
                return Err(Error::PreimageMalformed {
                    line: line_no + 1,
                    reason: "data past the final prefix".into(),
                });
            }

            let (prefix, preimage) = line.split_once(';').ok_or_else(|| {
                Error::PreimageMalformed {
                    line: line_no + 1,
                    reason: "missing `;` separator".into(),
                }
            })?;

            if prefix.len() != PREFIX_BITS as usize {
                return Err(Error::PreimageMalformed {
                    line: line_no + 1,
                    reason: format!("prefix is {} chars, expected {PREFIX_BITS}", prefix.len()),
                });
            }
            let index =
                u32::from_str_radix(prefix, 2).map_err(|err| Error::PreimageMalformed {
                    line: line_no + 1,
                    reason: format!("prefix is not binary: {err}"),
                })? as usize;

            if preimage.len() != 16 {
                return Err(Error::PreimageMalformed {
                    line: line_no + 1,
                    reason: format!(
                        "preimage is {} hex chars, expected 16 (8 bytes)",
                        preimage.len()
                    ),
                });
            }
            let value =
                u64::from_str_radix(preimage, 16).map_err(|err| Error::PreimageMalformed {
                    line: line_no + 1,
                    reason: format!("preimage is not hex: {err}"),
                })?;

            let (word, bit) = (index / 64, index % 64);
            if seen[word] & (1 << bit) == 0 {
                seen[word] |= 1 << bit;
                populated += 1;
            }
            preimages[index] = value;
        }

        if populated != PREIMAGE_COUNT {
            return Err(Error::PreimageIncomplete {
                populated,
                expected: PREIMAGE_COUNT,
            });
        }

        Ok(Self { preimages })
    }

    /// Build a table directly from a dense preimage array, e.g. one
    /// embedded by a downstream tool. The array must cover every prefix.
    pub fn from_preimages(preimages: Vec<u64>) -> Result<Self> {
        if preimages.len() != PREIMAGE_COUNT {
            return Err(Error::PreimageIncomplete {
                populated: preimages.len(),
                expected: PREIMAGE_COUNT,
            });
        }
        Ok(Self {
            preimages: preimages.into_boxed_slice(),
        })
    }

    /// The FIND_NODE target that makes `peer` serve its `cpl`-bucket: an
    /// 8-byte value whose Kademlia key shares exactly `cpl` leading bits
    /// with the peer's key.
    ///
    /// The bit at offset `cpl` is inverted, so the common prefix cannot
    /// accidentally be longer.
    pub fn target_for_cpl(&self, peer: &PeerId, cpl: u32) -> Result<[u8; 8]> {
        if cpl >= MAX_CPL {
            return Err(Error::CplOutOfRange(cpl, MAX_CPL - 1));
        }

        let key = kademlia_key(peer);
        let msb = u32::from_be_bytes([key[0], key[1], key[2], 0]);
        let target = msb ^ (0x8000_0000u32 >> cpl);
        let index = (target >> 8) as usize;

        Ok(self.preimages[index].to_be_bytes())
    }
}

impl std::fmt::Debug for PreimageTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreimageTable")
            .field("entries", &self.preimages.len())
            .finish()
    }
}

/// Generate a complete preimage file in the format [`PreimageTable::load`]
/// accepts.
///
/// Enumerates 64-bit counters from zero, hashing each little-endian
/// encoding, until every 24-bit prefix has seen a preimage. Takes a few
/// minutes and is meant to run once, offline.
pub fn generate(mut out: impl Write) -> Result<()> {
    let mut preimages = vec![0u64; PREIMAGE_COUNT];
    let mut seen = vec![0u64; PREIMAGE_COUNT / 64];
    let mut remaining = PREIMAGE_COUNT;

    let mut counter: u64 = 0;
    while remaining > 0 {
        let digest = Sha256::digest(counter.to_le_bytes());
        let index =
            u32::from_be_bytes([digest[0], digest[1], digest[2], 0]) as usize >> 8;

        let (word, bit) = (index / 64, index % 64);
        if seen[word] & (1 << bit) == 0 {
            seen[word] |= 1 << bit;
            preimages[index] = counter;
            remaining -= 1;
        }

        counter += 1;
        if counter % 10_000_000 == 0 {
            info!(
                hashed = counter,
                covered = PREIMAGE_COUNT - remaining,
                "preimage generation progress"
            );
        }
    }

    writeln!(out, "hash;preimage")?;
    for (index, preimage) in preimages.iter().enumerate() {
        writeln!(
            out,
            "{:024b};{}",
            index,
            hex::encode(preimage.to_le_bytes())
        )?;
    }
    out.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Table where looking up prefix `i` yields `i` itself, so tests can
    /// recover the selected index from the returned bytes. Shared: the
    /// dense array is sizeable.
    fn identity_table() -> &'static PreimageTable {
        static TABLE: std::sync::OnceLock<PreimageTable> = std::sync::OnceLock::new();
        TABLE.get_or_init(|| {
            PreimageTable::from_preimages((0..PREIMAGE_COUNT as u64).collect()).unwrap()
        })
    }

    fn selected_index(table: &PreimageTable, peer: &PeerId, cpl: u32) -> u32 {
        let bytes = table.target_for_cpl(peer, cpl).unwrap();
        u64::from_be_bytes(bytes) as u32
    }

    #[test]
    fn target_shares_exactly_cpl_bits_with_peer_key() {
        let table = identity_table();
        for _ in 0..4 {
            let peer = PeerId::random();
            let key = kademlia_key(&peer);
            let top24 = u32::from_be_bytes([key[0], key[1], key[2], 0]) >> 8;

            for cpl in 0..MAX_CPL {
                let index = selected_index(&table, &peer, cpl);
                let diff = index ^ top24;
                // First `cpl` bits agree.
                if cpl > 0 {
                    assert_eq!(diff >> (PREFIX_BITS - cpl), 0, "cpl {cpl}");
                }
                // Bit `cpl` differs.
                assert_eq!(
                    (diff >> (PREFIX_BITS - 1 - cpl)) & 1,
                    1,
                    "cpl {cpl} must flip the next bit"
                );
            }
        }
    }

    #[test]
    fn cpl_zero_flips_the_top_bit() {
        // A peer whose key starts 0b0… must be steered to the 0b1… half
        // and vice versa.
        let table = identity_table();
        let peer = PeerId::random();
        let key = kademlia_key(&peer);
        let top24 = u32::from_be_bytes([key[0], key[1], key[2], 0]) >> 8;

        let index = selected_index(&table, &peer, 0);
        assert_eq!(index, top24 ^ 0x80_0000);
    }

    #[test]
    fn cpl_out_of_range_is_rejected() {
        let table = identity_table();
        let peer = PeerId::random();
        assert!(matches!(
            table.target_for_cpl(&peer, MAX_CPL),
            Err(Error::CplOutOfRange(..))
        ));
    }

    #[test]
    fn loader_rejects_malformed_prefix() {
        let input = "hash;preimage\n0101;aabbccddeeff0011\n";
        let err = PreimageTable::parse(Cursor::new(input)).unwrap_err();
        assert!(matches!(err, Error::PreimageMalformed { line: 2, .. }));
    }

    #[test]
    fn loader_rejects_short_preimage() {
        let input = "hash;preimage\n000000000000000000000000;aabb\n";
        let err = PreimageTable::parse(Cursor::new(input)).unwrap_err();
        assert!(matches!(err, Error::PreimageMalformed { line: 2, .. }));
    }

    #[test]
    fn loader_rejects_missing_separator() {
        let input = "hash;preimage\n000000000000000000000000aabbccddeeff0011\n";
        let err = PreimageTable::parse(Cursor::new(input)).unwrap_err();
        assert!(matches!(err, Error::PreimageMalformed { line: 2, .. }));
    }

    #[test]
    fn loader_rejects_incomplete_table() {
        let input = "hash;preimage\n000000000000000000000000;aabbccddeeff0011\n";
        let err = PreimageTable::parse(Cursor::new(input)).unwrap_err();
        assert!(matches!(
            err,
            Error::PreimageIncomplete { populated: 1, .. }
        ));
    }

    #[test]
    fn from_preimages_requires_full_coverage() {
        assert!(PreimageTable::from_preimages(vec![0; 16]).is_err());
    }

    #[test]
    fn preimage_hex_round_trips_through_loader_parsing() {
        // The generator writes the little-endian counter bytes as hex;
        // parsing that hex as a big-endian u64 and re-emitting the
        // big-endian bytes must reproduce the original encoding.
        let counter: u64 = 0x0123_4567_89ab_cdef;
        let written = hex::encode(counter.to_le_bytes());
        let parsed = u64::from_str_radix(&written, 16).unwrap();
        assert_eq!(parsed.to_be_bytes(), counter.to_le_bytes());
    }
}
