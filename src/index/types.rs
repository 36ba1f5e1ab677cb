//! Key and value codec, comparator and hasher seams, transaction context.

use std::cmp::Ordering;
use std::hash::Hasher;

/// A fixed-width value that can be packed into page bytes.
///
/// Keys and values stored by the index implement this. All integers pack
/// little-endian, matching the rest of the on-page format.
pub trait Packable: Copy + std::fmt::Debug {
    /// Packed width in bytes.
    const PACKED_SIZE: usize;

    /// Writes the packed form into `buf[..Self::PACKED_SIZE]`.
    fn pack_into(&self, buf: &mut [u8]);

    /// Reads the packed form from `buf[..Self::PACKED_SIZE]`.
    fn unpack_from(buf: &[u8]) -> Self;
}

macro_rules! packable_int {
    ($($t:ty),*) => {
        $(
            impl Packable for $t {
                const PACKED_SIZE: usize = std::mem::size_of::<$t>();

                fn pack_into(&self, buf: &mut [u8]) {
                    buf[..Self::PACKED_SIZE].copy_from_slice(&self.to_le_bytes());
                }

                fn unpack_from(buf: &[u8]) -> Self {
                    <$t>::from_le_bytes(
                        buf[..Self::PACKED_SIZE].try_into().expect("packed width"),
                    )
                }
            }
        )*
    };
}

packable_int!(i32, i64, u32, u64);

/// Total order over keys, supplied by the caller.
///
/// Keys are compared rather than required to implement `Eq` so that
/// callers can store keys whose ordering depends on runtime information
/// (collations, schema-typed keys).
pub trait KeyComparator<K>: Send + Sync {
    fn compare(&self, lhs: &K, rhs: &K) -> Ordering;
}

/// Comparator for keys with an intrinsic order.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrdComparator;

impl<K: Ord> KeyComparator<K> for OrdComparator {
    fn compare(&self, lhs: &K, rhs: &K) -> Ordering {
        lhs.cmp(rhs)
    }
}

/// 32-bit hash over keys, supplied by the caller.
pub trait KeyHasher<K>: Send + Sync {
    fn hash(&self, key: &K) -> u32;
}

/// Hashes the packed bytes of the key with the standard library's
/// SipHash, folded to 32 bits. Deterministic within and across runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyHasher;

impl<K: Packable> KeyHasher<K> for DefaultKeyHasher {
    fn hash(&self, key: &K) -> u32 {
        let mut buf = vec![0u8; K::PACKED_SIZE];
        key.pack_into(&mut buf);

        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        hasher.write(&buf);
        hasher.finish() as u32
    }
}

/// Opaque transaction context threaded through index operations.
///
/// The index passes it along unchanged; lock bookkeeping belongs to the
/// transaction layer above this crate.
#[derive(Debug)]
pub struct Transaction {
    id: u64,
}

impl Transaction {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}
