//! Order-preserving key encoding.
//!
//! Index keys are byte strings whose lexicographic order matches the order
//! of the column values they were built from:
//! - Unsigned integers: big endian
//! - Signed integers: big endian with the sign bit flipped
//! - Floats: sign-magnitude folded into an unsigned order (`-0.0 == 0.0`, NaN sorts last)
//! - Strings and byte strings: `0x00` escaped as `0x00 0xFF`, terminated by `0x00 0x00`
//!
//! Compound keys are the concatenation of their column encodings.

use std::fmt;
use std::ops::Index;

use smallvec::SmallVec;

/// Inline storage for key bytes.
pub type KeyBytes = SmallVec<[u8; 16]>;

/// An immutable, order-preserving index key.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    data: KeyBytes,
}

impl Key {
    /// Create a key from raw, already encoded bytes.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            data: SmallVec::from_slice(bytes),
        }
    }

    /// Encode a single value.
    pub fn encode<T: EncodeKey + ?Sized>(value: &T) -> Self {
        let mut data = KeyBytes::new();
        value.encode_into(&mut data);
        Self { data }
    }

    /// Start a compound key.
    pub fn builder() -> KeyBuilder {
        KeyBuilder::default()
    }

    /// Number of encoded bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the key has no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Byte at `pos`, or `None` once the key is exhausted.
    #[inline]
    pub fn get(&self, pos: usize) -> Option<u8> {
        self.data.get(pos).copied()
    }

    /// Whether this key starts with `prefix`.
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.data.starts_with(prefix)
    }

    /// Hex rendering used in error messages.
    pub fn to_hex(&self) -> String {
        to_hex(&self.data)
    }
}

impl Index<usize> for Key {
    type Output = u8;

    fn index(&self, pos: usize) -> &u8 {
        &self.data[pos]
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl From<&[u8]> for Key {
    fn from(bytes: &[u8]) -> Self {
        Key::from_slice(bytes)
    }
}

impl<const N: usize> From<&[u8; N]> for Key {
    fn from(bytes: &[u8; N]) -> Self {
        Key::from_slice(bytes)
    }
}

impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            data: SmallVec::from_vec(bytes),
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.to_hex())
    }
}

/// Builder for multi-column keys.
#[derive(Debug, Default)]
pub struct KeyBuilder {
    data: KeyBytes,
}

impl KeyBuilder {
    /// Append the encoding of one column value.
    pub fn push<T: EncodeKey + ?Sized>(mut self, value: &T) -> Self {
        value.encode_into(&mut self.data);
        self
    }

    /// Finish the key.
    pub fn finish(self) -> Key {
        Key { data: self.data }
    }
}

/// A value with an order-preserving byte encoding.
pub trait EncodeKey {
    /// Append the encoding of `self` to `out`.
    fn encode_into(&self, out: &mut KeyBytes);
}

macro_rules! encode_unsigned {
    ($($t:ty),*) => {$(
        impl EncodeKey for $t {
            fn encode_into(&self, out: &mut KeyBytes) {
                out.extend_from_slice(&self.to_be_bytes());
            }
        }
    )*};
}

macro_rules! encode_signed {
    ($($t:ty => $u:ty),*) => {$(
        impl EncodeKey for $t {
            fn encode_into(&self, out: &mut KeyBytes) {
                let flipped = (*self as $u) ^ (1 << (<$u>::BITS - 1));
                out.extend_from_slice(&flipped.to_be_bytes());
            }
        }
    )*};
}

encode_unsigned!(u8, u16, u32, u64, u128);
encode_signed!(i8 => u8, i16 => u16, i32 => u32, i64 => u64, i128 => u128);

impl EncodeKey for bool {
    fn encode_into(&self, out: &mut KeyBytes) {
        out.push(*self as u8);
    }
}

impl EncodeKey for f32 {
    fn encode_into(&self, out: &mut KeyBytes) {
        out.extend_from_slice(&encode_f32(*self).to_be_bytes());
    }
}

impl EncodeKey for f64 {
    fn encode_into(&self, out: &mut KeyBytes) {
        out.extend_from_slice(&encode_f64(*self).to_be_bytes());
    }
}

impl EncodeKey for [u8] {
    fn encode_into(&self, out: &mut KeyBytes) {
        for &b in self {
            out.push(b);
            if b == 0 {
                out.push(0xFF);
            }
        }
        out.extend_from_slice(&[0, 0]);
    }
}

impl EncodeKey for Vec<u8> {
    fn encode_into(&self, out: &mut KeyBytes) {
        self.as_slice().encode_into(out);
    }
}

impl EncodeKey for str {
    fn encode_into(&self, out: &mut KeyBytes) {
        self.as_bytes().encode_into(out);
    }
}

impl EncodeKey for String {
    fn encode_into(&self, out: &mut KeyBytes) {
        self.as_bytes().encode_into(out);
    }
}

impl<T: EncodeKey + ?Sized> EncodeKey for &T {
    fn encode_into(&self, out: &mut KeyBytes) {
        (**self).encode_into(out);
    }
}

fn encode_f32(value: f32) -> u32 {
    if value.is_nan() {
        return u32::MAX;
    }
    if value == 0.0 {
        return 1 << 31;
    }
    let bits = value.to_bits();
    if bits & (1 << 31) == 0 {
        bits | (1 << 31)
    } else {
        !bits
    }
}

fn encode_f64(value: f64) -> u64 {
    if value.is_nan() {
        return u64::MAX;
    }
    if value == 0.0 {
        return 1 << 63;
    }
    let bits = value.to_bits();
    if bits & (1 << 63) == 0 {
        bits | (1 << 63)
    } else {
        !bits
    }
}

/// Lowercase hex rendering of raw bytes.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Compute the shared prefix length between two byte slices.
pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_ordered<T: EncodeKey>(values: &[T]) {
        for pair in values.windows(2) {
            let (a, b) = (Key::encode(&pair[0]), Key::encode(&pair[1]));
            assert!(a < b, "{a:?} should sort before {b:?}");
        }
    }

    #[test]
    fn test_integer_order() {
        assert_ordered(&[0u32, 1, 255, 256, 65_536, u32::MAX]);
        assert_ordered(&[i64::MIN, -1_000, -1, 0, 1, 1_000, i64::MAX]);
        assert_ordered(&[i8::MIN, -1, 0, 1, i8::MAX]);
        assert_ordered(&[i128::MIN, -1, 0, i128::MAX]);
        assert_eq!(Key::encode(&1u16).as_bytes(), &[0x00, 0x01]);
        assert_eq!(Key::encode(&-1i16).as_bytes(), &[0x7F, 0xFF]);
    }

    #[test]
    fn test_float_order() {
        assert_ordered(&[
            f64::NEG_INFINITY,
            -1e300,
            -2.5,
            -f64::MIN_POSITIVE,
            0.0,
            f64::MIN_POSITIVE,
            1.0,
            1e300,
            f64::INFINITY,
            f64::NAN,
        ]);
        assert_ordered(&[f32::NEG_INFINITY, -1.5f32, 0.0, 0.25, f32::INFINITY]);
        assert_eq!(Key::encode(&-0.0f64), Key::encode(&0.0f64));
    }

    #[test]
    fn test_string_order() {
        assert_ordered(&["", "a", "a\0", "a\0b", "a\x01", "ab", "b"]);
        assert_eq!(Key::encode("ab").as_bytes(), b"ab\0\0");
        assert_eq!(Key::encode(&b"a\0"[..]).as_bytes(), &[b'a', 0, 0xFF, 0, 0]);
    }

    #[test]
    fn test_compound_keys() {
        let k = |a: i32, b: &str| Key::builder().push(&a).push(b).finish();
        assert!(k(1, "zzz") < k(2, "a"));
        assert!(k(2, "a") < k(2, "ab"));
        assert!(k(-5, "x") < k(0, ""));
    }

    #[test]
    fn test_key_accessors() {
        let key = Key::from(&[1u8, 2, 3]);
        assert_eq!(key.len(), 3);
        assert_eq!(key[1], 2);
        assert_eq!(key.get(2), Some(3));
        assert_eq!(key.get(3), None);
        assert!(key.starts_with(&[1, 2]));
        assert_eq!(key.to_hex(), "010203");
        assert!(Key::default().is_empty());
    }

    #[test]
    fn test_common_prefix_len() {
        assert_eq!(common_prefix_len(b"hello", b"help"), 3);
        assert_eq!(common_prefix_len(b"hello", b"world"), 0);
        assert_eq!(common_prefix_len(b"hello", b"hello"), 5);
        assert_eq!(common_prefix_len(b"", b"hello"), 0);
    }
}
