//! CPython-compatible hash values.
//!
//! Set iteration order falls out of where entries land in the hash table,
//! so the runtime hashes exactly the way CPython does with
//! `PYTHONHASHSEED=0`: numbers modulo the Mersenne prime 2**61 - 1, strings
//! with SipHash-1-3 under a zero key, tuples with the xxHash-style combiner.

use num_bigint::BigInt;
use num_traits::ToPrimitive;

const HASH_BITS: u32 = 61;
const HASH_MODULUS: u64 = (1 << HASH_BITS) - 1;
const HASH_INF: i64 = 314_159;
/// `hash(None)` since Python 3.12
pub const NONE_HASH: i64 = 0xFCA8_6420;

const XXPRIME_1: u64 = 11_400_714_785_074_694_791;
const XXPRIME_2: u64 = 14_029_467_366_897_019_727;
const XXPRIME_5: u64 = 2_870_177_450_012_600_261;

/// -1 is the error sentinel in CPython's hash protocol
fn fix_minus_one(hash: i64) -> i64 {
    if hash == -1 {
        -2
    } else {
        hash
    }
}

pub fn int_hash(value: i64) -> i64 {
    let magnitude = (value.unsigned_abs() % HASH_MODULUS) as i64;
    fix_minus_one(if value < 0 { -magnitude } else { magnitude })
}

pub fn long_hash(value: &BigInt) -> i64 {
    let magnitude = (value.magnitude() % HASH_MODULUS).to_i64().unwrap_or(0);
    fix_minus_one(if value.sign() == num_bigint::Sign::Minus {
        -magnitude
    } else {
        magnitude
    })
}

/// Mantissa in `[0.5, 1)` and exponent with `value == m * 2**e`
fn frexp(value: f64) -> (f64, i32) {
    if value == 0.0 || !value.is_finite() {
        return (value, 0);
    }
    let bits = value.to_bits();
    let exponent = ((bits >> 52) & 0x7ff) as i32;
    if exponent == 0 {
        // subnormal
        let (mantissa, exponent) = frexp(value * 2f64.powi(64));
        return (mantissa, exponent - 64);
    }
    let mantissa = f64::from_bits((bits & !(0x7ff << 52)) | (1022 << 52));
    (mantissa, exponent - 1022)
}

/// Hash of a float that is not integral; integral floats hash as ints.
pub fn float_hash(value: f64) -> i64 {
    if value.is_infinite() {
        return if value > 0.0 { HASH_INF } else { -HASH_INF };
    }
    if value.is_nan() {
        return 0;
    }
    let (mut mantissa, mut exponent) = frexp(value);
    let mut sign = 1i64;
    if mantissa < 0.0 {
        sign = -1;
        mantissa = -mantissa;
    }
    let mut x: u64 = 0;
    while mantissa != 0.0 {
        x = ((x << 28) & HASH_MODULUS) | (x >> (HASH_BITS - 28));
        mantissa *= 268_435_456.0;
        exponent -= 28;
        let digit = mantissa as u64;
        mantissa -= digit as f64;
        x += digit;
        if x >= HASH_MODULUS {
            x -= HASH_MODULUS;
        }
    }
    let bits = HASH_BITS as i32;
    let exponent = if exponent >= 0 {
        exponent % bits
    } else {
        bits - 1 - ((-1 - exponent) % bits)
    } as u32;
    x = ((x << exponent) & HASH_MODULUS) | (x >> (HASH_BITS - exponent));
    fix_minus_one((x as i64).wrapping_mul(sign))
}

fn sip_round(v: &mut [u64; 4]) {
    fn half(a: &mut u64, b: &mut u64, c: &mut u64, d: &mut u64, s: u32, t: u32) {
        *a = a.wrapping_add(*b);
        *c = c.wrapping_add(*d);
        *b = b.rotate_left(s) ^ *a;
        *d = d.rotate_left(t) ^ *c;
        *a = a.rotate_left(32);
    }
    let [v0, v1, v2, v3] = v;
    half(v0, v1, v2, v3, 13, 16);
    half(v2, v1, v0, v3, 17, 21);
}

/// SipHash-1-3 keyed with zeros
fn siphash13(data: &[u8]) -> u64 {
    let mut v = [
        0x736f_6d65_7073_6575,
        0x646f_7261_6e64_6f6d,
        0x6c79_6765_6e65_7261,
        0x7465_6462_7974_6573,
    ];
    let mut chunks = data.chunks_exact(8);
    for chunk in &mut chunks {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        let word = u64::from_le_bytes(word);
        v[3] ^= word;
        sip_round(&mut v);
        v[0] ^= word;
    }
    let mut tail = [0u8; 8];
    tail[..chunks.remainder().len()].copy_from_slice(chunks.remainder());
    let last = ((data.len() as u64) << 56) | u64::from_le_bytes(tail);
    v[3] ^= last;
    sip_round(&mut v);
    v[0] ^= last;
    v[2] ^= 0xff;
    for _ in 0..3 {
        sip_round(&mut v);
    }
    v[0] ^ v[1] ^ v[2] ^ v[3]
}

/// Strings hash their code units at the narrowest width that holds every
/// character, matching CPython's compact string layout.
pub fn str_hash(text: &str) -> i64 {
    if text.is_empty() {
        return 0;
    }
    let widest = text.chars().map(u32::from).max().unwrap_or(0);
    let data: Vec<u8> = if widest < 0x100 {
        text.chars().map(|c| u32::from(c) as u8).collect()
    } else if widest < 0x1_0000 {
        text.chars()
            .flat_map(|c| (u32::from(c) as u16).to_le_bytes())
            .collect()
    } else {
        text.chars().flat_map(|c| u32::from(c).to_le_bytes()).collect()
    };
    fix_minus_one(siphash13(&data) as i64)
}

pub fn tuple_hash(items: impl ExactSizeIterator<Item = i64>) -> i64 {
    let len = items.len() as u64;
    let mut acc = XXPRIME_5;
    for lane in items {
        acc = acc.wrapping_add((lane as u64).wrapping_mul(XXPRIME_2));
        acc = acc.rotate_left(31);
        acc = acc.wrapping_mul(XXPRIME_1);
    }
    acc = acc.wrapping_add(len ^ (XXPRIME_5 ^ 3_527_539));
    if acc == u64::MAX {
        return 1_546_275_796;
    }
    acc as i64
}

/// Default object hash, derived from the address
pub fn pointer_hash(address: usize) -> i64 {
    fix_minus_one(address.rotate_right(4) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_hash_wraps_at_mersenne_prime() {
        assert_eq!(int_hash(1), 1);
        assert_eq!(int_hash(-1), -2);
        assert_eq!(int_hash((1 << 61) - 1), 0);
        assert_eq!(long_hash(&(BigInt::from(1) << 64)), 8);
        assert_eq!(long_hash(&-(BigInt::from(1) << 64usize)), -8);
    }

    #[test]
    fn test_float_hash() {
        assert_eq!(float_hash(1.5), 1_152_921_504_606_846_977);
        assert_eq!(float_hash(-2.75), -1_729_382_256_910_270_466);
        assert_eq!(float_hash(0.1), 230_584_300_921_369_408);
        assert_eq!(float_hash(1e300), 1_224_995_262_755_759_164);
        assert_eq!(float_hash(5e-324), 16_777_216);
        assert_eq!(float_hash(f64::NEG_INFINITY), -314_159);
    }

    #[test]
    fn test_str_hash_uses_zero_seed() {
        assert_eq!(str_hash(""), 0);
        assert_eq!(str_hash("a"), 4_644_417_185_603_328_019);
        assert_eq!(str_hash("abc"), -4_594_863_902_769_663_758);
        assert_eq!(str_hash("hello world!"), 839_851_713_330_019_024);
        assert_eq!(str_hash("é"), 6_047_309_291_227_476_195);
        assert_eq!(str_hash("€"), -5_529_981_157_763_016_009);
        assert_eq!(str_hash("😀x"), -8_926_728_262_118_538_918);
    }

    #[test]
    fn test_tuple_hash() {
        assert_eq!(tuple_hash(std::iter::empty()), 5_740_354_900_026_072_187);
        assert_eq!(tuple_hash([1, 2].into_iter()), -3_550_055_125_485_641_917);
    }
}
