use rand::Rng;

pub const MIN_LENGTH: usize = 16;
pub const MAX_LENGTH: usize = 256;
pub const DEFAULT_LENGTH: usize = 52;

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub fn clamp_length(length: usize) -> usize {
    length.clamp(MIN_LENGTH, MAX_LENGTH)
}

pub fn is_valid_length(value: &str) -> bool {
    (MIN_LENGTH..=MAX_LENGTH).contains(&value.chars().count())
}

/// A lowercase base-36 string of `clamp_length(length)` characters.
pub fn random_string(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..clamp_length(length))
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
