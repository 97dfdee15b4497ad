/// Syntactic recipient check, swappable per target ledger.
pub trait AddressValidator: Send + Sync {
    fn is_valid(&self, address: &str) -> bool;
}

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Base-58 addresses of bounded length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Base58AddressValidator {
    pub min_len: usize,
    pub max_len: usize,
}

impl Base58AddressValidator {
    pub fn new(min_len: usize, max_len: usize) -> Self {
        Self { min_len, max_len }
    }
}

impl Default for Base58AddressValidator {
    fn default() -> Self {
        Self::new(32, 44)
    }
}

impl AddressValidator for Base58AddressValidator {
    fn is_valid(&self, address: &str) -> bool {
        let len = address.chars().count();
        len >= self.min_len
            && len <= self.max_len
            && address.chars().all(|ch| BASE58_ALPHABET.contains(ch))
    }
}
