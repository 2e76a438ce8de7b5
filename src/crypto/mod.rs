//! At-rest sealing of token values.

pub mod cipher;

pub use cipher::TokenCipher;
