//! Cryptographic building blocks: credential encryption at rest and the
//! signed OAuth state codec.

mod credential_cipher;
mod signed_state;

pub use credential_cipher::{validate_key_configuration, CipherError, CredentialCipher};
pub use signed_state::{SignedStateCodec, StateError, StatePayload};
