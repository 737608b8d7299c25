//! SHA-1 password substitute.
//!
//! The password never crosses the wire. Both sides derive a token from the
//! user profile and password, then hash it together with the two seeds of
//! the current connection:
//!
//! ```text
//! token      = SHA1(UTF16BE(user padded to 10) || UTF16BE(password))
//! substitute = SHA1(token || server seed || client seed
//!                   || UTF16BE(user padded to 10) || sequence as u64 BE)
//! ```
//!
//! The user id is upper-cased and blank-padded before hashing; the password
//! keeps its case.

use hoststream_proto::{
    ProtocolError,
    signon::{Seed, USER_ID_LEN},
};
use sha1::{Digest, Sha1};

/// SHA-1 digest length.
pub const DIGEST_LEN: usize = 20;

/// Sequence number used by the signon and start-server exchanges.
pub const SIGNON_SEQUENCE: u64 = 1;

fn padded_user_utf16(user: &str) -> Result<Vec<u8>, ProtocolError> {
    let upper = user.trim().to_uppercase();
    let len = upper.chars().count();
    if len > USER_ID_LEN {
        return Err(ProtocolError::FieldTooLong { len, width: USER_ID_LEN });
    }
    let padded = format!("{upper:<width$}", width = USER_ID_LEN);
    Ok(padded.encode_utf16().flat_map(u16::to_be_bytes).collect())
}

/// Password token for `user`.
pub fn password_token(user: &str, password: &str) -> Result<[u8; DIGEST_LEN], ProtocolError> {
    let mut hasher = Sha1::new();
    hasher.update(padded_user_utf16(user)?);
    for unit in password.encode_utf16() {
        hasher.update(unit.to_be_bytes());
    }
    Ok(hasher.finalize().into())
}

/// Substitute sent in signon info and start server requests.
pub fn password_substitute(
    token: &[u8; DIGEST_LEN],
    server_seed: &Seed,
    client_seed: &Seed,
    user: &str,
    sequence: u64,
) -> Result<[u8; DIGEST_LEN], ProtocolError> {
    let mut hasher = Sha1::new();
    hasher.update(token);
    hasher.update(server_seed);
    hasher.update(client_seed);
    hasher.update(padded_user_utf16(user)?);
    hasher.update(sequence.to_be_bytes());
    Ok(hasher.finalize().into())
}

/// Token and substitute in one step, with the signon sequence number.
pub fn signon_substitute(
    user: &str,
    password: &str,
    server_seed: &Seed,
    client_seed: &Seed,
) -> Result<[u8; DIGEST_LEN], ProtocolError> {
    let token = password_token(user, password)?;
    password_substitute(&token, server_seed, client_seed, user, SIGNON_SEQUENCE)
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    const SERVER_SEED: Seed = hex!("0102030405060708");
    const CLIENT_SEED: Seed = hex!("1112131415161718");

    #[test]
    fn token_golden_vector() {
        assert_eq!(
            password_token("QSECOFR", "secret").unwrap(),
            hex!("cac94bb4df98a33a0ed0d812dd00ede14e9f3f85")
        );
    }

    #[test]
    fn substitute_golden_vector() {
        let token = password_token("QSECOFR", "secret").unwrap();
        assert_eq!(
            password_substitute(&token, &SERVER_SEED, &CLIENT_SEED, "QSECOFR", 1).unwrap(),
            hex!("c58e980733d909b80eb3482b593a67c702e0d77d")
        );
    }

    #[test]
    fn user_is_case_insensitive_password_is_not() {
        assert_eq!(
            password_token("qsecofr", "secret").unwrap(),
            password_token("QSECOFR", "secret").unwrap()
        );
        assert_ne!(
            password_token("QSECOFR", "Secret").unwrap(),
            password_token("QSECOFR", "secret").unwrap()
        );
    }

    #[test]
    fn seeds_change_the_substitute() {
        let a = signon_substitute("QSECOFR", "secret", &SERVER_SEED, &CLIENT_SEED).unwrap();
        let b = signon_substitute("QSECOFR", "secret", &CLIENT_SEED, &SERVER_SEED).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn long_user_rejected() {
        assert_eq!(
            password_token("ABCDEFGHIJK", "x").unwrap_err(),
            ProtocolError::FieldTooLong { len: 11, width: USER_ID_LEN }
        );
    }
}
