use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use fleetgate::vault::{self, CredentialVault};
use fleetgate::VaultError;

const KEY: &[u8; 32] = b"0123456789abcdef0123456789abcdef";

#[test]
fn test_vault_encryption_decryption() {
    for plaintext in ["", "p", "s3cr3t-p@ss", "多字节密码", "line1\nline2"] {
        let sealed = vault::encrypt(KEY, plaintext).expect("Failed to encrypt");
        assert_ne!(sealed, plaintext);

        let opened = vault::decrypt(KEY, &sealed).expect("Failed to decrypt");
        assert_eq!(opened, plaintext);
    }
}

#[test]
fn test_encrypt_uses_fresh_nonce() {
    let first = vault::encrypt(KEY, "same-password").unwrap();
    let second = vault::encrypt(KEY, "same-password").unwrap();

    assert_ne!(first, second);
    assert_eq!(vault::decrypt(KEY, &first).unwrap(), "same-password");
    assert_eq!(vault::decrypt(KEY, &second).unwrap(), "same-password");
}

#[test]
fn test_output_is_url_safe_base64() {
    let sealed = vault::encrypt(KEY, "some fairly long password with symbols ?/+").unwrap();
    assert!(!sealed.contains('+'));
    assert!(!sealed.contains('/'));
    assert!(URL_SAFE.decode(&sealed).is_ok());
}

#[test]
fn test_invalid_key_size() {
    for len in [0usize, 16, 31, 33, 64] {
        let key = vec![7u8; len];
        assert_eq!(
            vault::encrypt(&key, "x"),
            Err(VaultError::InvalidKeySize(len))
        );
        assert_eq!(
            vault::decrypt(&key, "not even base64!"),
            Err(VaultError::InvalidKeySize(len)),
            "key size must be checked before the ciphertext is looked at"
        );
    }
    assert!(CredentialVault::new(&[1u8; 16]).is_err());
}

#[test]
fn test_malformed_ciphertext() {
    assert!(matches!(
        vault::decrypt(KEY, "***not base64***"),
        Err(VaultError::InvalidCiphertext(_))
    ));

    let short = URL_SAFE.encode([0u8; 8]);
    assert!(matches!(
        vault::decrypt(KEY, &short),
        Err(VaultError::InvalidCiphertext(_))
    ));
}

#[test]
fn test_wrong_key_fails_closed() {
    let sealed = vault::encrypt(KEY, "db-password").unwrap();
    let other_key = [9u8; 32];

    assert_eq!(
        vault::decrypt(&other_key, &sealed),
        Err(VaultError::Decryption)
    );
}

#[test]
fn test_tampered_ciphertext_fails_closed() {
    let sealed = vault::encrypt(KEY, "db-password").unwrap();
    let mut bytes = URL_SAFE.decode(&sealed).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    let tampered = URL_SAFE.encode(bytes);

    assert_eq!(vault::decrypt(KEY, &tampered), Err(VaultError::Decryption));
}

#[test]
fn test_vault_from_hex() {
    let key_hex = CredentialVault::generate_key_hex();
    assert_eq!(key_hex.len(), 64);

    let vault = CredentialVault::from_hex(&key_hex).unwrap();
    let sealed = vault.encrypt("hunter2").unwrap();
    assert_eq!(vault.decrypt(&sealed).unwrap(), "hunter2");

    let raw = hex::decode(&key_hex).unwrap();
    assert_eq!(vault::decrypt(&raw, &sealed).unwrap(), "hunter2");

    assert!(CredentialVault::from_hex("abcd").is_err());
    assert!(CredentialVault::from_hex("zz").is_err());
    assert!(!format!("{:?}", vault).contains(&key_hex));
}
