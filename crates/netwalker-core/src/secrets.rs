use crate::error::WalkError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Prefix marking an obfuscated value in configuration files. This is
/// base64 obfuscation, not encryption; it only keeps passwords out of
/// casual view.
pub const ENC_PREFIX: &str = "ENC:";

/// Obfuscate a secret for at-rest storage.
pub fn obfuscate(plain: &str) -> String {
    format!("{}{}", ENC_PREFIX, STANDARD.encode(plain.as_bytes()))
}

/// Recover a secret. Values without the `ENC:` prefix pass through
/// unchanged so plaintext configuration keeps working.
pub fn reveal(stored: &str) -> Result<String, WalkError> {
    let Some(encoded) = stored.strip_prefix(ENC_PREFIX) else {
        return Ok(stored.to_string());
    };
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| WalkError::SecretError(format!("Invalid obfuscated value: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| WalkError::SecretError(format!("Obfuscated value is not UTF-8: {}", e)))
}

/// Interactive password prompt, used when no credential reaches us through
/// the environment or a flag.
pub fn prompt_password(label: &str) -> Result<String, WalkError> {
    rpassword::prompt_password(format!("{}: ", label))
        .map_err(|e| WalkError::SecretError(format!("Could not read password: {}", e)))
}
