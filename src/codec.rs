//! Cryptogram wire format.
//!
//! ```text
//! --- BEGIN KEY: <KEYCIPHER>,<keyid>,<BODYCIPHER>,<mode>,<keysize>,<ivsize> ---
//! <base64 key blob, 76 columns; an empty line when there is no blob>
//! --- END KEY ---
//! <base64 body, 76 columns; raw text for the plain cipher>
//! ```
//!
//! The header alone says how to decrypt the body. Text without a headline
//! that decodes as base64 is a headerless cryptogram written by releases that
//! predate the header: a single RSA blob.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::engine::PLAIN_CIPHER;
use crate::error::{CryptoError, CryptoResult};
use crate::registry::{display_name, normalize_cipher_name};

pub const BEGIN_MARKER: &str = "--- BEGIN";
pub const HEADLINE_PREFIX: &str = "--- BEGIN KEY:";
pub const HEADLINE_SUFFIX: &str = "---";
pub const END_KEY_MARKER: &str = "--- END KEY ---";

/// Base64 line width.
pub const LINE_WIDTH: usize = 76;

const HEADER_FIELDS: usize = 6;

fn is_armor_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n' | '\0')
}

/// The six headline fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Cipher that wrapped the key blob, or the body cipher itself in
    /// pure-asymmetric mode.
    pub key_cipher: String,
    /// Identifier of the key pair needed to decrypt.
    pub key_id: String,
    pub body_cipher: String,
    /// Empty for ciphers without a mode.
    pub body_mode: String,
    /// Body key size in bytes.
    pub key_size: usize,
    /// Body IV size in bytes.
    pub iv_size: usize,
}

impl Header {
    /// Build a header with every text field normalized the way it will be
    /// read back.
    pub fn new(
        key_cipher: &str,
        key_id: &str,
        body_cipher: &str,
        body_mode: &str,
        key_size: usize,
        iv_size: usize,
    ) -> Self {
        Self {
            key_cipher: clean_cipher(key_cipher),
            key_id: clean(key_id),
            body_cipher: clean_cipher(body_cipher),
            body_mode: clean(body_mode),
            key_size,
            iv_size,
        }
    }

    /// The headline, cipher names upper-cased.
    pub fn headline(&self) -> String {
        format!(
            "{HEADLINE_PREFIX} {},{},{},{},{},{} {HEADLINE_SUFFIX}",
            display_name(&clean_cipher(&self.key_cipher)),
            clean(&self.key_id),
            display_name(&clean_cipher(&self.body_cipher)),
            clean(&self.body_mode),
            self.key_size,
            self.iv_size,
        )
    }

    /// Whether the body is written unarmored.
    pub fn is_plain(&self) -> bool {
        self.body_cipher == PLAIN_CIPHER
    }

    fn parse(headline: &str) -> CryptoResult<Self> {
        let inner = headline
            .trim()
            .strip_prefix(HEADLINE_PREFIX)
            .and_then(|rest| rest.trim_end().strip_suffix(HEADLINE_SUFFIX))
            .ok_or_else(|| CryptoError::HeaderCorrupted("malformed headline".to_string()))?;

        let fields: Vec<&str> = inner.split(',').map(str::trim).collect();
        if fields.len() != HEADER_FIELDS {
            return Err(CryptoError::HeaderCorrupted(format!(
                "expected {HEADER_FIELDS} header fields, found {}",
                fields.len()
            )));
        }
        let size = |name: &str, value: &str| {
            value.parse::<usize>().map_err(|_| {
                CryptoError::HeaderCorrupted(format!("{name} is not a number: {value:?}"))
            })
        };
        Ok(Self::new(
            fields[0],
            fields[1],
            fields[2],
            fields[3],
            size("key size", fields[4])?,
            size("iv size", fields[5])?,
        ))
    }
}

fn clean(field: &str) -> String {
    field
        .trim()
        .chars()
        .filter(|&c| c != ',' && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn clean_cipher(field: &str) -> String {
    normalize_cipher_name(&clean(field))
}

/// Whether the text carried a headline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStatus {
    Native,
    NotFound,
}

/// A decoded cryptogram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cryptogram {
    Native {
        header: Header,
        key_blob: Vec<u8>,
        body: Vec<u8>,
    },
    /// Base64 text with no headline.
    Headerless { body: Vec<u8> },
}

impl Cryptogram {
    pub fn status(&self) -> HeaderStatus {
        match self {
            Self::Native { .. } => HeaderStatus::Native,
            Self::Headerless { .. } => HeaderStatus::NotFound,
        }
    }

    pub fn header(&self) -> Option<&Header> {
        match self {
            Self::Native { header, .. } => Some(header),
            Self::Headerless { .. } => None,
        }
    }

    pub fn body(&self) -> &[u8] {
        match self {
            Self::Native { body, .. } | Self::Headerless { body } => body,
        }
    }
}

/// Base64-encode `bytes`, wrapped at [`LINE_WIDTH`] columns, without a
/// trailing newline.
pub fn armor(bytes: &[u8]) -> String {
    let encoded = STANDARD.encode(bytes);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / LINE_WIDTH);
    let mut start = 0;
    while start < encoded.len() {
        let end = (start + LINE_WIDTH).min(encoded.len());
        if start > 0 {
            out.push('\n');
        }
        out.push_str(&encoded[start..end]);
        start = end;
    }
    out
}

/// Decode armored base64, ignoring line breaks, blanks and NUL bytes.
pub fn dearmor(text: &str) -> CryptoResult<Vec<u8>> {
    let compact: String = text.chars().filter(|&c| !is_armor_whitespace(c)).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| CryptoError::InvalidArmor(e.to_string()))
}

/// Assemble a cryptogram.
///
/// A plain-cipher body is written as is and must therefore be UTF-8.
pub fn encode(header: &Header, key_blob: &[u8], body: &[u8]) -> CryptoResult<String> {
    let body_text = if header.is_plain() {
        std::str::from_utf8(body)
            .map_err(|_| {
                CryptoError::EncryptionFailed("plain cipher body is not UTF-8".to_string())
            })?
            .to_string()
    } else {
        armor(body)
    };

    let headline = header.headline();
    let blob = armor(key_blob);
    let mut out = String::with_capacity(
        headline.len() + blob.len() + END_KEY_MARKER.len() + body_text.len() + 3,
    );
    out.push_str(&headline);
    out.push('\n');
    out.push_str(&blob);
    out.push('\n');
    out.push_str(END_KEY_MARKER);
    out.push('\n');
    out.push_str(&body_text);
    Ok(out)
}

/// Parse a cryptogram.
///
/// Text that starts with `--- BEGIN` must carry a complete, well-formed
/// header or the result is `HeaderCorrupted`. Anything else is decoded as a
/// headerless base64 blob, failing with `InvalidArmor` if it is not one.
pub fn decode(text: &str) -> CryptoResult<Cryptogram> {
    let text = text.trim_start_matches(is_armor_whitespace);

    if !text.starts_with(BEGIN_MARKER) {
        let body = dearmor(text)?;
        if body.is_empty() {
            return Err(CryptoError::InvalidArmor("empty cryptogram".to_string()));
        }
        return Ok(Cryptogram::Headerless { body });
    }

    let (headline, rest) = text
        .split_once('\n')
        .ok_or_else(|| CryptoError::HeaderCorrupted("headline is not terminated".to_string()))?;
    let header = Header::parse(headline)?;

    let end = rest
        .find(END_KEY_MARKER)
        .ok_or_else(|| CryptoError::HeaderCorrupted("missing END KEY marker".to_string()))?;
    let key_blob = dearmor(&rest[..end])?;
    let tail = &rest[end + END_KEY_MARKER.len()..];

    let body = if header.is_plain() {
        let tail = tail
            .strip_prefix("\r\n")
            .or_else(|| tail.strip_prefix('\n'))
            .unwrap_or(tail);
        tail.as_bytes().to_vec()
    } else {
        dearmor(tail)?
    };

    Ok(Cryptogram::Native {
        header,
        key_blob,
        body,
    })
}
