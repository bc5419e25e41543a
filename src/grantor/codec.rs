//! Compact JWS encoding for access tokens.
//!
//! `base64url(header) "." base64url(claims) "." base64url(hmac)`. The key,
//! algorithm and key id are fixed when the codec is built.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac, digest::KeyInit};
use rand::{RngCore, rngs::OsRng};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha384, Sha512};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("unknown key id: {0}")]
    UnknownKid(String),
    #[error("token expired")]
    Expired,
    #[error("invalid signing key")]
    InvalidKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    HS256,
    HS384,
    #[default]
    HS512,
}

impl Algorithm {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HS256" => Ok(Self::HS256),
            "HS384" => Ok(Self::HS384),
            "HS512" => Ok(Self::HS512),
            _ => Err(CodecError::UnsupportedAlg(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenHeader {
    pub alg: String,
    pub typ: String,
    pub kid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessTokenClaims {
    /// Opaque token id held by the credential store.
    pub jti: String,
    /// Client id.
    pub aud: String,
    /// User id.
    pub sub: String,
    pub scope: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct TokenCodec {
    key: SecretString,
    kid: String,
    algorithm: Algorithm,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, CodecError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, CodecError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| CodecError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn sign_with<M: Mac + KeyInit>(key: &[u8], input: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut mac = <M as KeyInit>::new_from_slice(key).map_err(|_| CodecError::InvalidKey)?;
    mac.update(input);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn verify_with<M: Mac + KeyInit>(key: &[u8], input: &[u8], tag: &[u8]) -> Result<(), CodecError> {
    let mut mac = <M as KeyInit>::new_from_slice(key).map_err(|_| CodecError::InvalidKey)?;
    mac.update(input);
    // constant-time comparison
    mac.verify_slice(tag)
        .map_err(|_| CodecError::InvalidSignature)
}

/// Random 128-bit key id, base64url encoded.
fn generate_kid() -> Result<String, CodecError> {
    let mut bytes = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|_| CodecError::InvalidKey)?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

impl TokenCodec {
    /// # Errors
    /// Returns `InvalidKey` for an empty key or if no key id can be generated.
    pub fn new(
        key: SecretString,
        kid: Option<String>,
        algorithm: Algorithm,
    ) -> Result<Self, CodecError> {
        if key.expose_secret().is_empty() {
            return Err(CodecError::InvalidKey);
        }
        let kid = match kid.filter(|k| !k.trim().is_empty()) {
            Some(kid) => kid,
            None => generate_kid()?,
        };
        Ok(Self {
            key,
            kid,
            algorithm,
        })
    }

    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn sign(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        let key = self.key.expose_secret().as_bytes();
        match self.algorithm {
            Algorithm::HS256 => sign_with::<Hmac<Sha256>>(key, input),
            Algorithm::HS384 => sign_with::<Hmac<Sha384>>(key, input),
            Algorithm::HS512 => sign_with::<Hmac<Sha512>>(key, input),
        }
    }

    fn verify_signature(&self, input: &[u8], tag: &[u8]) -> Result<(), CodecError> {
        let key = self.key.expose_secret().as_bytes();
        match self.algorithm {
            Algorithm::HS256 => verify_with::<Hmac<Sha256>>(key, input, tag),
            Algorithm::HS384 => verify_with::<Hmac<Sha384>>(key, input, tag),
            Algorithm::HS512 => verify_with::<Hmac<Sha512>>(key, input, tag),
        }
    }

    fn encode_with_header(
        &self,
        header: &TokenHeader,
        claims: &AccessTokenClaims,
    ) -> Result<String, CodecError> {
        let signing_input = format!("{}.{}", b64e_json(header)?, b64e_json(claims)?);
        let signature = self.sign(signing_input.as_bytes())?;
        Ok(format!(
            "{signing_input}.{}",
            Base64UrlUnpadded::encode_string(&signature)
        ))
    }

    /// Sign the claims with the configured key.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be serialized.
    pub fn encode(&self, claims: &AccessTokenClaims) -> Result<String, CodecError> {
        let header = TokenHeader {
            alg: self.algorithm.as_str().to_string(),
            typ: "JWT".to_string(),
            kid: self.kid.clone(),
        };
        self.encode_with_header(&header, claims)
    }

    /// Verify a token and return its claims.
    ///
    /// Checks run in order: structure, signature, algorithm, key id, expiry.
    ///
    /// # Errors
    /// Returns the first failing check.
    pub fn verify(&self, token: &str, now_unix_seconds: i64) -> Result<AccessTokenClaims, CodecError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CodecError::TokenFormat);
        };

        let signature =
            Base64UrlUnpadded::decode_vec(signature_b64).map_err(|_| CodecError::Base64)?;
        let signing_input = format!("{header_b64}.{claims_b64}");
        self.verify_signature(signing_input.as_bytes(), &signature)?;

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != self.algorithm.as_str() {
            return Err(CodecError::UnsupportedAlg(header.alg));
        }
        if header.kid != self.kid {
            return Err(CodecError::UnknownKid(header.kid));
        }

        let claims: AccessTokenClaims = b64d_json(claims_b64)?;
        if claims.exp <= now_unix_seconds {
            return Err(CodecError::Expired);
        }

        Ok(claims)
    }
}
