// src/archive/signature.rs

//! OpenPGP verification of the InRelease file
//!
//! The InRelease index is a cleartext-signed OpenPGP document. The streaming
//! verifier peels the signature framework off and yields the signed text,
//! which the caller then parses. Verification succeeds when any supplied
//! public key validates any signature of the document.

use crate::error::{Error, Result};
use sequoia_openpgp as openpgp;

use openpgp::parse::stream::{
    MessageLayer, MessageStructure, VerificationHelper, VerifierBuilder,
};
use openpgp::parse::Parse;
use openpgp::policy::StandardPolicy;
use std::io::Read;
use tracing::debug;

/// Parse an ASCII-armored public key
pub fn parse_pub_key(armor: &str) -> Result<openpgp::Cert> {
    openpgp::Cert::from_bytes(armor.as_bytes())
        .map_err(|e| Error::Setup(format!("cannot parse public key: {e}")))
}

struct Helper<'a> {
    certs: &'a [openpgp::Cert],
}

impl VerificationHelper for Helper<'_> {
    fn get_certs(&mut self, _ids: &[openpgp::KeyHandle]) -> openpgp::Result<Vec<openpgp::Cert>> {
        Ok(self.certs.to_vec())
    }

    fn check(&mut self, structure: MessageStructure) -> openpgp::Result<()> {
        for layer in structure.into_iter() {
            if let MessageLayer::SignatureGroup { results } = layer {
                if results.iter().any(|result| result.is_ok()) {
                    return Ok(());
                }
            }
        }
        Err(anyhow::anyhow!("no signature validated by the provided keys"))
    }
}

/// Verify a cleartext-signed document and return the signed body
pub fn verify_cleartext(data: &[u8], certs: &[openpgp::Cert]) -> Result<Vec<u8>> {
    let policy = StandardPolicy::new();
    let helper = Helper { certs };
    let mut verifier = VerifierBuilder::from_bytes(data)
        .and_then(|builder| builder.with_policy(&policy, None, helper))
        .map_err(|e| {
            debug!("InRelease verification failed: {}", e);
            Error::Signature
        })?;
    let mut body = Vec::new();
    verifier.read_to_end(&mut body).map_err(|e| {
        debug!("InRelease verification failed: {}", e);
        Error::Signature
    })?;
    Ok(body)
}
