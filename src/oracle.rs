// 2.0: signed price oracle. publishers sign quotes off-ledger; the engine only ever
// prices against quotes whose signatures check out against the configured publisher set.
// 2.1 wire codec, 2.2 verification, 2.3 the latest-price board.

use crate::config::OracleConfig;
use crate::types::{Price, Timestamp};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstrumentId(pub [u8; 32]);

impl InstrumentId {
    /// Derives an id from a feed label, e.g. "ETH/USD".
    pub fn from_label(label: &str) -> Self {
        Self(Sha256::digest(label.as_bytes()).into())
    }

    pub fn from_hex(s: &str) -> Result<Self, OracleError> {
        let bytes = hex::decode(s.trim_start_matches("0x")).map_err(|_| OracleError::Malformed {
            reason: "instrument id is not hex",
        })?;
        let id: [u8; 32] = bytes.try_into().map_err(|_| OracleError::Malformed {
            reason: "instrument id must be 32 bytes",
        })?;
        Ok(Self(id))
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// One publisher observation. price × 10^exponent is the real price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub instrument_id: InstrumentId,
    pub price: i64,
    pub confidence: u64,
    pub exponent: i32,
    pub publish_time: u64,
}

impl PriceQuote {
    pub const ENCODED_LEN: usize = 32 + 8 + 8 + 4 + 8;

    // 2.1: fixed big-endian tuple
    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[0..32].copy_from_slice(&self.instrument_id.0);
        out[32..40].copy_from_slice(&self.price.to_be_bytes());
        out[40..48].copy_from_slice(&self.confidence.to_be_bytes());
        out[48..52].copy_from_slice(&self.exponent.to_be_bytes());
        out[52..60].copy_from_slice(&self.publish_time.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, OracleError> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(OracleError::Malformed {
                reason: "quote tuple must be 60 bytes",
            });
        }
        let mut id = [0u8; 32];
        id.copy_from_slice(&bytes[0..32]);
        Ok(Self {
            instrument_id: InstrumentId(id),
            price: i64::from_be_bytes(array(&bytes[32..40])),
            confidence: u64::from_be_bytes(array(&bytes[40..48])),
            exponent: i32::from_be_bytes(array(&bytes[48..52])),
            publish_time: u64::from_be_bytes(array(&bytes[52..60])),
        })
    }

    /// The message publishers sign.
    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(self.encode()).into()
    }

    /// price × 10^exponent. rejects non-positive prices.
    pub fn scaled_price(&self) -> Result<Price, OracleError> {
        let value = scale(self.price as i128, self.exponent)?;
        Price::new(value).ok_or(OracleError::NonPositivePrice {
            instrument: self.instrument_id,
            price: self.price,
        })
    }

    /// Confidence band as percent of price.
    pub fn confidence_p(&self) -> Result<Decimal, OracleError> {
        let price = self.scaled_price()?;
        let conf = scale(self.confidence as i128, self.exponent)?;
        Ok(conf * dec!(100) / price.value())
    }
}

fn array<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    out
}

fn scale(mantissa: i128, exponent: i32) -> Result<Decimal, OracleError> {
    let overflow = OracleError::Malformed {
        reason: "price exponent out of range",
    };
    if exponent <= 0 {
        Decimal::try_from_i128_with_scale(mantissa, exponent.unsigned_abs()).map_err(|_| overflow)
    } else {
        let factor = 10i128.checked_pow(exponent as u32).ok_or(overflow.clone())?;
        let value = mantissa.checked_mul(factor).ok_or(overflow.clone())?;
        Decimal::try_from_i128_with_scale(value, 0).map_err(|_| overflow)
    }
}

/// A publisher key and its signature over the quote digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attestation {
    pub publisher: [u8; 32],
    pub signature: [u8; 64],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedQuote {
    pub attestations: Vec<Attestation>,
    pub quote: PriceQuote,
}

impl SignedQuote {
    const ATTESTATION_LEN: usize = 32 + 64;

    /// Signs with every key given. one key for single-signer feeds.
    pub fn sign(quote: PriceQuote, keys: &[&SigningKey]) -> Self {
        let digest = quote.digest();
        let attestations = keys
            .iter()
            .map(|key| Attestation {
                publisher: key.verifying_key().to_bytes(),
                signature: key.sign(&digest).to_bytes(),
            })
            .collect();
        Self { attestations, quote }
    }

    // [n: u8] ++ n × (key ++ sig) ++ tuple
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            1 + self.attestations.len() * Self::ATTESTATION_LEN + PriceQuote::ENCODED_LEN,
        );
        out.push(self.attestations.len() as u8);
        for att in &self.attestations {
            out.extend_from_slice(&att.publisher);
            out.extend_from_slice(&att.signature);
        }
        out.extend_from_slice(&self.quote.encode());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, OracleError> {
        let (&count, rest) = bytes.split_first().ok_or(OracleError::Malformed {
            reason: "empty payload",
        })?;
        let sig_bytes = count as usize * Self::ATTESTATION_LEN;
        if rest.len() != sig_bytes + PriceQuote::ENCODED_LEN {
            return Err(OracleError::Malformed {
                reason: "payload length does not match attestation count",
            });
        }
        let attestations = rest[..sig_bytes]
            .chunks_exact(Self::ATTESTATION_LEN)
            .map(|chunk| Attestation {
                publisher: array(&chunk[..32]),
                signature: array(&chunk[32..]),
            })
            .collect();
        let quote = PriceQuote::decode(&rest[sig_bytes..])?;
        Ok(Self { attestations, quote })
    }
}

// 2.2: trust seam. swap for a mock in tests or a different scheme in production.
pub trait QuoteVerifier: fmt::Debug {
    /// Returns the number of distinct authorized publishers that signed.
    fn verify(&self, signed: &SignedQuote) -> Result<usize, OracleError>;
}

/// Authorized publisher keys plus how many of them must sign each quote.
#[derive(Debug, Clone)]
pub struct PublisherSet {
    keys: BTreeSet<[u8; 32]>,
    threshold: usize,
}

impl PublisherSet {
    pub fn single(key: VerifyingKey) -> Self {
        Self {
            keys: BTreeSet::from([key.to_bytes()]),
            threshold: 1,
        }
    }

    pub fn with_threshold(keys: impl IntoIterator<Item = VerifyingKey>, threshold: usize) -> Self {
        Self {
            keys: keys.into_iter().map(|k| k.to_bytes()).collect(),
            threshold: threshold.max(1),
        }
    }

    pub fn is_authorized(&self, publisher: &[u8; 32]) -> bool {
        self.keys.contains(publisher)
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

impl QuoteVerifier for PublisherSet {
    fn verify(&self, signed: &SignedQuote) -> Result<usize, OracleError> {
        let digest = signed.quote.digest();
        let mut seen: BTreeSet<[u8; 32]> = BTreeSet::new();

        for att in &signed.attestations {
            if !self.is_authorized(&att.publisher) {
                return Err(OracleError::UnauthorizedPublisher {
                    publisher: hex::encode(att.publisher),
                });
            }
            let key = VerifyingKey::from_bytes(&att.publisher)
                .map_err(|_| OracleError::InvalidSignature)?;
            let signature = Signature::from_bytes(&att.signature);
            key.verify(&digest, &signature)
                .map_err(|_| OracleError::InvalidSignature)?;
            seen.insert(att.publisher);
        }

        if seen.len() < self.threshold {
            return Err(OracleError::BelowThreshold {
                signers: seen.len(),
                threshold: self.threshold,
            });
        }
        Ok(seen.len())
    }
}

/// Latest accepted quote for one instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPrice {
    pub quote: PriceQuote,
    pub price: Price,
}

#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// (instrument, price, publish_time) in batch order.
    pub accepted: Vec<(InstrumentId, Price, u64)>,
    pub rejected: Vec<(InstrumentId, OracleError)>,
}

// 2.3: latest trusted price per instrument
#[derive(Debug, Clone, Default)]
pub struct PriceFeed {
    latest: HashMap<InstrumentId, StoredPrice>,
}

impl PriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verifies and stores one quote. nothing is written unless every check passes.
    pub fn admit(
        &mut self,
        verifier: &dyn QuoteVerifier,
        config: &OracleConfig,
        signed: &SignedQuote,
        now: Timestamp,
    ) -> Result<Price, OracleError> {
        let quote = signed.quote;
        verifier.verify(signed)?;

        let price = quote.scaled_price()?;

        if quote.publish_time > now.as_secs() {
            return Err(OracleError::FutureQuote {
                instrument: quote.instrument_id,
                publish_time: quote.publish_time,
                now: now.as_secs(),
            });
        }
        if quote.publish_time + config.lifetime_secs < now.as_secs() {
            return Err(OracleError::StaleQuote {
                instrument: quote.instrument_id,
                publish_time: quote.publish_time,
                now: now.as_secs(),
            });
        }
        if let Some(stored) = self.latest.get(&quote.instrument_id) {
            if quote.publish_time <= stored.quote.publish_time {
                return Err(OracleError::DuplicateQuote {
                    instrument: quote.instrument_id,
                    publish_time: quote.publish_time,
                });
            }
        }

        let confidence_p = quote.confidence_p()?;
        if confidence_p > config.max_confidence_p {
            return Err(OracleError::ConfidenceTooWide {
                instrument: quote.instrument_id,
                confidence_p,
                max_p: config.max_confidence_p,
            });
        }

        self.latest.insert(quote.instrument_id, StoredPrice { quote, price });
        debug!(instrument = %quote.instrument_id, %price, publish_time = quote.publish_time, "quote admitted");
        Ok(price)
    }

    /// Applies a batch. rejected quotes are skipped, never retried.
    pub fn ingest(
        &mut self,
        verifier: &dyn QuoteVerifier,
        config: &OracleConfig,
        batch: &[SignedQuote],
        now: Timestamp,
    ) -> IngestReport {
        let mut report = IngestReport::default();
        for signed in batch {
            let instrument = signed.quote.instrument_id;
            match self.admit(verifier, config, signed, now) {
                Ok(price) => report.accepted.push((instrument, price, signed.quote.publish_time)),
                Err(err) => {
                    warn!(%instrument, error = %err, "quote rejected");
                    report.rejected.push((instrument, err));
                }
            }
        }
        report
    }

    pub fn current_price(
        &self,
        instrument: InstrumentId,
        config: &OracleConfig,
        now: Timestamp,
    ) -> Result<Price, OracleError> {
        let stored = self
            .latest
            .get(&instrument)
            .ok_or(OracleError::NoPrice(instrument))?;
        if stored.quote.publish_time + config.lifetime_secs < now.as_secs() {
            return Err(OracleError::StalePrice {
                instrument,
                publish_time: stored.quote.publish_time,
                now: now.as_secs(),
            });
        }
        Ok(stored.price)
    }

    pub fn latest(&self, instrument: InstrumentId) -> Option<&StoredPrice> {
        self.latest.get(&instrument)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("Malformed quote: {reason}")]
    Malformed { reason: &'static str },

    #[error("Publisher {publisher} is not authorized")]
    UnauthorizedPublisher { publisher: String },

    #[error("Signature does not match quote")]
    InvalidSignature,

    #[error("{signers} distinct signers, {threshold} required")]
    BelowThreshold { signers: usize, threshold: usize },

    #[error("Quote for {instrument} published at {publish_time} is older than the lifetime (now {now})")]
    StaleQuote {
        instrument: InstrumentId,
        publish_time: u64,
        now: u64,
    },

    #[error("Quote for {instrument} published at {publish_time} is in the future (now {now})")]
    FutureQuote {
        instrument: InstrumentId,
        publish_time: u64,
        now: u64,
    },

    #[error("Quote for {instrument} at {publish_time} is not newer than the stored quote")]
    DuplicateQuote {
        instrument: InstrumentId,
        publish_time: u64,
    },

    #[error("Non-positive price {price} for {instrument}")]
    NonPositivePrice { instrument: InstrumentId, price: i64 },

    #[error("Confidence {confidence_p}% on {instrument} exceeds {max_p}%")]
    ConfidenceTooWide {
        instrument: InstrumentId,
        confidence_p: Decimal,
        max_p: Decimal,
    },

    #[error("No price stored for {0}")]
    NoPrice(InstrumentId),

    #[error("Stored price for {instrument} from {publish_time} is stale (now {now})")]
    StalePrice {
        instrument: InstrumentId,
        publish_time: u64,
        now: u64,
    },
}
