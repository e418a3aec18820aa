//! Signing and submission of completed transactions
//!
//! [`TxSignBuilder`] wraps a finalized transaction whose body is frozen:
//! signers only ever add vkey witnesses, so the body hash they sign stays
//! valid. [`TxSigned`] carries the final encoding and submits it.

use super::errors::{SignError, SubmitError};
use crate::codec::{CodecError, TxCodec};
use crate::hash::TxHash;
use crate::metrics::metrics;
use crate::observability::TraceContext;
use crate::provider::Provider;
use crate::structured_logging::BuildLogger;
use crate::transaction::{Transaction, WitnessSet};
use crate::types::ExUnits;
use crate::wallet::{make_vkey_witness, signing_key_from_hex, Wallet};
use std::sync::Arc;

pub struct TxSignBuilder {
    tx: Transaction,
    hash: TxHash,
    wallet: Option<Arc<dyn Wallet>>,
    provider: Arc<dyn Provider>,
    codec: Arc<dyn TxCodec>,
    /// Vkey witnesses collected so far
    witnesses: WitnessSet,
    trace: TraceContext,
    logger: BuildLogger,
}

impl TxSignBuilder {
    pub(crate) fn new(
        tx: Transaction,
        hash: TxHash,
        wallet: Option<Arc<dyn Wallet>>,
        provider: Arc<dyn Provider>,
        codec: Arc<dyn TxCodec>,
        trace: TraceContext,
        logger: BuildLogger,
    ) -> Self {
        Self {
            tx,
            hash,
            wallet,
            provider,
            codec,
            witnesses: WitnessSet::default(),
            trace,
            logger,
        }
    }

    pub async fn sign_with_wallet(mut self) -> Result<Self, SignError> {
        let witnesses = self.partial_sign_with_wallet().await?;
        self.witnesses.merge_vkeys(&witnesses);
        Ok(self)
    }

    pub fn sign_with_private_key(mut self, private_key: &str) -> Result<Self, SignError> {
        let witnesses = self.partial_sign_with_private_key(private_key)?;
        self.witnesses.merge_vkeys(&witnesses);
        Ok(self)
    }

    /// The wallet's witnesses, without attaching them
    pub async fn partial_sign_with_wallet(&self) -> Result<WitnessSet, SignError> {
        let wallet = self.wallet.as_ref().ok_or(SignError::MissingWallet)?;
        Ok(wallet.sign_tx(&self.tx).await?)
    }

    pub fn partial_sign_with_private_key(&self, private_key: &str) -> Result<WitnessSet, SignError> {
        let key = signing_key_from_hex(private_key)?;
        Ok(WitnessSet {
            vkey_witnesses: vec![make_vkey_witness(&key, &self.hash)],
            ..WitnessSet::default()
        })
    }

    /// Attach witness sets gathered elsewhere; duplicate vkeys are dropped
    pub fn assemble(mut self, witness_sets: Vec<WitnessSet>) -> Self {
        for witnesses in &witness_sets {
            self.witnesses.merge_vkeys(witnesses);
        }
        self
    }

    pub fn complete(self) -> Result<TxSigned, SignError> {
        let mut tx = self.tx;
        tx.witness_set.merge_vkeys(&self.witnesses);
        let cbor = self.codec.encode_transaction(&tx)?;
        Ok(TxSigned {
            tx,
            hash: self.hash,
            cbor,
            wallet: self.wallet,
            provider: self.provider,
            trace: self.trace,
            logger: self.logger,
        })
    }

    /// Unsigned encoding, as handed to external signers
    pub fn to_cbor(&self) -> Result<Vec<u8>, CodecError> {
        self.codec.encode_transaction(&self.tx)
    }

    pub fn to_cbor_hex(&self) -> Result<String, CodecError> {
        Ok(hex::encode(self.to_cbor()?))
    }

    pub fn to_hash(&self) -> TxHash {
        self.hash
    }

    pub fn fee(&self) -> u64 {
        self.tx.body.fee
    }

    pub fn ex_units(&self) -> ExUnits {
        self.tx.witness_set.total_ex_units()
    }

    pub fn tx(&self) -> &Transaction {
        &self.tx
    }

    pub fn trace_context(&self) -> &TraceContext {
        &self.trace
    }
}

pub struct TxSigned {
    tx: Transaction,
    hash: TxHash,
    cbor: Vec<u8>,
    wallet: Option<Arc<dyn Wallet>>,
    provider: Arc<dyn Provider>,
    trace: TraceContext,
    logger: BuildLogger,
}

impl TxSigned {
    /// Submit through the wallet when one is selected, else the provider
    pub async fn submit(&self) -> Result<TxHash, SubmitError> {
        let span = self.trace.child_span("submit");
        let result = match &self.wallet {
            Some(wallet) => wallet.submit_tx(&self.cbor).await.map_err(SubmitError::from_wallet),
            None => self
                .provider
                .submit_tx(&self.cbor)
                .await
                .map_err(SubmitError::from_provider),
        };

        let tx_hash = self.hash.to_string();
        match &result {
            Ok(_) => {
                self.logger.log_submit(&span, &tx_hash, true, None);
                if let Some(m) = metrics() {
                    m.submissions_ok.inc();
                }
            }
            Err(err) => {
                self.logger.log_submit(&span, &tx_hash, false, Some(&err.to_string()));
                if let Some(m) = metrics() {
                    m.submissions_failed.inc();
                }
            }
        }
        result
    }

    pub fn to_cbor(&self) -> &[u8] {
        &self.cbor
    }

    pub fn to_cbor_hex(&self) -> String {
        hex::encode(&self.cbor)
    }

    pub fn to_hash(&self) -> TxHash {
        self.hash
    }

    pub fn tx(&self) -> &Transaction {
        &self.tx
    }

    pub fn trace_context(&self) -> &TraceContext {
        &self.trace
    }
}
