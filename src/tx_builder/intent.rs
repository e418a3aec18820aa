//! Deferred programs and the mutations they produce
//!
//! A [`Program`] is an independent async step queued by a stage call. It
//! reads an immutable [`ContextSnapshot`] and returns a list of
//! [`Mutation`]s; it never touches the context itself. [`drain`] runs every
//! queued program concurrently, waits for all of them, and hands back the
//! mutations in enqueue order, or the first failure observed.

use super::context::ContextSnapshot;
use super::errors::TxBuilderError;
use super::redeemer::RedeemerSpec;
use crate::address::Address;
use crate::assets::Assets;
use crate::hash::{KeyHash, PolicyId};
use crate::metadata::Metadatum;
use crate::transaction::{Certificate, TransactionOutput};
use crate::types::{PlutusData, Utxo};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// A change to the draft, described rather than performed
#[derive(Debug, Clone)]
pub enum Mutation {
    AddInput {
        utxo: Utxo,
        redeemer: Option<RedeemerSpec>,
    },
    AddReferenceInput(Utxo),
    AddOutput(TransactionOutput),
    AddMint {
        policy: PolicyId,
        assets: Assets,
        redeemer: Option<RedeemerSpec>,
    },
    AddCertificate {
        certificate: Certificate,
        redeemer: Option<RedeemerSpec>,
    },
    AddWithdrawal {
        reward_address: Address,
        amount: u64,
        redeemer: Option<RedeemerSpec>,
    },
    AddRequiredSigner(KeyHash),
    /// Witness-set datum
    AddDatum(PlutusData),
    /// Replaces any metadatum already under `label`
    AddMetadata { label: u64, metadatum: Metadatum },
}

pub type ProgramResult = Result<Vec<Mutation>, TxBuilderError>;

type ProgramFn = Box<dyn FnOnce(Arc<ContextSnapshot>) -> BoxFuture<'static, ProgramResult> + Send + Sync>;

pub struct Program {
    label: &'static str,
    run: ProgramFn,
}

impl Program {
    pub fn new<F, Fut>(label: &'static str, f: F) -> Self
    where
        F: FnOnce(Arc<ContextSnapshot>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProgramResult> + Send + 'static,
    {
        Self {
            label,
            run: Box::new(move |snapshot| Box::pin(f(snapshot))),
        }
    }

    /// Program whose mutations are already known
    pub fn ready(label: &'static str, mutations: Vec<Mutation>) -> Self {
        Self::new(label, move |_| async move { Ok(mutations) })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program").field("label", &self.label).finish_non_exhaustive()
    }
}

/// Run all programs to completion and return their mutations in enqueue
/// order. When any program fails no mutation is returned; the error is the
/// first one observed, in completion order.
pub async fn drain(programs: Vec<Program>, snapshot: Arc<ContextSnapshot>) -> Result<Vec<Mutation>, TxBuilderError> {
    let count = programs.len();
    let mut running: FuturesUnordered<_> = programs
        .into_iter()
        .enumerate()
        .map(|(index, program)| {
            let label = program.label;
            let future = (program.run)(snapshot.clone());
            async move { (index, label, future.await) }
        })
        .collect();

    let mut results: Vec<Option<Vec<Mutation>>> = (0..count).map(|_| None).collect();
    let mut first_error: Option<TxBuilderError> = None;

    while let Some((index, label, result)) = running.next().await {
        match result {
            Ok(mutations) => results[index] = Some(mutations),
            Err(err) => {
                debug!(
                    trace_id = %snapshot.trace_id,
                    program = %label,
                    error = %err,
                    "Deferred program failed"
                );
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }

    if let Some(err) = first_error {
        return Err(err);
    }
    Ok(results.into_iter().flatten().flatten().collect())
}
